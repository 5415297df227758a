//! Offline key format checks.

use super::CredentialError;

const STRIPE_SECRET_PREFIXES: [&str; 4] = ["sk_live_", "sk_test_", "rk_live_", "rk_test_"];
const STRIPE_PUBLIC_PREFIXES: [&str; 2] = ["pk_live_", "pk_test_"];
const STRIPE_LEN: std::ops::RangeInclusive<usize> = 20..=255;
const OPENAI_LEN: std::ops::RangeInclusive<usize> = 20..=256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Live,
    Test,
}

fn mode_of(key: &str) -> Mode {
    if key.contains("_live_") {
        Mode::Live
    } else {
        Mode::Test
    }
}

/// Validate a Stripe secret key and, when given, its publishable pair.
pub fn check_stripe_format(secret: &str, public: Option<&str>) -> Result<(), CredentialError> {
    if !STRIPE_SECRET_PREFIXES.iter().any(|p| secret.starts_with(p)) {
        return Err(CredentialError::InvalidFormat(
            "secret key must start with sk_live_, sk_test_, rk_live_ or rk_test_".into(),
        ));
    }
    if !STRIPE_LEN.contains(&secret.len()) {
        return Err(CredentialError::InvalidFormat(
            "secret key length out of range".into(),
        ));
    }

    let Some(public) = public else {
        return Ok(());
    };
    if !STRIPE_PUBLIC_PREFIXES.iter().any(|p| public.starts_with(p)) {
        return Err(CredentialError::InvalidFormat(
            "publishable key must start with pk_live_ or pk_test_".into(),
        ));
    }
    if !STRIPE_LEN.contains(&public.len()) {
        return Err(CredentialError::InvalidFormat(
            "publishable key length out of range".into(),
        ));
    }
    if mode_of(secret) != mode_of(public) {
        return Err(CredentialError::ModeMismatch);
    }
    Ok(())
}

/// Validate an OpenAI API key.
pub fn check_openai_format(key: &str) -> Result<(), CredentialError> {
    if !key.starts_with("sk-") {
        return Err(CredentialError::InvalidFormat(
            "API key must start with sk-".into(),
        ));
    }
    if !OPENAI_LEN.contains(&key.len()) {
        return Err(CredentialError::InvalidFormat(
            "API key length out of range".into(),
        ));
    }
    if key.chars().any(char::is_whitespace) {
        return Err(CredentialError::InvalidFormat(
            "API key contains whitespace".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SK_TEST: &str = "sk_test_51HabitFlowExampleKey000";
    const PK_TEST: &str = "pk_test_51HabitFlowExampleKey000";
    const PK_LIVE: &str = "pk_live_51HabitFlowExampleKey000";

    #[test]
    fn test_stripe_prefixes() {
        assert!(check_stripe_format(SK_TEST, Some(PK_TEST)).is_ok());
        assert!(check_stripe_format("rk_test_51HabitFlowRestricted00", None).is_ok());
        assert!(matches!(
            check_stripe_format("pk_test_51HabitFlowExampleKey000", None),
            Err(CredentialError::InvalidFormat(_))
        ));
        assert!(matches!(
            check_stripe_format(SK_TEST, Some(SK_TEST)),
            Err(CredentialError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_stripe_length() {
        assert!(matches!(
            check_stripe_format("sk_test_short", None),
            Err(CredentialError::InvalidFormat(_))
        ));
        let long = format!("sk_test_{}", "a".repeat(250));
        assert!(check_stripe_format(&long, None).is_err());
    }

    #[test]
    fn test_stripe_mode_mismatch() {
        assert_eq!(
            check_stripe_format(SK_TEST, Some(PK_LIVE)),
            Err(CredentialError::ModeMismatch)
        );
    }

    #[test]
    fn test_openai_format() {
        assert!(check_openai_format("sk-proj-abcdefghijklmnopqrstuvwxyz").is_ok());
        assert!(check_openai_format("pk-abcdefghijklmnopqrstuvwxyz").is_err());
        assert!(check_openai_format("sk-short").is_err());
        assert!(check_openai_format("sk-abcdefghij klmnopqrstuvwxyz").is_err());
    }
}
