//! Live credential probes against provider APIs.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::Value;

use super::format::{check_openai_format, check_stripe_format};
use super::{CredentialError, Provider};

/// A check that a provider accepts the configured key.
pub trait CredentialProbe: Send + Sync {
    fn provider(&self) -> Provider;

    fn probe(&self) -> BoxFuture<'_, Result<(), CredentialError>>;
}

/// Map a provider status code to a validation outcome.
pub fn map_status(status: StatusCode) -> Result<(), CredentialError> {
    match status {
        s if s.is_success() => Ok(()),
        StatusCode::UNAUTHORIZED => Err(CredentialError::AuthenticationFailed),
        StatusCode::FORBIDDEN => Err(CredentialError::PermissionDenied),
        StatusCode::TOO_MANY_REQUESTS => Err(CredentialError::RateLimited),
        s => Err(CredentialError::UnexpectedStatus(s.as_u16())),
    }
}

fn is_loopback(base_url: &str) -> bool {
    url::Url::parse(base_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .is_some_and(|h| matches!(h.as_str(), "localhost" | "127.0.0.1" | "[::1]"))
}

/// Client for one provider. Loopback base URLs bypass any system proxy.
pub(crate) fn http_client(base_url: &str, timeout: Duration) -> reqwest::Client {
    let mut builder = reqwest::Client::builder().timeout(timeout);
    if is_loopback(base_url) {
        builder = builder.no_proxy();
    }
    builder
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

async fn get_json(
    client: &reqwest::Client,
    url: String,
    key: &str,
) -> Result<Value, CredentialError> {
    let response = client
        .get(url)
        .bearer_auth(key)
        .send()
        .await
        .map_err(|e| CredentialError::Network(e.without_url().to_string()))?;
    map_status(response.status())?;
    response
        .json::<Value>()
        .await
        .map_err(|e| CredentialError::MalformedResponse(e.without_url().to_string()))
}

/// Stripe: account lookup followed by a balance read.
pub struct StripeProbe {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    public_key: Option<String>,
}

impl StripeProbe {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
        public_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: http_client(&base_url, timeout),
            base_url,
            secret_key: secret_key.into(),
            public_key,
        }
    }

    async fn run(&self) -> Result<(), CredentialError> {
        check_stripe_format(&self.secret_key, self.public_key.as_deref())?;

        let account = get_json(
            &self.client,
            format!("{}/v1/account", self.base_url),
            &self.secret_key,
        )
        .await?;
        if !account.get("id").is_some_and(Value::is_string) {
            return Err(CredentialError::MalformedResponse(
                "account response has no id".into(),
            ));
        }

        let balance = get_json(
            &self.client,
            format!("{}/v1/balance", self.base_url),
            &self.secret_key,
        )
        .await?;
        if !balance.get("available").is_some_and(Value::is_array) {
            return Err(CredentialError::MalformedResponse(
                "balance response has no available funds list".into(),
            ));
        }
        Ok(())
    }
}

impl CredentialProbe for StripeProbe {
    fn provider(&self) -> Provider {
        Provider::Stripe
    }

    fn probe(&self) -> BoxFuture<'_, Result<(), CredentialError>> {
        Box::pin(self.run())
    }
}

/// OpenAI: model listing.
pub struct OpenAiProbe {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiProbe {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: http_client(&base_url, timeout),
            base_url,
            api_key: api_key.into(),
        }
    }

    async fn run(&self) -> Result<(), CredentialError> {
        check_openai_format(&self.api_key)?;

        let models = get_json(
            &self.client,
            format!("{}/v1/models", self.base_url),
            &self.api_key,
        )
        .await?;
        if !models.get("data").is_some_and(Value::is_array) {
            return Err(CredentialError::MalformedResponse(
                "model list has no data array".into(),
            ));
        }
        Ok(())
    }
}

impl CredentialProbe for OpenAiProbe {
    fn provider(&self) -> Provider {
        Provider::OpenAi
    }

    fn probe(&self) -> BoxFuture<'_, Result<(), CredentialError>> {
        Box::pin(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(map_status(StatusCode::OK), Ok(()));
        assert_eq!(
            map_status(StatusCode::UNAUTHORIZED),
            Err(CredentialError::AuthenticationFailed)
        );
        assert_eq!(
            map_status(StatusCode::FORBIDDEN),
            Err(CredentialError::PermissionDenied)
        );
        assert_eq!(
            map_status(StatusCode::TOO_MANY_REQUESTS),
            Err(CredentialError::RateLimited)
        );
        assert_eq!(
            map_status(StatusCode::BAD_GATEWAY),
            Err(CredentialError::UnexpectedStatus(502))
        );
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback("http://127.0.0.1:4010"));
        assert!(is_loopback("http://localhost:4010/"));
        assert!(!is_loopback("https://api.stripe.com"));
    }

    #[tokio::test]
    async fn test_format_checked_before_network() {
        // Unroutable base URL: the probe must fail on format alone
        let probe = OpenAiProbe::new("http://127.0.0.1:9", "not-a-key", Duration::from_secs(1));
        assert!(matches!(
            probe.probe().await,
            Err(CredentialError::InvalidFormat(_))
        ));
    }
}
