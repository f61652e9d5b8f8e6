//! Secret masking applied to everything that reaches the audit log and
//! to content stored by the memory tools.

use std::sync::LazyLock;

use regex::Regex;

static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(
                r#"(?i)\b(LLM_API_KEY|OPENAI_API_KEY|ANTHROPIC_API_KEY|TAVILY_API_KEY)\b\s*=\s*(".*?"|'.*?'|\S+)"#,
            )
            .unwrap(),
            r#"${1}="<redacted>""#,
        ),
        (
            Regex::new(r#"(?i)\b(api_key)\b\s*=\s*(".*?"|'.*?'|\S+)"#).unwrap(),
            r#"${1}="<redacted>""#,
        ),
        (
            Regex::new(
                r#"(?i)("(?:api[_-]?key|llm_api_key|openai_api_key|anthropic_api_key)"\s*:\s*)"(.*?)""#,
            )
            .unwrap(),
            r#"${1}"<redacted>""#,
        ),
        (
            Regex::new(r"(?i)(authorization:\s*bearer\s+)(\S+)").unwrap(),
            "${1}<redacted>",
        ),
        (
            Regex::new(r"(?i)\b(bearer)\s+([A-Za-z0-9._~+/=-]{12,})\b").unwrap(),
            "${1} <redacted>",
        ),
        (
            Regex::new(r"\b(sk-[A-Za-z0-9_\-]{8,})\b").unwrap(),
            "sk-<redacted>",
        ),
        (
            Regex::new(r"(?i)([?&](?:api_key|apikey|key|token)=)([^&\s]+)").unwrap(),
            "${1}<redacted>",
        ),
    ]
});

/// Mask known secret shapes (env assignments, JSON key fields, bearer
/// tokens, vendor key prefixes, URL query parameters).
pub fn redact_secrets(s: &str) -> String {
    if s.is_empty() {
        return String::new();
    }
    let mut out = s.to_string();
    for (re, repl) in RULES.iter() {
        out = re.replace_all(&out, *repl).into_owned();
    }
    out
}
