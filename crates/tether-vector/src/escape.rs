use std::sync::OnceLock;

use regex::Regex;

/// Characters RediSearch treats as token separators in queries
const DEFAULT_ESCAPED_CHARS: &str = r#"[,.<>{}\[\]\\"':;!@#$%^&*()\-+=~/ ]"#;

fn default_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(DEFAULT_ESCAPED_CHARS).expect("escape pattern is valid"))
}

/// Backslash-escapes punctuation inside RediSearch query values
#[derive(Debug, Clone)]
pub struct TokenEscaper {
    pattern: Regex,
}

impl Default for TokenEscaper {
    fn default() -> Self {
        Self {
            pattern: default_pattern().clone(),
        }
    }
}

impl TokenEscaper {
    /// Escaper using a custom character class
    pub const fn with_pattern(pattern: Regex) -> Self {
        Self { pattern }
    }

    /// Escape every matched character
    pub fn escape(&self, value: &str) -> String {
        self.pattern.replace_all(value, r"\$0").into_owned()
    }
}
