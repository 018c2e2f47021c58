// Keyword matchers used by the classifier.
use regex::Regex;
use std::sync::OnceLock;

/// A keyword pattern compiled on first use.
///
/// If compilation ever fails the matcher degrades to plain substring checks
/// over the same keywords, so classification never errors.
pub struct KeywordPattern {
    name: &'static str,
    keywords: &'static [&'static str],
    compiled: OnceLock<Option<Regex>>,
}

impl KeywordPattern {
    pub const fn new(name: &'static str, keywords: &'static [&'static str]) -> Self {
        Self {
            name,
            keywords,
            compiled: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_match(&self, message: &str) -> bool {
        let compiled = self.compiled.get_or_init(|| {
            let alternation = self
                .keywords
                .iter()
                .map(|keyword| regex::escape(keyword))
                .collect::<Vec<_>>()
                .join("|");

            match Regex::new(&format!("(?i)(?:{alternation})")) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::warn!(pattern = self.name, "keyword pattern failed to compile: {e}");
                    None
                }
            }
        });

        match compiled {
            Some(regex) => regex.is_match(message),
            None => {
                let lowered = message.to_lowercase();
                self.keywords.iter().any(|keyword| lowered.contains(keyword))
            }
        }
    }
}

pub static NETWORK: KeywordPattern = KeywordPattern::new(
    "network",
    &[
        "network",
        "connection refused",
        "connection reset",
        "failed to fetch",
        "dns",
        "unreachable",
    ],
);

// "auth" also covers "authentication" and "authorization".
pub static AUTHENTICATION: KeywordPattern =
    KeywordPattern::new("authentication", &["auth", "token", "session"]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_keywords() {
        assert!(NETWORK.is_match("TypeError: NetworkError when attempting to fetch"));
        assert!(NETWORK.is_match("Connection refused (os error 111)"));
        assert!(NETWORK.is_match("Failed to fetch"));
        assert!(!NETWORK.is_match("division by zero"));
    }

    #[test]
    fn test_auth_keywords_are_case_insensitive() {
        assert!(AUTHENTICATION.is_match("JWT Token expired"));
        assert!(AUTHENTICATION.is_match("Session not found"));
        assert!(AUTHENTICATION.is_match("AuthApiError: invalid grant"));
        assert!(!AUTHENTICATION.is_match("row not found"));
    }

    #[test]
    fn test_pattern_names() {
        assert_eq!(NETWORK.name(), "network");
        assert_eq!(AUTHENTICATION.name(), "authentication");
    }
}
