//! Error classification.
//!
//! Maps a step failure to a coarse [`ErrorKind`] using ordered
//! substring rules matched against the error's type name and its full
//! message chain. The first matching rule wins; no match yields
//! [`ErrorKind::Unknown`]. Classification is pure and never fails.

use crate::core::ErrorKind;
use crate::errors::StepError;
use std::error::Error as StdError;

/// One ordered classification rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    /// Kind assigned when the rule matches.
    pub kind: ErrorKind,
    /// Lowercase substrings; any one matching is enough.
    pub patterns: Vec<String>,
}

impl ClassificationRule {
    /// Creates a rule. Patterns are matched case-insensitively.
    #[must_use]
    pub fn new(kind: ErrorKind, patterns: &[&str]) -> Self {
        Self {
            kind,
            patterns: patterns.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        self.patterns.iter().any(|p| haystack.contains(p.as_str()))
    }
}

/// Ordered rule-based error classifier.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    rules: Vec<ClassificationRule>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

fn default_rules() -> Vec<ClassificationRule> {
    vec![
        ClassificationRule::new(
            ErrorKind::RateLimitOrQuota,
            &[
                "ratelimited",
                "rate limit",
                "rate_limit",
                "ratelimit",
                "quota",
                "too many requests",
                "http 429",
                "resource_exhausted",
            ],
        ),
        ClassificationRule::new(
            ErrorKind::InvalidOutputSyntax,
            &[
                "invalidoutput",
                "syntaxerror",
                "syntax error",
                "invalid syntax",
                "unexpected token",
                "unterminated",
            ],
        ),
        ClassificationRule::new(
            ErrorKind::NetworkOrTimeout,
            &[
                "timeout",
                "timed out",
                "network",
                "connection",
                "dns",
                "unreachable",
                "broken pipe",
                "reset by peer",
            ],
        ),
        ClassificationRule::new(
            ErrorKind::ResourceNotFound,
            &["notfound", "not found", "http 404", "no such file", "does not exist"],
        ),
        ClassificationRule::new(
            ErrorKind::UpstreamApiError,
            &[
                "apierror",
                "api error",
                "upstream",
                "bad gateway",
                "service unavailable",
                "internal server error",
                "http error",
                "http 4",
                "http 5",
            ],
        ),
        ClassificationRule::new(
            ErrorKind::RenderingFailure,
            &["rendering", "render", "ffmpeg", "encoder", "codec", "mux"],
        ),
        ClassificationRule::new(
            ErrorKind::MalformedData,
            &[
                "malformed",
                "deserializ",
                "decode",
                "json",
                "keyerror",
                "missing field",
                "invalid type",
                "parse",
            ],
        ),
    ]
}

impl ErrorClassifier {
    /// Creates a classifier with the default rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a classifier with no rules; everything is `Unknown`.
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Adds a rule that takes precedence over every existing rule.
    #[must_use]
    pub fn with_priority_rule(mut self, rule: ClassificationRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Adds a rule evaluated after every existing rule.
    #[must_use]
    pub fn with_rule(mut self, rule: ClassificationRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns the rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[ClassificationRule] {
        &self.rules
    }

    /// Classifies a step error.
    #[must_use]
    pub fn classify(&self, error: &StepError) -> ErrorKind {
        self.classify_message(error.type_name(), &message_chain(error))
    }

    /// Classifies any error by its type name and message chain.
    #[must_use]
    pub fn classify_error(&self, type_name: &str, error: &(dyn StdError + 'static)) -> ErrorKind {
        self.classify_message(type_name, &message_chain(error))
    }

    /// Classifies a raw type name and message.
    #[must_use]
    pub fn classify_message(&self, type_name: &str, message: &str) -> ErrorKind {
        let haystack = format!("{type_name} {message}").to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&haystack))
            .map_or(ErrorKind::Unknown, |rule| rule.kind)
    }
}

/// Joins an error and all of its sources into one message.
fn message_chain(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
