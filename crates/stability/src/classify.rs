//! Billing-error detection for Stability API failures
//!
//! Distinguishes key exhaustion (billing/quota errors, recovered by rotating
//! to the next key) from genuine request errors (surfaced to the caller
//! immediately). An exhausted key says nothing about request validity, so
//! rotation continues past it; any other failure stops rotation so a bad
//! prompt is not retried against every key in the pool.

/// Billing-failure phrases in Stability API error responses.
///
/// These match the wording of the upstream's insufficient-credit errors
/// ("you lack the credits required...", "please purchase more credits").
/// Known limitation: tied to upstream copy, which can change without notice.
/// Deployments can override via `ExhaustionMatcher::new`; `BackendError`
/// carries the HTTP status for an eventual status-code-based classifier.
pub const BILLING_PATTERNS: &[&str] = &["lack", "credits", "purchase"];

/// Classification of an upstream failure, driving the rotation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Key is out of credits — skip it and try the next one.
    Exhausted,
    /// Anything else (bad request, server error, transport failure) — stop
    /// rotation and report to the caller.
    Fatal,
}

/// Substring matcher over upstream error text.
///
/// The match is case-insensitive: the message is lowercased and checked for
/// each pattern literally. Patterns themselves are expected to be lowercase.
#[derive(Debug, Clone)]
pub struct ExhaustionMatcher {
    patterns: Vec<String>,
}

impl Default for ExhaustionMatcher {
    fn default() -> Self {
        Self::new(BILLING_PATTERNS.iter().map(|p| p.to_string()))
    }
}

impl ExhaustionMatcher {
    /// Build a matcher from a custom pattern list.
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            patterns: patterns.into_iter().collect(),
        }
    }

    /// Classify an upstream error message.
    pub fn classify(&self, message: &str) -> ErrorClassification {
        let lower = message.to_lowercase();
        for pattern in &self.patterns {
            if lower.contains(pattern.as_str()) {
                return ErrorClassification::Exhausted;
            }
        }
        ErrorClassification::Fatal
    }
}
