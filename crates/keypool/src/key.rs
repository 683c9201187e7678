//! Opaque API key token
//!
//! Keys are bearer credentials for a paid upstream — they must never appear in
//! logs or panic messages. `Debug`/`Display` redact, and the backing string is
//! zeroized on drop.

use std::fmt;
use zeroize::Zeroize;

/// A single Stability API key. Redacted in Debug/Display/logs.
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Expose the raw key for the Authorization header (use sparingly).
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl Drop for ApiKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_redact() {
        let key = ApiKey::new("sk-super-secret");
        assert_eq!(format!("{key:?}"), "[REDACTED]");
        assert_eq!(format!("{key}"), "[REDACTED]");
    }

    #[test]
    fn expose_returns_raw_value() {
        let key = ApiKey::new("sk-super-secret");
        assert_eq!(key.expose(), "sk-super-secret");
    }
}
