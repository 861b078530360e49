use serde::Serialize;
use std::fmt;

/// Outcome of a single validation call.
///
/// A verdict is built once per call and handed back to the caller; validators keep no
/// record of it. `error_index` is `None` when the input was accepted (the `-1` of the
/// rendering layer) and for failures that cannot be pinned to one character.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    pub ok: bool,
    pub message: String,
    pub error_index: Option<usize>,
}

impl ValidationVerdict {
    /// Verdict for accepted input
    pub fn pass() -> Self {
        Self {
            ok: true,
            message: String::new(),
            error_index: None,
        }
    }

    /// Verdict for rejected input pointing at a character position
    pub fn fail_at(message: impl Into<String>, index: usize) -> Self {
        Self {
            ok: false,
            message: message.into(),
            error_index: Some(index),
        }
    }

    /// Verdict for rejected input without a specific position
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
            error_index: None,
        }
    }

    /// Error position in the `-1 when absent` convention used by form renderers
    pub fn error_position(&self) -> i64 {
        self.error_index.map_or(-1, |i| i as i64)
    }
}

impl fmt::Display for ValidationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ok {
            write!(f, "ok")
        } else {
            match self.error_index {
                Some(index) => write!(f, "{} (at position {})", self.message, index),
                None => write!(f, "{}", self.message),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_positions() {
        assert_eq!(ValidationVerdict::pass().error_position(), -1);
        assert_eq!(ValidationVerdict::fail_at("bad", 3).error_position(), 3);
        assert_eq!(ValidationVerdict::fail("bad").error_position(), -1);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(ValidationVerdict::pass().to_string(), "ok");
        assert_eq!(
            ValidationVerdict::fail_at("invalid character", 2).to_string(),
            "invalid character (at position 2)"
        );
        assert_eq!(ValidationVerdict::fail("too weak").to_string(), "too weak");
    }
}
