//! Stream error types.

use harbor_core::HarborError;
use harbor_core::text::truncate_str;
use thiserror::Error;

/// Maximum bytes of an offending line kept in a [`HarborError::Parse`].
const LINE_PREVIEW_BYTES: usize = 2_000;

/// Errors raised while decoding or enriching stream lines.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A non-blank line was not valid JSON.
    #[error("invalid JSON line: {message}")]
    Json {
        /// Parser diagnostic.
        message: String,
        /// The raw line.
        line: String,
    },

    /// A JSON value is not a recognized message.
    #[error("invalid message structure: {reason}")]
    Structural {
        /// What was wrong.
        reason: String,
        /// The serialized offending value.
        value: String,
    },

    /// Reading the underlying byte stream failed.
    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Raw text of the offending line or value, when there is one.
    #[must_use]
    pub fn raw(&self) -> Option<&str> {
        match self {
            Self::Json { line, .. } => Some(line),
            Self::Structural { value, .. } => Some(value),
            Self::Io(_) => None,
        }
    }

    /// Whether this is a per-line anomaly a live stream may skip.
    #[must_use]
    pub fn is_line_anomaly(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

impl From<StreamError> for HarborError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Io(io) => HarborError::wrap(io),
            other => {
                let line = other
                    .raw()
                    .map(|raw| truncate_str(raw, LINE_PREVIEW_BYTES).to_string())
                    .unwrap_or_default();
                HarborError::Parse {
                    message: other.to_string(),
                    line,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use harbor_core::ErrorKind;

    #[test]
    fn json_error_becomes_parse() {
        let err: HarborError = StreamError::Json {
            message: "expected value".into(),
            line: "{oops".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_matches!(err, HarborError::Parse { line, .. } if line == "{oops");
    }

    #[test]
    fn io_error_is_not_a_line_anomaly() {
        let err = StreamError::Io(std::io::Error::other("pipe closed"));
        assert!(!err.is_line_anomaly());
        assert!(err.raw().is_none());
        let harbor: HarborError = err.into();
        assert_eq!(harbor.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn structural_error_keeps_value() {
        let err = StreamError::Structural {
            reason: "missing type".into(),
            value: "{}".into(),
        };
        assert!(err.is_line_anomaly());
        assert_eq!(err.raw(), Some("{}"));
    }
}
