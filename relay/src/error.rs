//! Error types for the `relay` layer.
use std::error::Error as StdError;
use std::fmt;

/// Top-level relay error type.
/// Errors carry an `error_kind` that callers (ultimately `web`) translate into a
/// response, and optionally the lower level error that caused it in `source`.
/// Only caller errors are modeled here: timeouts are a regular poll outcome and
/// transport failures are logged where they happen.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: RelayErrorKind,
}

/// The kinds of errors a relay operation can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayErrorKind {
    /// The client key was absent or empty.
    MissingClientKey,
    /// The inbound payload was not a JSON object.
    InvalidRecord,
}

impl Error {
    pub fn missing_client_key() -> Self {
        Error {
            source: None,
            error_kind: RelayErrorKind::MissingClientKey,
        }
    }

    pub fn invalid_record() -> Self {
        Error {
            source: None,
            error_kind: RelayErrorKind::InvalidRecord,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.error_kind {
            RelayErrorKind::MissingClientKey => write!(f, "Relay Error: missing client key"),
            RelayErrorKind::InvalidRecord => write!(f, "Relay Error: invalid record format"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: RelayErrorKind::InvalidRecord,
        }
    }
}
