use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Message returned to callers when a failure is not part of the public taxonomy.
pub const GENERIC_FAILURE_MESSAGE: &str = "An unexpected error occurred while processing your file.";

/// Main error type for the roster generator.
/// Aggregates errors from various sources including standard library, dependencies, and internal modules.
#[derive(Error, Debug)]
pub enum RosterError {
    // Caller-facing taxonomy
    #[error("{0}")]
    InvalidInput(String),

    #[error("The uploaded file could not be read as tabular data: {0}")]
    UnreadableFormat(String),

    #[error("The uploaded file is empty or in an invalid format.")]
    EmptyInput,

    #[error("Failed to encode the generated files: {0}")]
    Serialization(String),

    #[error("{0}")]
    WithContextError(String),

    #[error("Invalid generator configuration: {0}")]
    ConfigError(String),

    #[error("{0}")]
    AnyhowError(#[from] anyhow::Error),

    // Standard library errors
    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    ParseIntError(#[from] std::num::ParseIntError),

    #[error("{0}")]
    ParseFloatError(#[from] std::num::ParseFloatError),

    #[error("{0}")]
    StringEncodingError(#[from] std::str::Utf8Error),

    // Third-party library errors
    #[error("{0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("{0}")]
    XmlError(#[from] quick_xml::Error),

    #[error("{0}")]
    XmlEncodingError(#[from] quick_xml::encoding::EncodingError),

    #[error("{0}")]
    XmlAttributeError(#[from] quick_xml::events::attributes::AttrError),

    #[error("{0}")]
    CsvError(#[from] csv::Error),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),

    #[error("{0}")]
    Base64Error(#[from] base64::DecodeError),

    // Helper module errors
    #[error("{0}")]
    XmlHelperError(#[from] crate::helpers::xml::XmlError),

    #[error("{0}")]
    CfbError(#[from] crate::helpers::cfb::CfbError),

    #[error("{0}")]
    Biff8Error(#[from] crate::helpers::biff8::Biff8Error),

    #[error("{0}")]
    Biff12Error(#[from] crate::helpers::biff12::Biff12Error),

    // Spreadsheet module errors
    #[error("{0}")]
    SpreadsheetError(#[from] crate::spreadsheet::SpreadsheetError),

    #[error("{0}")]
    OdsError(#[from] crate::spreadsheet::ods::OdsError),

    #[error("{0}")]
    XlsError(#[from] crate::spreadsheet::xls::XlsError),
}

impl RosterError {
    /// Re-labels any error raised while reading the upload as `UnreadableFormat`.
    /// Contract errors pass through unchanged.
    pub(crate) fn into_unreadable(self) -> Self {
        match self {
            Self::InvalidInput(_) | Self::UnreadableFormat(_) | Self::EmptyInput | Self::Serialization(_) => self,
            other => Self::UnreadableFormat(other.to_string()),
        }
    }

    /// Re-labels any error raised while encoding workbooks or archives as `Serialization`.
    pub(crate) fn into_serialization(self) -> Self {
        match self {
            Self::InvalidInput(_) | Self::UnreadableFormat(_) | Self::EmptyInput | Self::Serialization(_) => self,
            other => Self::Serialization(other.to_string()),
        }
    }

    /// Returns the caller-facing kind of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput(_) => FailureKind::InvalidInput,
            Self::UnreadableFormat(_) => FailureKind::UnreadableFormat,
            Self::EmptyInput => FailureKind::EmptyInput,
            Self::Serialization(_) => FailureKind::Serialization,
            _ => FailureKind::Internal,
        }
    }
}

pub(crate) trait ResultMessage {
    fn with_prefix(self, message: &str) -> Self;
}

impl<T> ResultMessage for Result<T, RosterError> {
    fn with_prefix(self, message: &str) -> Self {
        self.map_err(|e| RosterError::WithContextError(format!("{}: {}", message, e)))
    }
}

/// Caller-facing failure categories.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    InvalidInput,
    UnreadableFormat,
    EmptyInput,
    Serialization,
    Internal,
}

/// Terminal failure of one generator run, safe to hand back to a caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl From<RosterError> for Failure {
    /// Internal errors are logged with their cause and replaced by a generic message.
    fn from(error: RosterError) -> Self {
        let kind = error.kind();
        let message = match kind {
            FailureKind::Internal => {
                error!(error = %error, "team generation failed");
                GENERIC_FAILURE_MESSAGE.to_owned()
            }
            _ => error.to_string(),
        };
        Failure { kind, message }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Failure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_are_masked() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire at /srv/out");
        let failure = Failure::from(RosterError::from(io));
        assert_eq!(failure.kind, FailureKind::Internal);
        assert_eq!(failure.message, GENERIC_FAILURE_MESSAGE);

        let failure = Failure::from(RosterError::from(anyhow::anyhow!("collaborator gave up")));
        assert_eq!(failure.kind, FailureKind::Internal);
        assert_eq!(failure.message, GENERIC_FAILURE_MESSAGE);
    }

    #[test]
    fn contract_errors_keep_their_message() {
        let failure = Failure::from(RosterError::InvalidInput("Must have at least 2 teams.".to_owned()));
        assert_eq!(failure.kind, FailureKind::InvalidInput);
        assert_eq!(failure.message, "Must have at least 2 teams.");

        let failure = Failure::from(RosterError::EmptyInput);
        assert_eq!(failure.kind, FailureKind::EmptyInput);
    }

    #[test]
    fn relabel_reading_and_writing_errors() {
        let error = RosterError::from("x".parse::<i32>().unwrap_err()).into_unreadable();
        assert!(matches!(error, RosterError::UnreadableFormat(_)));

        let error = RosterError::EmptyInput.into_unreadable();
        assert!(matches!(error, RosterError::EmptyInput));

        let error = RosterError::WithContextError("boom".to_owned()).into_serialization();
        assert!(matches!(error, RosterError::Serialization(message) if message == "boom"));
    }

    #[test]
    fn with_prefix_adds_context() {
        let result: Result<(), RosterError> = Err(RosterError::WithContextError("inner".to_owned()));
        let error = result.with_prefix("outer").unwrap_err();
        assert_eq!(error.to_string(), "outer: inner");
    }
}
