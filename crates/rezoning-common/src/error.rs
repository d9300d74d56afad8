//! Error types for rezoning services.

use thiserror::Error;

/// Result type alias using LcoeError.
pub type LcoeResult<T> = Result<T, LcoeError>;

/// Primary error type for filter and scoring requests.
#[derive(Debug, Error)]
pub enum LcoeError {
    // === Request Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid geometry: {0}")]
    BadGeometry(String),

    #[error("Invalid tile address: {0}")]
    InvalidTile(String),

    #[error("Country not found: {0}")]
    CountryNotFound(String),

    // === Data Errors ===
    #[error("Failed to read dataset '{dataset}': {message}")]
    DatasetRead { dataset: String, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    // === Infrastructure Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LcoeError {
    /// Shorthand for an invalid request parameter.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a failed dataset read.
    pub fn dataset_read(dataset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatasetRead {
            dataset: dataset.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable kind, used in JSON error bodies and metric labels.
    pub fn error_kind(&self) -> &'static str {
        match self {
            LcoeError::InvalidParameter { .. } => "invalid_parameter",
            LcoeError::BadGeometry(_) => "bad_geometry",
            LcoeError::InvalidTile(_) => "invalid_tile",
            LcoeError::CountryNotFound(_) => "country_not_found",
            LcoeError::DatasetRead { .. } => "upstream_read_failure",
            LcoeError::Storage(_) => "storage_error",
            LcoeError::Config(_) => "config_error",
            LcoeError::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            LcoeError::InvalidParameter { .. }
            | LcoeError::BadGeometry(_)
            | LcoeError::InvalidTile(_) => 400,

            LcoeError::CountryNotFound(_) => 404,

            LcoeError::DatasetRead { .. } | LcoeError::Storage(_) => 502,

            LcoeError::Config(_) | LcoeError::Internal(_) => 500,
        }
    }

    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status_code())
    }
}

impl From<std::io::Error> for LcoeError {
    fn from(err: std::io::Error) -> Self {
        LcoeError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for LcoeError {
    fn from(err: serde_json::Error) -> Self {
        LcoeError::Internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(LcoeError::BadGeometry("x".into()).http_status_code(), 400);
        assert_eq!(LcoeError::InvalidTile("x".into()).http_status_code(), 400);
        assert_eq!(LcoeError::CountryNotFound("XYZ".into()).http_status_code(), 404);
        assert_eq!(LcoeError::dataset_read("calc", "boom").http_status_code(), 502);
        assert_eq!(LcoeError::Internal("x".into()).http_status_code(), 500);
    }

    #[test]
    fn test_error_kind_and_message() {
        let err = LcoeError::invalid_parameter("f_slope", "expected a number");
        assert_eq!(err.error_kind(), "invalid_parameter");
        assert!(err.is_client_error());
        assert_eq!(
            err.to_string(),
            "Invalid parameter value for 'f_slope': expected a number"
        );

        let err = LcoeError::dataset_read("distances", "connection reset");
        assert_eq!(err.error_kind(), "upstream_read_failure");
        assert!(!err.is_client_error());
    }
}
