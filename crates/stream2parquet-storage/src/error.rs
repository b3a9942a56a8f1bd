//! Error types for storage sinks

use thiserror::Error;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E201: Storage configuration is incomplete or invalid
    E201InvalidConfig,
    /// E202: Backend operation failed
    E202Operator,
    /// E203: Storage runtime could not be started
    E203Runtime,
    /// E204: Requested object does not exist
    E204NotFound,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E201InvalidConfig => "E201",
            Self::E202Operator => "E202",
            Self::E203Runtime => "E203",
            Self::E204NotFound => "E204",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("[E201] Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("[E202] Storage operation failed: {0}")]
    Operator(#[from] opendal::Error),

    #[error("[E203] Failed to start storage runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

impl StorageError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidConfig(_) => ErrorCode::E201InvalidConfig,
            Self::Operator(e) if e.kind() == opendal::ErrorKind::NotFound => {
                ErrorCode::E204NotFound
            }
            Self::Operator(_) => ErrorCode::E202Operator,
            Self::Runtime(_) => ErrorCode::E203Runtime,
        }
    }
}
