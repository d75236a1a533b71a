use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the log engine, the control channels and the stats collector
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid module name, path or setting
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Endpoint missing, dial or write failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Trace file lock not acquired within the retry budget
    #[error("Trace lock for '{trace_id}' not acquired after {attempts} attempts")]
    Contention { trace_id: String, attempts: u32 },

    /// Malformed or unrecognized control request
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// File open, rename or write failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Alarm endpoint rejected or unreachable
    #[error("Alarm delivery failed: {0}")]
    Alarm(#[from] reqwest::Error),

    /// Stats key misuse (missing key, non-numeric increment)
    #[error("Stat error: {0}")]
    Stat(String),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Wire-level protocol violations on a control channel
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown command: {0}")]
    UnknownVerb(String),

    #[error("invalid argument for {verb}: {reason}")]
    InvalidArgument { verb: &'static str, reason: String },

    #[error("command {verb} is not supported on the {subsystem} channel")]
    Unsupported {
        verb: &'static str,
        subsystem: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Aggregator HTTP error. Every failure surfaces as a 500 with a text body.
#[derive(Debug, Error)]
pub enum AppError {
    /// Request body could not be decoded
    #[error("{0}")]
    BadRequest(String),
    /// Unknown aggregator command
    #[error("Invalid Command {0}")]
    InvalidCommand(String),
    /// Target module endpoint not reachable
    #[error("Module {module} not found. Err {reason}")]
    ModuleNotFound { module: String, reason: String },
    /// Requested file could not be opened
    #[error("Cannot open file. Error: {0}")]
    FileUnavailable(String),
    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "Aggregator request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = Error::Contention {
            trace_id: "0x007".to_string(),
            attempts: 10,
        };
        assert_eq!(
            error.to_string(),
            "Trace lock for '0x007' not acquired after 10 attempts"
        );

        let error: Error = ProtocolError::UnknownVerb("bogus".to_string()).into();
        assert_eq!(error.to_string(), "unknown command: bogus");
    }

    #[test]
    fn test_app_error_display() {
        let error = AppError::ModuleNotFound {
            module: "svc".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(error.to_string(), "Module svc not found. Err connection refused");
        assert_eq!(
            AppError::InvalidCommand("bogus".to_string()).to_string(),
            "Invalid Command bogus"
        );
        assert_eq!(AppError::BadRequest("Missing trace Id".to_string()).to_string(), "Missing trace Id");
        assert_eq!(
            AppError::FileUnavailable("gone".to_string()).to_string(),
            "Cannot open file. Error: gone"
        );
    }

    #[tokio::test]
    async fn test_app_error_is_500() {
        let response = AppError::InvalidCommand("bogus".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
