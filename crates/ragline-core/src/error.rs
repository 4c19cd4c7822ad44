//! Error types for ragline

use thiserror::Error;

/// Result type alias using RagError
pub type Result<T> = std::result::Result<T, RagError>;

/// Error type alias for convenience
pub type Error = RagError;

/// Exit codes for CLI
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_INPUT: i32 = 3;
    pub const UPSTREAM_UNAVAILABLE: i32 = 4;
    pub const UPSTREAM_TIMEOUT: i32 = 5;
    pub const UPSTREAM_PROTOCOL: i32 = 6;
    pub const CONFIGURATION: i32 = 7;
}

/// Coarse error category a host maps to a user-visible outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Collaborator could not be reached
    CollaboratorUnavailable,
    /// Collaborator did not answer within its timeout
    CollaboratorTimeout,
    /// Collaborator answered with something we could not use
    UpstreamProtocol,
    /// The caller asked for something unsupported
    ClientRequest,
    /// No usable provider or invalid settings
    Configuration,
    /// Local storage, IO or serialization failure
    Internal,
}

/// Main error type for ragline
#[derive(Debug, Error)]
pub enum RagError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Service timed out: {0}")]
    Timeout(String),

    #[error("Upstream protocol error: {0}")]
    UpstreamProtocol(String),

    #[error("Bad request: {0}")]
    ClientRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// Classify a transport-level HTTP failure for `service`
    pub fn from_http(service: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(format!("{}: {}", service, err))
        } else if err.is_connect() {
            Self::Unavailable(format!("{}: {}", service, err))
        } else if err.is_decode() || err.is_body() {
            Self::UpstreamProtocol(format!("{}: {}", service, err))
        } else if let Some(status) = err.status() {
            Self::from_status(service, status, &err.to_string())
        } else {
            Self::Unavailable(format!("{}: {}", service, err))
        }
    }

    /// Classify a non-success HTTP response from `service`
    pub fn from_status(service: &str, status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("{} returned HTTP {}: {}", service, status, body);
        match status.as_u16() {
            504 => Self::Timeout(message),
            502 | 503 => Self::Unavailable(message),
            _ => Self::UpstreamProtocol(message),
        }
    }

    /// Get the category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::CollaboratorUnavailable,
            Self::Timeout(_) => ErrorKind::CollaboratorTimeout,
            Self::UpstreamProtocol(_) => ErrorKind::UpstreamProtocol,
            Self::ClientRequest(_) | Self::InvalidInput(_) => ErrorKind::ClientRequest,
            Self::Config(_) | Self::Yaml(_) => ErrorKind::Configuration,
            Self::Database(_) | Self::Io(_) | Self::Serialization(_) | Self::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::CollaboratorUnavailable => exit_codes::UPSTREAM_UNAVAILABLE,
            ErrorKind::CollaboratorTimeout => exit_codes::UPSTREAM_TIMEOUT,
            ErrorKind::UpstreamProtocol => exit_codes::UPSTREAM_PROTOCOL,
            ErrorKind::ClientRequest => exit_codes::INVALID_INPUT,
            ErrorKind::Configuration => exit_codes::CONFIGURATION,
            ErrorKind::Internal => exit_codes::GENERAL_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        let err = RagError::from_status("ollama", StatusCode::GATEWAY_TIMEOUT, "");
        assert_eq!(err.kind(), ErrorKind::CollaboratorTimeout);

        let err = RagError::from_status("ollama", StatusCode::SERVICE_UNAVAILABLE, "down");
        assert_eq!(err.kind(), ErrorKind::CollaboratorUnavailable);

        let err = RagError::from_status("cloud", StatusCode::UNAUTHORIZED, "bad key");
        assert_eq!(err.kind(), ErrorKind::UpstreamProtocol);
        assert!(err.to_string().contains("bad key"));
    }

    #[test]
    fn test_exit_codes_are_distinct_per_kind() {
        let codes = [
            RagError::Unavailable(String::new()).exit_code(),
            RagError::Timeout(String::new()).exit_code(),
            RagError::UpstreamProtocol(String::new()).exit_code(),
            RagError::ClientRequest(String::new()).exit_code(),
            RagError::Config(String::new()).exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(
            RagError::ClientRequest("x".into()).exit_code(),
            exit_codes::INVALID_INPUT
        );
    }
}
