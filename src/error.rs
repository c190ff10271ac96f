//! Error types shared across the dispatcher, backend client and task manager

use std::time::Duration;

/// Failure of a single backend exchange
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    #[error("backend timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("backend returned HTTP {code}")]
    BadStatus { code: u16, detail: Option<String> },

    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Only transport failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }

    /// Error text reported by the backend itself, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::BadStatus { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

/// Rejected user input or task descriptor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("message is {len} characters, limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("invalid schedule {value:?} for {kind}: {reason}")]
    MalformedSchedule {
        kind: String,
        value: String,
        reason: String,
    },

    #[error("invalid task descriptor: {0}")]
    MalformedDescriptor(String),
}

/// Everything that can go wrong while handling one inbound message
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("permission level {actual} is below the required {required}")]
    PermissionDenied { required: u32, actual: u32 },

    #[error("missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(BackendError::Unreachable("refused".into()).is_retryable());
        assert!(BackendError::Timeout(Duration::from_secs(30)).is_retryable());
        assert!(!BackendError::BadStatus { code: 400, detail: None }.is_retryable());
        assert!(!BackendError::BadStatus { code: 503, detail: None }.is_retryable());
        assert!(!BackendError::MalformedResponse("eof".into()).is_retryable());
    }

    #[test]
    fn test_length_error_names_actual_length() {
        let err = ValidationError::MessageTooLong { len: 2001, max: 2000 };
        assert!(err.to_string().contains("2001"));
    }
}
