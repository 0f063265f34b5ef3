use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Precondition not met in a way that ends the session. The message
    /// becomes the Failed status message.
    #[error("{0}")]
    Validation(String),

    /// Precondition not met yet but expected to resolve; carries the delay
    /// before the next attempt.
    #[error("{reason}")]
    Requeue { reason: String, after: Duration },

    #[error("Endpoint discovery failed: {0}")]
    EndpointDiscovery(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl Error {
    /// Determine if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::KubeError(_) | Error::Requeue { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requeue_and_kube_errors_are_retryable() {
        let e = Error::Requeue {
            reason: "pod is not running yet".to_string(),
            after: Duration::from_secs(30),
        };
        assert!(e.is_retryable());
        assert!(!Error::Validation("target pod 'ghost' not found".to_string()).is_retryable());
    }
}
