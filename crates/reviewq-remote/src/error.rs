use thiserror::Error;

/// Every way a call to the remote queue service can fail.
///
/// `Clone` because a single in-flight read is shared by every caller that
/// asked for the same key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Transient(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("request rejected: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("client setup failed: {0}")]
    Setup(String),
}

impl RemoteError {
    /// Classify a non-2xx response.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate_for_error(body);
        match status {
            401 | 403 => RemoteError::Unauthorized(message),
            400 | 404 | 422 => RemoteError::Validation(message),
            409 => RemoteError::Conflict(message),
            _ => RemoteError::Server { status, message },
        }
    }

    /// Connect, timeout, and other transport failures are all transient.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transient(err.to_string())
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }

    /// Reads retry on transient and server-side failures. An undecodable
    /// body counts as a server failure.
    pub fn is_retryable_read(&self) -> bool {
        matches!(
            self,
            RemoteError::Transient(_) | RemoteError::Server { .. } | RemoteError::Decode(_)
        )
    }

    /// Short message for the person at the dashboard.
    pub fn user_message(&self) -> String {
        match self {
            RemoteError::Transient(_) => {
                "Could not reach the review service. Check your connection and try again."
                    .to_string()
            }
            RemoteError::Unauthorized(_) => "Your session has expired. Sign in again.".to_string(),
            RemoteError::Validation(m) | RemoteError::Conflict(m) if !m.is_empty() => m.clone(),
            RemoteError::Validation(_) => "The request was rejected.".to_string(),
            RemoteError::Conflict(_) => "This card was changed elsewhere.".to_string(),
            RemoteError::Server { .. } | RemoteError::Decode(_) => {
                "The review service had a problem. Try again shortly.".to_string()
            }
            RemoteError::Setup(m) => m.clone(),
        }
    }
}

fn truncate_for_error(body: &str) -> String {
    const MAX_LEN: usize = 200;
    let body = body.trim();
    if body.chars().count() <= MAX_LEN {
        body.to_owned()
    } else {
        format!("{}...", body.chars().take(MAX_LEN).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert!(matches!(
            RemoteError::from_status(401, ""),
            RemoteError::Unauthorized(_)
        ));
        assert!(matches!(
            RemoteError::from_status(403, ""),
            RemoteError::Unauthorized(_)
        ));
        for s in [400, 404, 422] {
            assert!(matches!(
                RemoteError::from_status(s, "bad"),
                RemoteError::Validation(_)
            ));
        }
        assert!(matches!(
            RemoteError::from_status(409, ""),
            RemoteError::Conflict(_)
        ));
        assert_eq!(
            RemoteError::from_status(503, "down"),
            RemoteError::Server {
                status: 503,
                message: "down".into()
            }
        );
    }

    #[test]
    fn only_transport_and_server_failures_retry_reads() {
        assert!(RemoteError::Transient("x".into()).is_retryable_read());
        assert!(RemoteError::from_status(500, "").is_retryable_read());
        assert!(RemoteError::Decode("x".into()).is_retryable_read());
        assert!(!RemoteError::from_status(401, "").is_retryable_read());
        assert!(!RemoteError::from_status(422, "").is_retryable_read());
        assert!(!RemoteError::from_status(409, "").is_retryable_read());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(500);
        match RemoteError::from_status(500, &body) {
            RemoteError::Server { message, .. } => assert_eq!(message.len(), 203),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn validation_message_is_shown_verbatim() {
        let err = RemoteError::from_status(422, "reason is required");
        assert_eq!(err.user_message(), "reason is required");
    }
}
