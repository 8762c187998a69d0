use std::time::Duration;

use crate::ids::{ConnectionId, SessionId};

/// Errors from the upstream completion provider.
/// These never leave the completion gateway; they are classified for logging only.
#[derive(Clone, Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("network error: {0}")]
    NetworkError(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl GatewayError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "authentication_failed",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited(_) => "rate_limited",
            Self::ServerError { .. } => "server_error",
            Self::NetworkError(_) => "network_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Classify an HTTP status code into the appropriate error variant.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(body),
            400 | 404 => Self::InvalidRequest(body),
            429 => Self::RateLimited(body),
            500..=599 => Self::ServerError { status, body },
            _ => Self::InvalidRequest(format!("unexpected status {status}: {body}")),
        }
    }
}

/// A connection-level failure. Logged and followed by cleanup; never fatal to the service.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("receive failed on {connection_id}: {reason}")]
    Receive {
        connection_id: ConnectionId,
        reason: String,
    },
    #[error("send failed on {connection_id}: {reason}")]
    Send {
        connection_id: ConnectionId,
        reason: String,
    },
}

/// Failure to hand a relayed message to a single recipient.
/// Isolated to that recipient; the sender never sees it.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("recipient {recipient} in session {session_id} is closed")]
    Closed {
        session_id: SessionId,
        recipient: ConnectionId,
    },
    #[error("recipient {recipient} in session {session_id} has a full send queue")]
    QueueFull {
        session_id: SessionId,
        recipient: ConnectionId,
    },
}

impl DeliveryError {
    pub fn recipient(&self) -> &ConnectionId {
        match self {
            Self::Closed { recipient, .. } | Self::QueueFull { recipient, .. } => recipient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_status_mapping() {
        assert!(matches!(
            GatewayError::from_status(401, "unauthorized".into()),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            GatewayError::from_status(403, "forbidden".into()),
            GatewayError::AuthenticationFailed(_)
        ));
        assert!(matches!(
            GatewayError::from_status(400, "bad".into()),
            GatewayError::InvalidRequest(_)
        ));
        assert!(matches!(
            GatewayError::from_status(429, "slow down".into()),
            GatewayError::RateLimited(body) if body == "slow down"
        ));
        assert!(matches!(
            GatewayError::from_status(502, "bad gateway".into()),
            GatewayError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            GatewayError::from_status(302, "moved".into()),
            GatewayError::InvalidRequest(_)
        ));
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(GatewayError::Timeout(Duration::from_secs(3)).error_kind(), "timeout");
        assert_eq!(
            GatewayError::RateLimited("quota".into()).error_kind(),
            "rate_limited"
        );
    }

    #[test]
    fn delivery_error_names_recipient() {
        let recipient = ConnectionId::new();
        let err = DeliveryError::QueueFull {
            session_id: SessionId::from_raw("s1"),
            recipient: recipient.clone(),
        };
        assert_eq!(err.recipient(), &recipient);
        assert!(err.to_string().contains("full send queue"));
    }
}
