//! Notification errors

use thiserror::Error;

use crate::core_store::model::SessionToken;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// A subscriber is already registered for this token
    #[error("Client already registered for token {0}")]
    AlreadyRegistered(SessionToken),

    /// Token does not belong to an open session
    #[error("No session for this token")]
    InvalidSession,

    /// Subscriber could not take the push
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Datagram socket failure
    #[error("Socket error: {0}")]
    Io(String),
}

impl From<std::io::Error> for NotifyError {
    fn from(err: std::io::Error) -> Self {
        NotifyError::Io(err.to_string())
    }
}
