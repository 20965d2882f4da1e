//! Push endpoints for follower-list updates

use tokio::sync::mpsc::{self, error::TrySendError};

use super::errors::NotifyError;

/// Receives the full, current follower list of one user
///
/// Implementations must not block: pushes are issued from request workers
/// and from the registration path.
pub trait FollowerSubscriber: Send + Sync {
    fn push_followers(&self, followers: &[String]) -> Result<(), NotifyError>;
}

/// Forwards pushes into a bounded channel; a full queue drops the push
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    tx: mpsc::Sender<Vec<String>>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<Vec<String>>) -> Self {
        ChannelSubscriber { tx }
    }

    /// Subscriber plus the receiving end, with room for `capacity` pushes
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Vec<String>>) {
        let (tx, rx) = mpsc::channel(capacity);
        (ChannelSubscriber { tx }, rx)
    }
}

impl FollowerSubscriber for ChannelSubscriber {
    fn push_followers(&self, followers: &[String]) -> Result<(), NotifyError> {
        self.tx.try_send(followers.to_vec()).map_err(|e| match e {
            TrySendError::Full(_) => NotifyError::Delivery("subscriber queue full".to_string()),
            TrySendError::Closed(_) => NotifyError::Delivery("subscriber disconnected".to_string()),
        })
    }
}
