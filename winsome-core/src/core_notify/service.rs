/*
    service.rs - Subscriber registry and fan-out

    Registry: session token -> (user, subscriber), under its own lock.
    - register rejects an existing entry instead of overwriting it, then
      pushes the current follower list
    - unregister is idempotent
    - a follow-set change pushes the new list to every subscriber of the
      user who gained or lost a follower; reading the list and delivering
      it happen under one delivery lock, so the last push a subscriber
      receives is never older than an earlier one

    Delivery is fire-and-forget. Failures are logged and counted, never
    returned to the operation that caused them.
*/

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::errors::NotifyError;
use super::multicast::MulticastNotifier;
use super::subscriber::FollowerSubscriber;
use crate::core_store::model::{SessionToken, UserId};
use crate::core_store::store::LocalStore;
use crate::metrics::{record_counter, NOTIFY_FAILURES, NOTIFY_PUSHES};

struct Registration {
    user: UserId,
    subscriber: Arc<dyn FollowerSubscriber>,
}

pub struct NotificationService {
    store: Arc<LocalStore>,
    subscribers: RwLock<HashMap<SessionToken, Registration>>,
    deliveries: Mutex<()>,
    multicast: Option<MulticastNotifier>,
}

impl NotificationService {
    pub fn new(store: Arc<LocalStore>, multicast: Option<MulticastNotifier>) -> Self {
        NotificationService {
            store,
            subscribers: RwLock::new(HashMap::new()),
            deliveries: Mutex::new(()),
            multicast,
        }
    }

    /// Register a push endpoint for an open session
    pub fn register(
        &self,
        token: SessionToken,
        subscriber: Arc<dyn FollowerSubscriber>,
    ) -> Result<(), NotifyError> {
        let user = self.store.session_user(&token).ok_or(NotifyError::InvalidSession)?;

        let mut subscribers = self.subscribers.write().map_err(|_| poisoned())?;
        if subscribers.contains_key(&token) {
            return Err(NotifyError::AlreadyRegistered(token));
        }

        // Pushed under the registry lock so a concurrent follow cannot
        // overtake the initial list
        match self.store.followers_of(user) {
            Ok(followers) => deliver(subscriber.as_ref(), &followers),
            Err(e) => warn!(error = %e, "Could not read followers for new subscriber"),
        }
        subscribers.insert(token, Registration { user, subscriber });
        info!(%user, "Client registered for follower updates");
        Ok(())
    }

    /// Remove a registration. Returns whether one existed.
    pub fn unregister(&self, token: &SessionToken) -> bool {
        let removed = match self.subscribers.write() {
            Ok(mut subscribers) => subscribers.remove(token).is_some(),
            Err(_) => {
                warn!("Subscriber registry poisoned");
                false
            }
        };
        if removed {
            info!("Client unregistered from follower updates");
        } else {
            debug!("Unregister for a token with no subscriber");
        }
        removed
    }

    pub fn is_registered(&self, token: &SessionToken) -> bool {
        self.subscribers.read().map(|s| s.contains_key(token)).unwrap_or(false)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().map(|s| s.len()).unwrap_or(0)
    }

    /// Push the current follower list of `user` to each of its subscribers
    pub fn notify_followers_changed(&self, user: UserId) {
        let Ok(_delivering) = self.deliveries.lock() else {
            warn!("Delivery lock poisoned");
            return;
        };
        let targets: Vec<Arc<dyn FollowerSubscriber>> = match self.subscribers.read() {
            Ok(subscribers) => subscribers
                .values()
                .filter(|r| r.user == user)
                .map(|r| r.subscriber.clone())
                .collect(),
            Err(_) => {
                warn!("Subscriber registry poisoned");
                return;
            }
        };
        if targets.is_empty() {
            return;
        }

        let followers = match self.store.followers_of(user) {
            Ok(followers) => followers,
            Err(e) => {
                warn!(%user, error = %e, "Could not read followers for push");
                record_counter(NOTIFY_FAILURES, 1);
                return;
            }
        };
        for subscriber in targets {
            deliver(subscriber.as_ref(), &followers);
        }
    }

    /// Announce a completed rewards sweep
    pub async fn broadcast_rewards(&self) {
        let Some(multicast) = &self.multicast else {
            return;
        };
        match multicast.announce_rewards().await {
            Ok(()) => debug!(target = %multicast.target(), "Reward datagram sent"),
            Err(e) => {
                warn!(target = %multicast.target(), error = %e, "Reward datagram failed");
                record_counter(NOTIFY_FAILURES, 1);
            }
        }
    }
}

fn deliver(subscriber: &dyn FollowerSubscriber, followers: &[String]) {
    match subscriber.push_followers(followers) {
        Ok(()) => record_counter(NOTIFY_PUSHES, 1),
        Err(e) => {
            warn!(error = %e, "Follower update not delivered");
            record_counter(NOTIFY_FAILURES, 1);
        }
    }
}

fn poisoned() -> NotifyError {
    NotifyError::Delivery("subscriber registry poisoned".to_string())
}
