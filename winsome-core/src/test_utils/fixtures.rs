//! Test fixtures for building a wired engine
//!
//! `TestWorld` owns a fresh store, a notification service without multicast,
//! and an engine backed by a fixed conversion rate.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::core_engine::{Engine, FixedRate};
use crate::core_notify::{FollowerSubscriber, NotificationService, NotifyError};
use crate::core_store::model::{SessionToken, User};
use crate::core_store::store::{LocalStore, TextValidator};

pub struct TestWorld {
    pub config: Config,
    pub store: Arc<LocalStore>,
    pub notifier: Arc<NotificationService>,
    pub engine: Engine,
}

impl TestWorld {
    pub fn new() -> Self {
        Self::with_rate(1.0)
    }

    pub fn with_rate(rate: f64) -> Self {
        let config = Config::default();
        let store = Arc::new(LocalStore::new());
        let notifier = Arc::new(NotificationService::new(store.clone(), None));
        let engine = Engine::new(
            store.clone(),
            notifier.clone(),
            Arc::new(FixedRate(rate)),
            TextValidator::new(config.limits.clone()),
            config.notify.multicast_address,
        );
        TestWorld { config, store, notifier, engine }
    }

    /// Register a user directly in the store
    pub fn user(&self, name: &str, tags: &[&str]) -> Arc<User> {
        let tags: BTreeSet<String> = tags.iter().map(|t| t.to_string()).collect();
        self.store.register(name, "pw", tags).unwrap()
    }

    /// Open a session for `user` and attach a recording subscriber to it
    pub fn subscribe(&self, user: &User) -> Arc<RecordingSubscriber> {
        let token = self.session(user);
        let recorder = Arc::new(RecordingSubscriber::default());
        self.notifier.register(token, recorder.clone()).unwrap();
        recorder
    }

    pub fn session(&self, user: &User) -> SessionToken {
        self.store.open_session(user.id())
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Subscriber that keeps every follower list pushed to it
#[derive(Default)]
pub struct RecordingSubscriber {
    pushes: Mutex<Vec<Vec<String>>>,
}

impl RecordingSubscriber {
    pub fn count(&self) -> usize {
        self.pushes.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Vec<String>> {
        self.pushes.lock().unwrap().last().cloned()
    }

    pub fn all(&self) -> Vec<Vec<String>> {
        self.pushes.lock().unwrap().clone()
    }
}

impl FollowerSubscriber for RecordingSubscriber {
    fn push_followers(&self, followers: &[String]) -> Result<(), NotifyError> {
        self.pushes.lock().unwrap().push(followers.to_vec());
        Ok(())
    }
}
