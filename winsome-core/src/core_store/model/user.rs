/*
    user.rs - User aggregate

    Immutable identity fields (id, username, credential, tags) plus a mutable
    part (follow-set, blog, wallet ledger) guarded by one lock per user.
    Every mutation is a single atomic method; callers never see the lock.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::RwLock;

use super::types::{PostId, Timestamp, UserId};
use crate::core_store::store::errors::{handle_poison, StoreResult};

/// One reward credit in a user's append-only ledger
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalletEntry {
    pub amount: f64,
    pub timestamp: Timestamp,
}

/// Mutable part of a user
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserState {
    pub following: BTreeSet<UserId>,
    pub blog: BTreeSet<PostId>,
    pub wallet: Vec<WalletEntry>,
}

#[derive(Debug)]
pub struct User {
    id: UserId,
    username: String,
    password: String,
    tags: BTreeSet<String>,
    state: RwLock<UserState>,
}

impl User {
    pub fn new(id: UserId, username: String, password: String, tags: BTreeSet<String>) -> Self {
        Self::with_state(id, username, password, tags, UserState::default())
    }

    /// Rebuild a user from persisted parts
    pub fn with_state(
        id: UserId,
        username: String,
        password: String,
        tags: BTreeSet<String>,
        state: UserState,
    ) -> Self {
        User { id, username, password, tags, state: RwLock::new(state) }
    }

    pub fn id(&self) -> UserId {
        self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Plaintext comparison
    pub fn check_password(&self, candidate: &str) -> bool {
        self.password == candidate
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub fn shares_tag_with(&self, other: &User) -> bool {
        self.tags.iter().any(|tag| other.tags.contains(tag))
    }

    /// Add `target` to the follow-set. Returns false if already followed.
    pub fn follow(&self, target: UserId) -> StoreResult<bool> {
        Ok(self.state.write().map_err(handle_poison)?.following.insert(target))
    }

    /// Remove `target` from the follow-set. Returns false if it was not followed.
    pub fn unfollow(&self, target: UserId) -> StoreResult<bool> {
        Ok(self.state.write().map_err(handle_poison)?.following.remove(&target))
    }

    pub fn follows(&self, target: UserId) -> StoreResult<bool> {
        Ok(self.state.read().map_err(handle_poison)?.following.contains(&target))
    }

    pub fn following(&self) -> StoreResult<Vec<UserId>> {
        Ok(self.state.read().map_err(handle_poison)?.following.iter().copied().collect())
    }

    /// Add a post to the blog. Returns false if it was already present.
    pub fn add_to_blog(&self, post: PostId) -> StoreResult<bool> {
        Ok(self.state.write().map_err(handle_poison)?.blog.insert(post))
    }

    pub fn remove_from_blog(&self, post: PostId) -> StoreResult<bool> {
        Ok(self.state.write().map_err(handle_poison)?.blog.remove(&post))
    }

    /// Read the blog, dropping ids for which `is_live` is false.
    ///
    /// Reshared posts deleted by their author stay in the set until the next
    /// read prunes them.
    pub fn blog_pruned(&self, is_live: impl Fn(PostId) -> bool) -> StoreResult<Vec<PostId>> {
        let mut state = self.state.write().map_err(handle_poison)?;
        state.blog.retain(|id| is_live(*id));
        Ok(state.blog.iter().copied().collect())
    }

    /// Blog ids without pruning
    pub fn blog(&self) -> StoreResult<Vec<PostId>> {
        Ok(self.state.read().map_err(handle_poison)?.blog.iter().copied().collect())
    }

    /// Append a ledger entry
    pub fn credit(&self, amount: f64, timestamp: Timestamp) -> StoreResult<()> {
        self.state
            .write()
            .map_err(handle_poison)?
            .wallet
            .push(WalletEntry { amount, timestamp });
        Ok(())
    }

    pub fn wallet(&self) -> StoreResult<Vec<WalletEntry>> {
        Ok(self.state.read().map_err(handle_poison)?.wallet.clone())
    }

    pub fn wallet_total(&self) -> StoreResult<f64> {
        Ok(self.state.read().map_err(handle_poison)?.wallet.iter().map(|e| e.amount).sum())
    }

    /// Consistent copy of the mutable state, for persistence
    pub fn snapshot(&self) -> StoreResult<UserState> {
        Ok(self.state.read().map_err(handle_poison)?.clone())
    }
}
