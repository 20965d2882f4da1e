/*
    local_store.rs - Authoritative in-memory repository

    Holds users (by id, with a username index), posts (by id) and sessions
    (token -> user). Built once at startup and shared by reference with
    every component; there is no global state.

    Architecture:
    - Sharded concurrent maps (dashmap) for the indices, so lookups on
      unrelated keys never contend
    - One lock per user / per post for their mutable parts (see model/)
    - Post ids come from a single atomic counter: strictly increasing,
      never reused
*/

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::core_store::model::{Post, PostId, SessionToken, User, UserId};
use crate::core_store::store::errors::{StoreError, StoreResult};

/// Main store interface
#[derive(Debug, Default)]
pub struct LocalStore {
    users: DashMap<UserId, Arc<User>>,
    usernames: DashMap<String, UserId>,
    posts: DashMap<PostId, Arc<Post>>,
    sessions: DashMap<SessionToken, UserId>,
    /// Last assigned post id
    last_post_id: AtomicU64,
}

/// Store statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub users: usize,
    pub posts: usize,
    pub sessions: usize,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new user. Fails if the username is taken.
    pub fn register(&self, username: &str, password: &str, tags: BTreeSet<String>) -> StoreResult<Arc<User>> {
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(format!("username '{}'", username))),
            Entry::Vacant(slot) => {
                let user = Arc::new(User::new(
                    UserId::generate(),
                    username.to_string(),
                    password.to_string(),
                    tags,
                ));
                self.users.insert(user.id(), user.clone());
                slot.insert(user.id());
                Ok(user)
            }
        }
    }

    /// Insert a user rebuilt from a snapshot
    pub fn restore_user(&self, user: User) -> StoreResult<Arc<User>> {
        match self.usernames.entry(user.username().to_string()) {
            Entry::Occupied(_) => Err(StoreError::CorruptedData(format!(
                "duplicate username '{}' in snapshot",
                user.username()
            ))),
            Entry::Vacant(slot) => {
                let user = Arc::new(user);
                self.users.insert(user.id(), user.clone());
                slot.insert(user.id());
                Ok(user)
            }
        }
    }

    pub fn user(&self, id: UserId) -> Option<Arc<User>> {
        self.users.get(&id).map(|entry| entry.value().clone())
    }

    pub fn user_by_name(&self, username: &str) -> Option<Arc<User>> {
        let id = *self.usernames.get(username)?.value();
        self.user(id)
    }

    /// All users, ordered by username
    pub fn users(&self) -> Vec<Arc<User>> {
        let mut users: Vec<Arc<User>> = self.users.iter().map(|entry| entry.value().clone()).collect();
        users.sort_by(|a, b| a.username().cmp(b.username()));
        users
    }

    /// Usernames of everyone whose follow-set contains `id`, sorted
    pub fn followers_of(&self, id: UserId) -> StoreResult<Vec<String>> {
        let mut followers = Vec::new();
        for user in self.users() {
            if user.follows(id)? {
                followers.push(user.username().to_string());
            }
        }
        Ok(followers)
    }

    pub fn open_session(&self, user: UserId) -> SessionToken {
        let token = SessionToken::generate();
        self.sessions.insert(token, user);
        token
    }

    pub fn session_user(&self, token: &SessionToken) -> Option<UserId> {
        self.sessions.get(token).map(|entry| *entry.value())
    }

    /// Drop a session. Returns false if it did not exist.
    pub fn close_session(&self, token: &SessionToken) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Assign the next post id, index the post and append it to the author's blog
    pub fn create_post(&self, author: &User, title: &str, content: &str) -> StoreResult<Arc<Post>> {
        let id = PostId(self.last_post_id.fetch_add(1, Ordering::SeqCst) + 1);
        let post = Arc::new(Post::new(
            id,
            author.id(),
            author.username().to_string(),
            title.to_string(),
            content.to_string(),
        ));
        self.posts.insert(id, post.clone());
        author.add_to_blog(id)?;
        Ok(post)
    }

    /// Insert a post rebuilt from a snapshot and move the id counter past it
    pub fn restore_post(&self, post: Post) -> StoreResult<Arc<Post>> {
        let id = post.id();
        if self.posts.contains_key(&id) {
            return Err(StoreError::CorruptedData(format!("duplicate post id {} in snapshot", id)));
        }
        self.reserve_post_ids(id);
        let post = Arc::new(post);
        self.posts.insert(id, post.clone());
        Ok(post)
    }

    pub fn post(&self, id: PostId) -> Option<Arc<Post>> {
        self.posts.get(&id).map(|entry| entry.value().clone())
    }

    pub fn contains_post(&self, id: PostId) -> bool {
        self.posts.contains_key(&id)
    }

    /// Remove a post from the global index
    pub fn remove_post(&self, id: PostId) -> Option<Arc<Post>> {
        self.posts.remove(&id).map(|(_, post)| post)
    }

    /// All posts, ascending by id
    pub fn posts(&self) -> Vec<Arc<Post>> {
        let mut posts: Vec<Arc<Post>> = self.posts.iter().map(|entry| entry.value().clone()).collect();
        posts.sort_by_key(|p| p.id());
        posts
    }

    /// Blog ids of `user` that are still indexed, pruning the rest
    pub fn live_blog(&self, user: &User) -> StoreResult<Vec<Arc<Post>>> {
        let ids = user.blog_pruned(|id| self.contains_post(id))?;
        Ok(ids.into_iter().filter_map(|id| self.post(id)).collect())
    }

    /// Never hand out `id` or anything below it again
    pub fn reserve_post_ids(&self, id: PostId) {
        self.last_post_id.fetch_max(id.0, Ordering::SeqCst);
    }

    pub fn last_post_id(&self) -> PostId {
        PostId(self.last_post_id.load(Ordering::SeqCst))
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats { users: self.users.len(), posts: self.posts.len(), sessions: self.sessions.len() }
    }
}
