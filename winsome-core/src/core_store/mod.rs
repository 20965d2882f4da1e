/*
    core_store - Authoritative state layer

    Handles:
    - Data models (users, posts, comments, ratings, wallet ledgers)
    - The shared in-memory repository with per-entity locking
    - Text validation against configured limits
    - Snapshot persistence across restarts
*/

pub mod model;
pub mod store;

// Re-export commonly used types
pub use model::{Comment, Post, PostId, SessionToken, Timestamp, User, UserId, Vote, WalletEntry};
pub use store::{LocalStore, StoreError, StoreResult};
