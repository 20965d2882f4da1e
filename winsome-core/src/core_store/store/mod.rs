/*
    Store subsystem - Repository, validation and persistence
*/

pub mod errors;
pub mod local_store;
pub mod snapshot;
pub mod validator;

pub use errors::*;
pub use local_store::{LocalStore, StoreStats};
pub use snapshot::{Checkpoint, PostRecord, SnapshotManager, SnapshotStats, UserRecord};
pub use validator::TextValidator;
