/*
    Model subsystem - Data structures for entities
*/

pub mod post;
pub mod types;
pub mod user;

pub use post::*;
pub use types::*;
pub use user::*;
