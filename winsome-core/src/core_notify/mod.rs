/*
    core_notify - Push notifications

    Two channels, both best-effort:
    - follower-list pushes to registered subscribers (one per session token)
    - a plain-text UDP multicast datagram after every rewards sweep
*/

pub mod errors;
pub mod multicast;
pub mod service;
pub mod subscriber;

pub use errors::NotifyError;
pub use multicast::{MulticastNotifier, REWARD_MESSAGE};
pub use service::NotificationService;
pub use subscriber::{ChannelSubscriber, FollowerSubscriber};
