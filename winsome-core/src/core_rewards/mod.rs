/*
    core_rewards - Engagement-based Wincoin payouts
*/

pub mod calculator;
pub mod engine;

pub use calculator::{comment_score, comment_weight, like_score, post_reward, PostReward};
pub use engine::{RewardsEngine, SweepReport};
