/*
    engine.rs - Periodic rewards sweep

    One sweep:
    1. capture `now`; the window is [last_check, now)
    2. for each indexed post, atomically read its engagement in the window
       and bump its check counter
    3. compute the payout and append ledger entries stamped `now`
    4. `last_check = now`

    The engine's own mutex is held for the whole sweep, so two sweeps never
    overlap even if a caller schedules them carelessly.
*/

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::calculator::{post_reward, PostReward};
use crate::core_store::model::Timestamp;
use crate::core_store::store::{handle_poison, LocalStore, StoreResult};
use crate::metrics::{record_counter, record_histogram, REWARDS_CREDITED, REWARDS_SWEEPS};

/// Outcome of one sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub posts_checked: usize,
    pub entries: usize,
    pub total_credited: f64,
}

pub struct RewardsEngine {
    store: Arc<LocalStore>,
    author_share: f64,
    last_check: Mutex<Timestamp>,
}

impl RewardsEngine {
    /// `last_check` is the baseline restored from the checkpoint
    pub fn new(store: Arc<LocalStore>, author_share: f64, last_check: Timestamp) -> Self {
        RewardsEngine { store, author_share, last_check: Mutex::new(last_check) }
    }

    pub fn author_share(&self) -> f64 {
        self.author_share
    }

    /// End of the last completed window
    pub fn last_check(&self) -> StoreResult<Timestamp> {
        Ok(*self.last_check.lock().map_err(handle_poison)?)
    }

    pub fn sweep(&self) -> StoreResult<SweepReport> {
        self.sweep_at(Timestamp::now())
    }

    /// Run a sweep whose window ends at `now`
    pub fn sweep_at(&self, now: Timestamp) -> StoreResult<SweepReport> {
        let mut last_check = self.last_check.lock().map_err(handle_poison)?;
        let since = *last_check;
        // a clock step backwards yields an empty window rather than a replay
        let until = now.max(since);

        let mut report = SweepReport { window_start: since, window_end: until, ..Default::default() };

        for post in self.store.posts() {
            let engagement = post.record_check(since, until)?;
            report.posts_checked += 1;

            let reward = post_reward(post.id(), &engagement, self.author_share);
            if reward.total <= 0.0 {
                continue;
            }
            self.credit(&reward, until, &mut report)?;
        }

        *last_check = until;
        drop(last_check);

        record_counter(REWARDS_SWEEPS, 1);
        info!(
            window_start = %report.window_start,
            window_end = %report.window_end,
            posts = report.posts_checked,
            entries = report.entries,
            total = report.total_credited,
            "Rewards sweep complete"
        );
        Ok(report)
    }

    fn credit(&self, reward: &PostReward, at: Timestamp, report: &mut SweepReport) -> StoreResult<()> {
        let mut payouts = vec![(reward.author, reward.author_amount)];
        payouts.extend(reward.curators.iter().map(|c| (*c, reward.curator_amount)));

        for (user_id, amount) in payouts {
            let Some(user) = self.store.user(user_id) else {
                warn!(user = %user_id, post = %reward.post, "Reward recipient no longer exists");
                continue;
            };
            user.credit(amount, at)?;
            report.entries += 1;
            report.total_credited += amount;
            record_histogram(REWARDS_CREDITED, amount);
            debug!(user = %user.username(), post = %reward.post, amount, "Wincoins credited");
        }
        Ok(())
    }
}
