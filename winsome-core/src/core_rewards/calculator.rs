/*
    calculator.rs - Reward arithmetic for one post check

    likeScore    = ln(1 + max(0, newPositive - newNegative))
    weight(k)    = 2 / (1 + e^-(k - 1))          k = comments by one user
    commentScore = ln(1 + sum of weight(k) over distinct commenters)
    total        = (likeScore + commentScore) / checkCount

    The author takes `author_share` of the total; the rest is split evenly
    across the curators (every positive rater ever, plus this window's
    commenters). With no curators the remainder is not paid out.
*/

use std::collections::BTreeSet;

use crate::core_store::model::{Engagement, PostId, UserId};

/// Payout computed for one post
#[derive(Debug, Clone, PartialEq)]
pub struct PostReward {
    pub post: PostId,
    pub author: UserId,
    pub total: f64,
    pub author_amount: f64,
    pub curators: BTreeSet<UserId>,
    /// Amount paid to each curator
    pub curator_amount: f64,
}

impl PostReward {
    /// Sum of everything this reward credits
    pub fn paid_out(&self) -> f64 {
        self.author_amount + self.curator_amount * self.curators.len() as f64
    }
}

pub fn like_score(new_positive: u32, new_negative: u32) -> f64 {
    let net = (i64::from(new_positive) - i64::from(new_negative)).max(0);
    (net as f64).ln_1p()
}

pub fn comment_weight(comments: u32) -> f64 {
    2.0 / (1.0 + (-(f64::from(comments) - 1.0)).exp())
}

pub fn comment_score(per_commenter: impl IntoIterator<Item = u32>) -> f64 {
    per_commenter.into_iter().map(comment_weight).sum::<f64>().ln_1p()
}

/// Split the reward of one check. `engagement.check_count` must already
/// include this check.
pub fn post_reward(post: PostId, engagement: &Engagement, author_share: f64) -> PostReward {
    let raw = like_score(engagement.new_positive, engagement.new_negative)
        + comment_score(engagement.comments_by.values().copied());
    let total = raw / engagement.check_count.max(1) as f64;

    let mut curators = engagement.positive_raters.clone();
    curators.extend(engagement.comments_by.keys().copied());
    curators.remove(&engagement.author);

    let author_amount = total * author_share;
    let curator_amount = if curators.is_empty() {
        0.0
    } else {
        total * (1.0 - author_share) / curators.len() as f64
    };

    PostReward { post, author: engagement.author, total, author_amount, curators, curator_amount }
}
