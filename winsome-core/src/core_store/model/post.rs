/*
    post.rs - Post aggregate

    Id, author, title and content never change after creation. Comments,
    ratings and the rewards check counter live behind a per-post mutex.

    Engagement timestamps are taken while the lock is held, so a rewards
    sweep that captured its cut-off before locking the post can never miss
    an event: anything inserted after the sweep read the post is stamped at
    or after the cut-off and falls into the next window.
*/

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::types::{PostId, Timestamp, UserId, Vote};
use crate::core_store::store::errors::{handle_poison, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: UserId,
    pub author_name: String,
    pub content: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub rater: UserId,
    pub vote: Vote,
    pub timestamp: Timestamp,
}

/// Mutable part of a post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostState {
    pub comments: Vec<Comment>,
    /// At most one rating per rater, fixed at first vote
    pub ratings: BTreeMap<UserId, Rating>,
    pub check_count: u64,
}

/// Engagement observed by one rewards check of a post
#[derive(Debug, Clone, PartialEq)]
pub struct Engagement {
    pub author: UserId,
    pub new_positive: u32,
    pub new_negative: u32,
    /// Comment count per distinct commenter inside the window, author excluded
    pub comments_by: BTreeMap<UserId, u32>,
    /// Every user who ever rated the post positively
    pub positive_raters: BTreeSet<UserId>,
    /// Check counter after this check's increment
    pub check_count: u64,
}

#[derive(Debug)]
pub struct Post {
    id: PostId,
    author: UserId,
    author_name: String,
    title: String,
    content: String,
    created_at: Timestamp,
    state: Mutex<PostState>,
}

impl Post {
    pub fn new(id: PostId, author: UserId, author_name: String, title: String, content: String) -> Self {
        Self::with_state(id, author, author_name, title, content, Timestamp::now(), PostState::default())
    }

    /// Rebuild a post from persisted parts
    pub fn with_state(
        id: PostId,
        author: UserId,
        author_name: String,
        title: String,
        content: String,
        created_at: Timestamp,
        state: PostState,
    ) -> Self {
        Post { id, author, author_name, title, content, created_at, state: Mutex::new(state) }
    }

    pub fn id(&self) -> PostId {
        self.id
    }

    pub fn author(&self) -> UserId {
        self.author
    }

    pub fn author_name(&self) -> &str {
        &self.author_name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Insert a rating unless `rater` already rated. Returns whether it was inserted.
    pub fn rate(&self, rater: UserId, vote: Vote) -> StoreResult<bool> {
        let mut state = self.state.lock().map_err(handle_poison)?;
        if state.ratings.contains_key(&rater) {
            return Ok(false);
        }
        let rating = Rating { rater, vote, timestamp: Timestamp::now() };
        state.ratings.insert(rater, rating);
        Ok(true)
    }

    /// Append a comment and return the stored copy
    pub fn comment(&self, author: UserId, author_name: &str, content: &str) -> StoreResult<Comment> {
        let mut state = self.state.lock().map_err(handle_poison)?;
        let comment = Comment {
            author,
            author_name: author_name.to_string(),
            content: content.to_string(),
            timestamp: Timestamp::now(),
        };
        state.comments.push(comment.clone());
        Ok(comment)
    }

    pub fn rating_count(&self) -> StoreResult<usize> {
        Ok(self.state.lock().map_err(handle_poison)?.ratings.len())
    }

    /// (positive, negative) vote totals
    pub fn vote_counts(&self) -> StoreResult<(usize, usize)> {
        let state = self.state.lock().map_err(handle_poison)?;
        let positive = state.ratings.values().filter(|r| r.vote.is_positive()).count();
        Ok((positive, state.ratings.len() - positive))
    }

    pub fn comments(&self) -> StoreResult<Vec<Comment>> {
        Ok(self.state.lock().map_err(handle_poison)?.comments.clone())
    }

    pub fn check_count(&self) -> StoreResult<u64> {
        Ok(self.state.lock().map_err(handle_poison)?.check_count)
    }

    /// Collect engagement in `[since, until)` and bump the check counter, atomically.
    pub fn record_check(&self, since: Timestamp, until: Timestamp) -> StoreResult<Engagement> {
        let mut state = self.state.lock().map_err(handle_poison)?;
        let in_window = |ts: Timestamp| ts >= since && ts < until;

        let mut new_positive = 0;
        let mut new_negative = 0;
        let mut positive_raters = BTreeSet::new();
        for rating in state.ratings.values() {
            if rating.vote.is_positive() {
                positive_raters.insert(rating.rater);
            }
            if in_window(rating.timestamp) {
                match rating.vote {
                    Vote::Up => new_positive += 1,
                    Vote::Down => new_negative += 1,
                }
            }
        }

        let mut comments_by = BTreeMap::new();
        for comment in &state.comments {
            if comment.author != self.author && in_window(comment.timestamp) {
                *comments_by.entry(comment.author).or_insert(0u32) += 1;
            }
        }

        state.check_count += 1;

        Ok(Engagement {
            author: self.author,
            new_positive,
            new_negative,
            comments_by,
            positive_raters,
            check_count: state.check_count,
        })
    }

    /// Consistent copy of the mutable state, for persistence
    pub fn snapshot(&self) -> StoreResult<PostState> {
        Ok(self.state.lock().map_err(handle_poison)?.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(author: UserId) -> Post {
        Post::new(PostId(1), author, "alice".to_string(), "T".to_string(), "C".to_string())
    }

    #[test]
    fn test_rating_is_fixed_at_first_vote() {
        let author = UserId::generate();
        let rater = UserId::generate();
        let p = post(author);

        assert!(p.rate(rater, Vote::Up).unwrap());
        assert!(!p.rate(rater, Vote::Down).unwrap());
        assert_eq!(p.rating_count().unwrap(), 1);
        assert_eq!(p.vote_counts().unwrap(), (1, 0));
    }

    #[test]
    fn test_comments_keep_order() {
        let p = post(UserId::generate());
        let bob = UserId::generate();
        p.comment(bob, "bob", "first").unwrap();
        p.comment(bob, "bob", "second").unwrap();

        let comments = p.comments().unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].content, "first");
        assert_eq!(comments[1].content, "second");
    }

    #[test]
    fn test_record_check_window_and_counter() {
        let author = UserId::generate();
        let bob = UserId::generate();
        let carol = UserId::generate();
        let p = post(author);

        p.rate(bob, Vote::Up).unwrap();
        p.rate(carol, Vote::Down).unwrap();
        p.comment(bob, "bob", "nice").unwrap();
        p.comment(author, "alice", "thanks").unwrap();

        let far_future = Timestamp(u64::MAX);
        let first = p.record_check(Timestamp::EPOCH, far_future).unwrap();
        assert_eq!(first.new_positive, 1);
        assert_eq!(first.new_negative, 1);
        assert_eq!(first.comments_by.get(&bob), Some(&1));
        assert!(!first.comments_by.contains_key(&author));
        assert!(first.positive_raters.contains(&bob));
        assert!(!first.positive_raters.contains(&carol));
        assert_eq!(first.check_count, 1);

        // Nothing new after the first cut-off, but positive raters persist
        let second = p.record_check(far_future, far_future).unwrap();
        assert_eq!(second.new_positive, 0);
        assert!(second.comments_by.is_empty());
        assert!(second.positive_raters.contains(&bob));
        assert_eq!(second.check_count, 2);
        assert_eq!(p.check_count().unwrap(), 2);
    }
}
