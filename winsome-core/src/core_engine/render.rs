//! Text payloads returned to clients

use std::fmt::Write;
use std::sync::Arc;

use crate::core_store::model::{Comment, Post, User, UserId, WalletEntry};

pub fn users(users: &[Arc<User>]) -> String {
    if users.is_empty() {
        return "No users share your interests.\n".to_string();
    }
    let mut out = String::from("User | Tags\n");
    for user in users {
        let tags: Vec<&str> = user.tags().iter().map(String::as_str).collect();
        let _ = writeln!(out, "* {} | {}", user.username(), tags.join(", "));
    }
    out
}

pub fn names(label: &str, names: &[String]) -> String {
    if names.is_empty() {
        return format!("{}: none\n", label);
    }
    format!("{}: {}\n", label, names.join(", "))
}

/// `id | author | title` per post. When `owner` is given, posts by anyone
/// else are marked as rewins.
pub fn post_list(posts: &[Arc<Post>], owner: Option<UserId>) -> String {
    if posts.is_empty() {
        return "No posts.\n".to_string();
    }
    let mut out = String::from("Id | Author | Title\n");
    for post in posts {
        let _ = write!(out, "{} | {} | {}", post.id(), post.author_name(), post.title());
        if owner.is_some_and(|owner| owner != post.author()) {
            out.push_str(" (rewin)");
        }
        out.push('\n');
    }
    out
}

pub fn post(post: &Post, positive: usize, negative: usize, comments: &[Comment]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Title: {}", post.title());
    let _ = writeln!(out, "Content: {}", post.content());
    let _ = writeln!(out, "Votes: {} positive, {} negative", positive, negative);
    if comments.is_empty() {
        out.push_str("Comments: none yet.\n");
    } else {
        out.push_str("Comments:\n");
        for c in comments {
            out.push_str(&comment(c));
        }
    }
    out
}

pub fn comment(comment: &Comment) -> String {
    format!("* {}: {}\n", comment.author_name, comment.content)
}

pub fn wallet(total: f64, entries: &[WalletEntry]) -> String {
    let mut out = format!("{:.2} Wincoins\n", total);
    for entry in entries {
        let _ = writeln!(out, "{} : +{:.4}", entry.timestamp, entry.amount);
    }
    out
}

pub fn converted(amount: f64) -> String {
    format!("{:.2} Bitcoins\n", amount)
}
