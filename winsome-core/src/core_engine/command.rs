/*
    command.rs - Request frames and command parsing

    A client request is one JSON object:

    ```json
    { "op": 10, "args": "\"Title\" \"Some content\"", "token": "<uuid>" }
    ```

    `op` selects the operation, `args` carries its arguments as a single
    string (quoted segments for free text), `token` is the session token
    returned at login (absent for login itself).

    Op codes:
        0   control: "logout" | "shutdown" (handled by the event loop, no reply)
        100 login <user> <password>
        1   list users            2  list followers       3  list following
        4   follow <user>         5  unfollow <user>      6  view blog
        10  post "<title>" "<content>"
        11  delete <id>           12 rewin <id>
        13  comment <id> "<text>" 14 rate <id> <+1|-1>
        20  show feed             21 show post <id>
        30  wallet                31 wallet converted
*/

use serde::{Deserialize, Serialize};

use super::errors::{EngineError, EngineResult};
use crate::core_store::model::{PostId, Vote};

pub const OP_CONTROL: i32 = 0;
pub const OP_LOGIN: i32 = 100;
pub const OP_LIST_USERS: i32 = 1;
pub const OP_LIST_FOLLOWERS: i32 = 2;
pub const OP_LIST_FOLLOWING: i32 = 3;
pub const OP_FOLLOW: i32 = 4;
pub const OP_UNFOLLOW: i32 = 5;
pub const OP_VIEW_BLOG: i32 = 6;
pub const OP_CREATE_POST: i32 = 10;
pub const OP_DELETE_POST: i32 = 11;
pub const OP_REWIN: i32 = 12;
pub const OP_COMMENT: i32 = 13;
pub const OP_RATE: i32 = 14;
pub const OP_SHOW_FEED: i32 = 20;
pub const OP_SHOW_POST: i32 = 21;
pub const OP_WALLET: i32 = 30;
pub const OP_WALLET_CONVERTED: i32 = 31;

pub const UNKNOWN_OPERATION: &str = "No operation found for this request";

/// One decoded request frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub op: i32,
    #[serde(default)]
    pub args: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl Request {
    pub fn new(op: i32, args: impl Into<String>, token: Option<String>) -> Self {
        Request { op, args: args.into(), token }
    }

    pub fn is_control(&self) -> bool {
        self.op == OP_CONTROL
    }
}

/// Requests handled synchronously by the event loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Logout,
    Shutdown,
}

impl ControlCommand {
    pub fn parse(args: &str) -> EngineResult<Self> {
        match args.trim().to_lowercase().as_str() {
            "logout" => Ok(ControlCommand::Logout),
            "shutdown" => Ok(ControlCommand::Shutdown),
            other => Err(EngineError::Validation(format!("Unknown control command '{}'", other))),
        }
    }
}

/// Domain operations executed on the worker pool
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login { username: String, password: String },
    ListUsers,
    ListFollowers,
    ListFollowing,
    Follow(String),
    Unfollow(String),
    ViewBlog,
    CreatePost { title: String, content: String },
    DeletePost(PostId),
    Rewin(PostId),
    Comment { post: PostId, text: String },
    Rate { post: PostId, vote: Vote },
    ShowFeed,
    ShowPost(PostId),
    Wallet,
    WalletConverted,
}

impl Command {
    /// Parse a non-control request
    pub fn parse(op: i32, args: &str) -> EngineResult<Self> {
        let command = match op {
            OP_LOGIN => {
                let mut parts = args.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(username), Some(password), None) => Command::Login {
                        username: username.to_string(),
                        password: password.to_string(),
                    },
                    _ => return Err(usage("login <username> <password>")),
                }
            }
            OP_LIST_USERS => Command::ListUsers,
            OP_LIST_FOLLOWERS => Command::ListFollowers,
            OP_LIST_FOLLOWING => Command::ListFollowing,
            OP_FOLLOW => Command::Follow(single_word(args, "follow <username>")?),
            OP_UNFOLLOW => Command::Unfollow(single_word(args, "unfollow <username>")?),
            OP_VIEW_BLOG => Command::ViewBlog,
            OP_CREATE_POST => {
                let mut segments = quoted_segments(args).into_iter();
                match (segments.next(), segments.next(), segments.next()) {
                    (Some(title), Some(content), None) => Command::CreatePost { title, content },
                    _ => return Err(usage("post \"<title>\" \"<content>\"")),
                }
            }
            OP_DELETE_POST => Command::DeletePost(post_id(args)?),
            OP_REWIN => Command::Rewin(post_id(args)?),
            OP_COMMENT => {
                let (id, rest) = args.split_once('"').ok_or_else(|| usage("comment <id> \"<text>\""))?;
                let mut segments = quoted_segments(&format!("\"{}", rest)).into_iter();
                match (segments.next(), segments.next()) {
                    (Some(text), None) => Command::Comment { post: post_id(id)?, text },
                    _ => return Err(usage("comment <id> \"<text>\"")),
                }
            }
            OP_RATE => {
                let mut parts = args.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(id), Some(vote), None) => {
                        let vote = vote.parse::<Vote>().map_err(|_| {
                            EngineError::Validation("Only valid ratings are +1 and -1".to_string())
                        })?;
                        Command::Rate { post: post_id(id)?, vote }
                    }
                    _ => return Err(usage("rate <id> <+1|-1>")),
                }
            }
            OP_SHOW_FEED => Command::ShowFeed,
            OP_SHOW_POST => Command::ShowPost(post_id(args)?),
            OP_WALLET => Command::Wallet,
            OP_WALLET_CONVERTED => Command::WalletConverted,
            _ => return Err(EngineError::Validation(UNKNOWN_OPERATION.to_string())),
        };
        Ok(command)
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login { .. } => "login",
            Command::ListUsers => "list_users",
            Command::ListFollowers => "list_followers",
            Command::ListFollowing => "list_following",
            Command::Follow(_) => "follow",
            Command::Unfollow(_) => "unfollow",
            Command::ViewBlog => "view_blog",
            Command::CreatePost { .. } => "create_post",
            Command::DeletePost(_) => "delete_post",
            Command::Rewin(_) => "rewin",
            Command::Comment { .. } => "comment",
            Command::Rate { .. } => "rate",
            Command::ShowFeed => "show_feed",
            Command::ShowPost(_) => "show_post",
            Command::Wallet => "wallet",
            Command::WalletConverted => "wallet_converted",
        }
    }
}

fn usage(form: &str) -> EngineError {
    EngineError::Validation(format!("Arguments not valid. Usage: {}", form))
}

fn single_word(args: &str, form: &str) -> EngineResult<String> {
    let mut parts = args.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(word), None) => Ok(word.to_string()),
        _ => Err(usage(form)),
    }
}

fn post_id(raw: &str) -> EngineResult<PostId> {
    raw.parse::<PostId>()
        .map_err(|_| EngineError::Validation(format!("'{}' is not a valid post id", raw.trim())))
}

/// Text enclosed in each pair of double quotes, in order. An unmatched
/// trailing quote is ignored.
fn quoted_segments(args: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut rest = args;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        match after.find('"') {
            Some(end) => {
                segments.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    segments
}
