/*
    snapshot.rs - On-disk state for restarts

    Layout under the data directory:
    - users/<user-id>.json   one record per user, authored posts embedded
    - checkpoint.json        timestamp of the last rewards sweep and the
                             last post id ever assigned

    Every file is written to a temp path, synced, then renamed into place,
    so a crash mid-save leaves the previous copy intact.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs::{self, create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core_store::model::{
    Post, PostId, PostState, Timestamp, User, UserId, UserState, WalletEntry,
};
use crate::core_store::store::errors::{StoreError, StoreResult};
use crate::core_store::store::local_store::LocalStore;

const USERS_DIR: &str = "users";
const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Persisted form of an authored post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: PostId,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    pub state: PostState,
}

/// Persisted form of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    pub password: String,
    pub tags: BTreeSet<String>,
    pub following: BTreeSet<UserId>,
    /// Blog entries authored by someone else
    pub reshared: BTreeSet<PostId>,
    pub wallet: Vec<WalletEntry>,
    pub posts: Vec<PostRecord>,
}

/// Rewards baseline and id counter carried across restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_sweep: Timestamp,
    /// Covers ids of posts deleted before the save
    #[serde(default)]
    pub last_post_id: PostId,
}

impl Checkpoint {
    pub fn new(last_sweep: Timestamp) -> Self {
        Checkpoint { last_sweep, last_post_id: PostId::default() }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Checkpoint::new(Timestamp::EPOCH)
    }
}

/// Summary of a save or load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotStats {
    pub users: usize,
    pub posts: usize,
}

/// Saves and restores the store
#[derive(Debug, Clone)]
pub struct SnapshotManager {
    data_dir: PathBuf,
}

impl SnapshotManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let data_dir = data_dir.into();
        create_dir_all(data_dir.join(USERS_DIR))?;
        Ok(SnapshotManager { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write every user record and the checkpoint. The checkpoint's post id
    /// is raised to the store's counter.
    pub fn save(&self, store: &LocalStore, checkpoint: Checkpoint) -> StoreResult<SnapshotStats> {
        let checkpoint = Checkpoint {
            last_post_id: checkpoint.last_post_id.max(store.last_post_id()),
            ..checkpoint
        };
        let mut stats = SnapshotStats::default();
        let posts = store.posts();

        for user in store.users() {
            let record = user_record(&user, &posts)?;
            stats.users += 1;
            stats.posts += record.posts.len();
            let path = self.data_dir.join(USERS_DIR).join(format!("{}.json", record.id));
            write_atomic(&path, &serde_json::to_vec_pretty(&record)?)?;
        }

        write_atomic(
            &self.data_dir.join(CHECKPOINT_FILE),
            &serde_json::to_vec_pretty(&checkpoint)?,
        )?;

        tracing::info!(users = stats.users, posts = stats.posts, dir = %self.data_dir.display(), "State saved");
        Ok(stats)
    }

    /// Rebuild a store from disk. A missing directory yields an empty store.
    pub fn load(&self) -> StoreResult<(LocalStore, Checkpoint)> {
        let store = LocalStore::new();
        let mut stats = SnapshotStats::default();
        let mut records = Vec::new();

        for entry in fs::read_dir(self.data_dir.join(USERS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read(&path)?;
            let record: UserRecord = serde_json::from_slice(&data).map_err(|e| {
                StoreError::CorruptedData(format!("{}: {}", path.display(), e))
            })?;
            records.push(record);
        }

        for record in records {
            let mut blog = record.reshared;
            blog.extend(record.posts.iter().map(|p| p.id));
            let state = UserState { following: record.following, blog, wallet: record.wallet };
            let user = store.restore_user(User::with_state(
                record.id,
                record.username,
                record.password,
                record.tags,
                state,
            ))?;
            stats.users += 1;

            for post in record.posts {
                if post.id.0 == 0 {
                    return Err(StoreError::CorruptedData(format!(
                        "post id 0 in record of '{}'",
                        user.username()
                    )));
                }
                store.restore_post(Post::with_state(
                    post.id,
                    user.id(),
                    user.username().to_string(),
                    post.title,
                    post.content,
                    post.created_at,
                    post.state,
                ))?;
                stats.posts += 1;
            }
        }

        // Reshares of posts deleted before the last save
        for user in store.users() {
            store.live_blog(&user)?;
        }

        let checkpoint_path = self.data_dir.join(CHECKPOINT_FILE);
        let checkpoint = if checkpoint_path.exists() {
            serde_json::from_slice(&fs::read(&checkpoint_path)?).map_err(|e| {
                StoreError::CorruptedData(format!("{}: {}", checkpoint_path.display(), e))
            })?
        } else {
            Checkpoint::default()
        };
        store.reserve_post_ids(checkpoint.last_post_id);

        tracing::info!(
            users = stats.users,
            posts = stats.posts,
            last_sweep = %checkpoint.last_sweep,
            last_post_id = %store.last_post_id(),
            "State loaded"
        );
        Ok((store, checkpoint))
    }
}

fn user_record(user: &User, posts: &[std::sync::Arc<Post>]) -> StoreResult<UserRecord> {
    let state = user.snapshot()?;
    let mut authored = Vec::new();
    for post in posts.iter().filter(|p| p.author() == user.id()) {
        authored.push(PostRecord {
            id: post.id(),
            title: post.title().to_string(),
            content: post.content().to_string(),
            created_at: post.created_at(),
            state: post.snapshot()?,
        });
    }
    let own: BTreeSet<PostId> = authored.iter().map(|p| p.id).collect();
    let reshared = state.blog.iter().copied().filter(|id| !own.contains(id)).collect();

    Ok(UserRecord {
        id: user.id(),
        username: user.username().to_string(),
        password: user.password().to_string(),
        tags: user.tags().clone(),
        following: state.following,
        reshared,
        wallet: state.wallet,
        posts: authored,
    })
}

fn write_atomic(path: &Path, data: &[u8]) -> StoreResult<()> {
    let temp_path = path.with_extension("tmp");
    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);
    fs::rename(temp_path, path)?;
    Ok(())
}
