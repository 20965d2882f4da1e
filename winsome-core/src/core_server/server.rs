//! Server assembly
//!
//! Restores the store from the snapshot directory, wires the engine,
//! notification service and rewards engine together, binds both listeners
//! and runs the command loop and the gateway until shutdown. The snapshot
//! is written back once both have stopped.

use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::gateway::Gateway;
use super::multiplexer::Multiplexer;
use super::worker_pool::WorkerPool;
use crate::config::{Config, ConfigError};
use crate::core_engine::{CurrencyConverter, Engine, HttpRateConverter};
use crate::core_notify::{MulticastNotifier, NotificationService};
use crate::core_rewards::RewardsEngine;
use crate::core_store::store::{Checkpoint, LocalStore, SnapshotManager, SnapshotStats, StoreError, TextValidator};
use crate::shutdown::ShutdownCoordinator;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

pub struct Server {
    config: Config,
    store: Arc<LocalStore>,
    engine: Arc<Engine>,
    rewards: Arc<RewardsEngine>,
    snapshots: SnapshotManager,
    command_listener: TcpListener,
    gateway_listener: TcpListener,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Server {
    /// Restore state and bind both listeners, using the configured
    /// conversion service
    pub async fn bind(config: Config, shutdown: Arc<ShutdownCoordinator>) -> Result<Self, ServerError> {
        let converter = Arc::new(HttpRateConverter::new(&config.conversion));
        Self::bind_with_converter(config, shutdown, converter).await
    }

    pub async fn bind_with_converter(
        config: Config,
        shutdown: Arc<ShutdownCoordinator>,
        converter: Arc<dyn CurrencyConverter>,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let snapshots = SnapshotManager::new(&config.store.data_dir)?;
        let (store, checkpoint) = snapshots.load()?;
        let store = Arc::new(store);
        let stats = store.stats();
        info!(
            users = stats.users,
            posts = stats.posts,
            last_sweep = %checkpoint.last_sweep,
            data_dir = %snapshots.data_dir().display(),
            "State restored"
        );

        let multicast = match MulticastNotifier::bind(config.notify.multicast_address).await {
            Ok(notifier) => Some(notifier),
            Err(e) => {
                warn!(error = %e, "Reward announcements disabled");
                None
            }
        };
        let notifier = Arc::new(NotificationService::new(store.clone(), multicast));
        let engine = Arc::new(Engine::new(
            store.clone(),
            notifier,
            converter,
            TextValidator::new(config.limits.clone()),
            config.notify.multicast_address,
        ));
        let rewards = Arc::new(RewardsEngine::new(
            store.clone(),
            config.rewards.author_share,
            checkpoint.last_sweep,
        ));

        let command_listener = bind_listener(config.server.command_address).await?;
        let gateway_listener = bind_listener(config.server.gateway_address).await?;

        Ok(Server {
            config,
            store,
            engine,
            rewards,
            snapshots,
            command_listener,
            gateway_listener,
            shutdown,
        })
    }

    pub fn command_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.command_listener.local_addr()?)
    }

    pub fn gateway_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.gateway_listener.local_addr()?)
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn rewards(&self) -> &Arc<RewardsEngine> {
        &self.rewards
    }

    /// Serve until shutdown, then persist
    pub async fn run(self) -> Result<SnapshotStats, ServerError> {
        let Server { config, store, engine, rewards, snapshots, command_listener, gateway_listener, shutdown } = self;

        let pool = WorkerPool::new(config.server.max_workers);
        let dispatcher = Dispatcher::new(engine.clone(), pool);
        let multiplexer = Multiplexer::new(
            command_listener,
            config.server.clone(),
            engine.clone(),
            dispatcher,
            rewards.clone(),
            config.rewards.interval,
            shutdown.clone(),
        );
        let gateway = Gateway::new(
            gateway_listener,
            engine,
            config.notify.subscriber_queue,
            config.server.shutdown_timeout,
            shutdown,
        );

        tokio::join!(multiplexer.run(), gateway.run());

        let checkpoint = Checkpoint::new(rewards.last_check()?);
        let stats = snapshots.save(&store, checkpoint)?;
        info!(users = stats.users, posts = stats.posts, "State saved");
        Ok(stats)
    }
}

async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr).await.map_err(|source| ServerError::Bind { addr, source })
}
