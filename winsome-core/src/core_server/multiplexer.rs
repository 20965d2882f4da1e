/*
  Multiplexer - the command-channel event loop

  One task owns every connection. Each iteration it waits, with a bound of
  poll_timeout, on whichever comes first:

    shutdown signal   -> leave the loop
    accept            -> new Connection in READING
    LoopEvent         -> bytes / write done / peer closed / sweep done
    Completion        -> response for a DISPATCHED connection
    timer             -> nothing; falls through to the sweep check

  and before waiting it starts the rewards sweep if its deadline passed and
  none is running. Sweeps run on a blocking thread outside the worker pool;
  the multicast announcement follows each successful sweep.

  Control requests (op 0) never reach a worker. They are handled right here:
  close the connection, drop the session's push subscriber, close the
  session and, for `shutdown`, trigger the coordinator. Teardown then stops
  accepting, closes all connections and drains the pool.
*/

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

use super::connection::{ConnId, ConnState, Connection, LoopEvent};
use super::dispatcher::{Completion, Dispatcher};
use super::wire::WireError;
use crate::config::ServerConfig;
use crate::core_engine::{ControlCommand, Engine, Request};
use crate::core_rewards::RewardsEngine;
use crate::core_store::model::SessionToken;
use crate::metrics::{record_counter, record_gauge, CONNECTIONS_ACCEPTED, CONNECTIONS_ACTIVE, PROTOCOL_ERRORS};
use crate::shutdown::{ShutdownCoordinator, ShutdownReason};

const EVENT_QUEUE: usize = 1024;

pub struct Multiplexer {
    listener: TcpListener,
    config: ServerConfig,
    engine: Arc<Engine>,
    dispatcher: Dispatcher,
    completions: mpsc::UnboundedReceiver<Completion>,
    events_tx: mpsc::Sender<LoopEvent>,
    events_rx: mpsc::Receiver<LoopEvent>,
    connections: HashMap<ConnId, Connection>,
    next_conn_id: ConnId,
    rewards: Arc<RewardsEngine>,
    sweep_interval: Duration,
    next_sweep: Instant,
    sweep_running: bool,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Multiplexer {
    pub fn new(
        listener: TcpListener,
        config: ServerConfig,
        engine: Arc<Engine>,
        dispatcher: (Dispatcher, mpsc::UnboundedReceiver<Completion>),
        rewards: Arc<RewardsEngine>,
        sweep_interval: Duration,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let (dispatcher, completions) = dispatcher;
        Multiplexer {
            listener,
            config,
            engine,
            dispatcher,
            completions,
            events_tx,
            events_rx,
            connections: HashMap::new(),
            next_conn_id: 1,
            rewards,
            sweep_interval,
            next_sweep: Instant::now() + sweep_interval,
            sweep_running: false,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run until shutdown, then tear down
    pub async fn run(mut self) {
        info!(addr = ?self.listener.local_addr().ok(), "Command loop started");
        let mut shutdown_rx = self.shutdown.subscribe();

        while !self.shutdown.is_shutting_down() {
            self.maybe_start_sweep();

            let mut wake_at = Instant::now() + self.config.poll_timeout;
            if !self.sweep_running {
                wake_at = wake_at.min(self.next_sweep);
            }
            let accepting = self.connections.len() < self.config.max_connections;

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                accepted = self.listener.accept(), if accepting => match accepted {
                    Ok((stream, peer)) => self.on_accept(stream, peer),
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                Some(event) = self.events_rx.recv() => self.on_event(event),
                Some(completion) = self.completions.recv() => self.on_completion(completion),
                _ = sleep_until(wake_at) => {}
            }
        }

        self.teardown().await;
    }

    fn on_accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = self.next_conn_id;
        self.next_conn_id += 1;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(conn = id, error = %e, "Could not set TCP_NODELAY");
        }
        let conn = Connection::spawn(id, stream, peer, self.config.max_frame_size, self.events_tx.clone());
        self.connections.insert(id, conn);

        record_counter(CONNECTIONS_ACCEPTED, 1);
        record_gauge(CONNECTIONS_ACTIVE, self.connections.len() as f64);
        debug!(conn = id, %peer, "Connection accepted");
    }

    fn on_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Data(id, bytes) => {
                let Some(conn) = self.connections.get_mut(&id) else {
                    return;
                };
                match conn.feed(&bytes) {
                    Ok(()) => self.pump(id),
                    Err(e) => self.protocol_error(id, e),
                }
            }
            LoopEvent::Written(id) => {
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.written();
                    self.pump(id);
                }
            }
            LoopEvent::Closed(id, reason) => {
                if let Some(reason) = reason {
                    debug!(conn = id, %reason, "Connection I/O failed");
                }
                self.close_connection(id);
            }
            LoopEvent::SweepFinished(report) => {
                self.sweep_running = false;
                if report.is_none() {
                    warn!("Rewards sweep did not complete");
                }
            }
        }
    }

    /// Dispatch the next buffered request of a READING connection
    fn pump(&mut self, id: ConnId) {
        let Some(conn) = self.connections.get_mut(&id) else {
            return;
        };
        let request = match conn.next_request() {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(e) => return self.protocol_error(id, e),
        };

        if request.is_control() {
            return self.handle_control(id, &request);
        }

        match self.dispatcher.dispatch(id, request) {
            Ok(_) => {
                if let Some(conn) = self.connections.get_mut(&id) {
                    conn.mark_dispatched();
                }
            }
            Err(e) => {
                warn!(conn = id, error = %e, "Could not dispatch request");
                self.close_connection(id);
            }
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        if !self.dispatcher.complete(&completion) {
            return;
        }
        let Some(conn) = self.connections.get_mut(&completion.conn) else {
            return;
        };
        if conn.state() != ConnState::Dispatched {
            return;
        }
        if let Err(e) = conn.respond(&completion.payload) {
            debug!(conn = completion.conn, error = %e, "Response not delivered");
            self.close_connection(completion.conn);
        }
    }

    fn handle_control(&mut self, id: ConnId, request: &Request) {
        self.close_connection(id);

        let command = match ControlCommand::parse(&request.args) {
            Ok(command) => command,
            Err(e) => {
                debug!(conn = id, error = %e, "Unrecognized control request");
                return;
            }
        };

        if let Some(token) = request.token.as_deref().and_then(SessionToken::parse) {
            self.engine.notifier().unregister(&token);
            self.engine.logout(&token);
        }

        match command {
            ControlCommand::Logout => info!(conn = id, "Client logged out"),
            ControlCommand::Shutdown => {
                info!(conn = id, "Shutdown requested by client");
                self.shutdown.shutdown(ShutdownReason::Command);
            }
        }
    }

    fn protocol_error(&mut self, id: ConnId, error: WireError) {
        record_counter(PROTOCOL_ERRORS, 1);
        warn!(conn = id, %error, "Protocol error, closing connection");
        self.close_connection(id);
    }

    fn close_connection(&mut self, id: ConnId) {
        if let Some(mut conn) = self.connections.remove(&id) {
            conn.close();
            self.dispatcher.forget(id);
            record_gauge(CONNECTIONS_ACTIVE, self.connections.len() as f64);
            debug!(conn = id, peer = %conn.peer(), "Connection closed");
        }
    }

    fn maybe_start_sweep(&mut self) {
        if self.sweep_running || Instant::now() < self.next_sweep {
            return;
        }
        self.sweep_running = true;
        self.next_sweep = Instant::now() + self.sweep_interval;

        let rewards = self.rewards.clone();
        let engine = self.engine.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let report = match tokio::task::spawn_blocking(move || rewards.sweep()).await {
                Ok(Ok(report)) => {
                    engine.notifier().broadcast_rewards().await;
                    Some(report)
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Rewards sweep failed");
                    None
                }
                Err(e) => {
                    error!(error = %e, "Rewards sweep panicked");
                    None
                }
            };
            let _ = events.send(LoopEvent::SweepFinished(report)).await;
        });
    }

    async fn teardown(mut self) {
        info!(connections = self.connections.len(), "Command loop stopping");
        let ids: Vec<ConnId> = self.connections.keys().copied().collect();
        for id in ids {
            self.close_connection(id);
        }

        let grace = self.config.shutdown_timeout;
        self.dispatcher.shutdown(grace).await;

        if self.sweep_running {
            let deadline = Instant::now() + grace;
            loop {
                tokio::select! {
                    event = self.events_rx.recv() => match event {
                        Some(LoopEvent::SweepFinished(_)) | None => break,
                        Some(_) => {}
                    },
                    _ = sleep_until(deadline) => {
                        warn!("Rewards sweep still running at shutdown");
                        break;
                    }
                }
            }
        }
        info!("Command loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::core_engine::command::{OP_WALLET, OP_WALLET_CONVERTED};
    use crate::core_engine::{ConversionError, CurrencyConverter, FixedRate};
    use crate::core_notify::{MulticastNotifier, NotificationService, REWARD_MESSAGE};
    use crate::core_server::client::CommandClient;
    use crate::core_server::worker_pool::WorkerPool;
    use crate::core_store::model::{Timestamp, Vote};
    use crate::core_store::store::{LocalStore, TextValidator};
    use async_trait::async_trait;
    use tokio::net::UdpSocket;
    use tokio::task::JoinHandle;
    use tokio::time::timeout;

    const STEP: Duration = Duration::from_secs(5);

    /// Answers after a fixed delay
    struct SlowRate(Duration);

    #[async_trait]
    impl CurrencyConverter for SlowRate {
        async fn rate(&self) -> Result<f64, ConversionError> {
            tokio::time::sleep(self.0).await;
            Ok(2.0)
        }
    }

    struct Harness {
        addr: SocketAddr,
        engine: Arc<Engine>,
        shutdown: Arc<ShutdownCoordinator>,
        handle: JoinHandle<()>,
    }

    impl Harness {
        async fn start(
            workers: usize,
            sweep_interval: Duration,
            converter: Arc<dyn CurrencyConverter>,
            multicast: Option<MulticastNotifier>,
        ) -> Self {
            let store = Arc::new(LocalStore::new());
            let group = multicast.as_ref().map(|m| m.target()).unwrap_or_else(|| "239.255.32.32:44444".parse().unwrap());
            let notifier = Arc::new(NotificationService::new(store.clone(), multicast));
            let engine = Arc::new(Engine::new(
                store.clone(),
                notifier,
                converter,
                TextValidator::new(LimitsConfig::default()),
                group,
            ));
            let rewards = Arc::new(RewardsEngine::new(store, 0.75, Timestamp::EPOCH));

            let config = ServerConfig {
                poll_timeout: Duration::from_millis(20),
                max_workers: workers,
                shutdown_timeout: Duration::from_secs(2),
                ..ServerConfig::default()
            };
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let dispatcher = Dispatcher::new(engine.clone(), WorkerPool::new(workers));
            let shutdown = Arc::new(ShutdownCoordinator::new());
            let multiplexer =
                Multiplexer::new(listener, config, engine.clone(), dispatcher, rewards, sweep_interval, shutdown.clone());
            let addr = multiplexer.local_addr().unwrap();
            let handle = tokio::spawn(multiplexer.run());
            Harness { addr, engine, shutdown, handle }
        }

        fn token(&self, name: &str) -> String {
            self.engine.register(name, "pw", &["tech"]).token.unwrap()
        }

        async fn client(&self) -> CommandClient {
            CommandClient::connect(self.addr).await.unwrap()
        }

        async fn stop(self) {
            self.shutdown.shutdown(ShutdownReason::Requested);
            timeout(STEP, self.handle).await.unwrap().unwrap();
        }
    }

    #[tokio::test]
    async fn test_loop_runs_sweep_and_announces_it() {
        let receiver = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let multicast = MulticastNotifier::bind(receiver.local_addr().unwrap()).await.unwrap();
        let harness = Harness::start(2, Duration::from_millis(200), Arc::new(FixedRate(1.0)), Some(multicast)).await;

        harness.token("alice");
        harness.token("bob");
        let store = harness.engine.store().clone();
        let alice = store.user_by_name("alice").unwrap();
        let bob = store.user_by_name("bob").unwrap();
        harness.engine.follow(&bob, "alice").unwrap();
        let post = harness.engine.create_post(&alice, "T", "C").unwrap();
        harness.engine.rate(&bob, post, Vote::Up).unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = timeout(STEP, receiver.recv_from(&mut buf)).await.expect("datagram after sweep").unwrap();
        assert_eq!(&buf[..len], REWARD_MESSAGE.as_bytes());

        let ln2 = std::f64::consts::LN_2;
        assert!((alice.wallet_total().unwrap() - 0.75 * ln2).abs() < 1e-9);
        assert!((bob.wallet_total().unwrap() - 0.25 * ln2).abs() < 1e-9);

        harness.stop().await;
    }

    #[tokio::test]
    async fn test_saturated_pool_keeps_loop_serving() {
        let harness = Harness::start(1, Duration::from_secs(3600), Arc::new(SlowRate(Duration::from_millis(600))), None).await;
        let slow_token = harness.token("alice");
        let queued_token = harness.token("bob");
        let leaving_token = harness.token("carol");

        let mut slow = harness.client().await;
        let slow_task = tokio::spawn(async move {
            let reply = slow.call(OP_WALLET_CONVERTED, "", Some(&slow_token)).await.unwrap();
            (reply, Instant::now())
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // accepted and parked behind the busy worker
        let mut queued = harness.client().await;
        let queued_task = tokio::spawn(async move {
            let reply = queued.call(OP_WALLET, "", Some(&queued_token)).await.unwrap();
            (reply, Instant::now())
        });

        // control requests are still handled while the pool is full
        let leaving = harness.client().await;
        leaving.control("logout", Some(&leaving_token)).await.unwrap();
        let leaving_token = SessionToken::parse(&leaving_token).unwrap();
        let store = harness.engine.store().clone();
        let mut closed = false;
        for _ in 0..20 {
            if store.session_user(&leaving_token).is_none() {
                closed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(closed, "logout handled while the worker was busy");
        assert!(!slow_task.is_finished());

        let (slow_reply, slow_done) = timeout(STEP, slow_task).await.unwrap().unwrap();
        let (queued_reply, queued_done) = timeout(STEP, queued_task).await.unwrap().unwrap();
        assert_eq!(slow_reply, "0.00 Bitcoins\n");
        assert!(queued_reply.starts_with("0.00 Wincoins"));
        assert!(queued_done >= slow_done);

        harness.stop().await;
    }
}
