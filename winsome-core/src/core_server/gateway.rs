/*
  Gateway - login, registration and push subscription

  Newline-delimited JSON over TCP. One request per line, tagged by `method`;
  one reply per line, tagged by `type`:

    {"method":"register","username":"alice","password":"pw","tags":["tech"]}
    {"type":"grant","token":"…","multicast_address":"239.255.32.32","multicast_port":44444}

    {"method":"subscribe","token":"…"}
    {"type":"ack","ok":true}
    {"type":"followers","followers":["bob"]}      <- initial list, then on every change

  After a successful subscribe the connection doubles as the push channel.
  Closing it unregisters the subscriber.
*/

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::wire::WireError;
use crate::core_engine::{Engine, LoginGrant};
use crate::core_notify::ChannelSubscriber;
use crate::core_store::model::SessionToken;
use crate::shutdown::ShutdownCoordinator;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GatewayRequest {
    Register { username: String, password: String, tags: Vec<String> },
    Login { username: String, password: String },
    Subscribe { token: String },
    Unsubscribe { token: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayReply {
    Grant(LoginGrant),
    Ack {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Followers { followers: Vec<String> },
}

impl GatewayReply {
    fn ok() -> Self {
        GatewayReply::Ack { ok: true, error: None }
    }

    fn rejected(error: impl ToString) -> Self {
        GatewayReply::Ack { ok: false, error: Some(error.to_string()) }
    }
}

pub struct Gateway {
    listener: TcpListener,
    engine: Arc<Engine>,
    subscriber_queue: usize,
    shutdown_timeout: Duration,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Gateway {
    pub fn new(
        listener: TcpListener,
        engine: Arc<Engine>,
        subscriber_queue: usize,
        shutdown_timeout: Duration,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> Self {
        Gateway { listener, engine, subscriber_queue, shutdown_timeout, shutdown }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) {
        info!(addr = ?self.listener.local_addr().ok(), "Gateway started");
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = self.shutdown.wait_for_shutdown() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session = GatewaySession {
                            engine: self.engine.clone(),
                            subscriber_queue: self.subscriber_queue,
                            subscription: None,
                        };
                        let shutdown = self.shutdown.clone();
                        tracker.spawn(async move {
                            if let Err(e) = session.serve(stream, shutdown).await {
                                debug!(%peer, error = %e, "Gateway connection ended with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Gateway accept failed"),
                },
            }
        }

        tracker.close();
        if tokio::time::timeout(self.shutdown_timeout, tracker.wait()).await.is_err() {
            warn!(remaining = tracker.len(), "Gateway connections still open at shutdown");
        }
        info!("Gateway stopped");
    }
}

struct Subscription {
    token: SessionToken,
    pushes: mpsc::Receiver<Vec<String>>,
}

struct GatewaySession {
    engine: Arc<Engine>,
    subscriber_queue: usize,
    subscription: Option<Subscription>,
}

impl GatewaySession {
    async fn serve(mut self, stream: TcpStream, shutdown: Arc<ShutdownCoordinator>) -> Result<(), WireError> {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let result = loop {
            tokio::select! {
                _ = shutdown.wait_for_shutdown() => break Ok(()),
                line = lines.next_line() => {
                    let line = match line {
                        Ok(Some(line)) => line,
                        Ok(None) => break Ok(()),
                        Err(e) => break Err(e.into()),
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    let (reply, keep_open) = match serde_json::from_str::<GatewayRequest>(&line) {
                        Ok(request) => (self.handle(request), true),
                        Err(e) => (GatewayReply::rejected(WireError::Malformed(e.to_string())), false),
                    };
                    if let Err(e) = write_reply(&mut write_half, &reply).await {
                        break Err(e);
                    }
                    if !keep_open {
                        break Ok(());
                    }
                }
                push = next_push(&mut self.subscription) => match push {
                    Some(followers) => {
                        if let Err(e) = write_reply(&mut write_half, &GatewayReply::Followers { followers }).await {
                            break Err(e);
                        }
                    }
                    // unregistered elsewhere, e.g. by a logout
                    None => self.subscription = None,
                },
            }
        };

        if let Some(subscription) = self.subscription.take() {
            self.engine.notifier().unregister(&subscription.token);
        }
        result
    }

    fn handle(&mut self, request: GatewayRequest) -> GatewayReply {
        match request {
            GatewayRequest::Register { username, password, tags } => {
                GatewayReply::Grant(self.engine.register(&username, &password, tags.as_slice()))
            }
            GatewayRequest::Login { username, password } => {
                GatewayReply::Grant(self.engine.login_grant(&username, &password))
            }
            GatewayRequest::Subscribe { token } => self.subscribe(&token),
            GatewayRequest::Unsubscribe { token } => {
                if let Some(token) = SessionToken::parse(&token) {
                    self.engine.notifier().unregister(&token);
                    if self.subscription.as_ref().is_some_and(|s| s.token == token) {
                        self.subscription = None;
                    }
                }
                GatewayReply::ok()
            }
        }
    }

    fn subscribe(&mut self, raw: &str) -> GatewayReply {
        let Some(token) = SessionToken::parse(raw) else {
            return GatewayReply::rejected("malformed session token");
        };
        if let Some(current) = &self.subscription {
            if self.engine.notifier().is_registered(&current.token) {
                return GatewayReply::rejected("this connection is already subscribed");
            }
            self.subscription = None;
        }

        let (subscriber, pushes) = ChannelSubscriber::channel(self.subscriber_queue);
        match self.engine.notifier().register(token, Arc::new(subscriber)) {
            Ok(()) => {
                // the initial follower list is already queued behind this ack
                self.subscription = Some(Subscription { token, pushes });
                GatewayReply::ok()
            }
            Err(e) => GatewayReply::rejected(e),
        }
    }
}

async fn next_push(subscription: &mut Option<Subscription>) -> Option<Vec<String>> {
    match subscription {
        Some(subscription) => subscription.pushes.recv().await,
        None => std::future::pending().await,
    }
}

async fn write_reply(writer: &mut OwnedWriteHalf, reply: &GatewayReply) -> Result<(), WireError> {
    let mut line = serde_json::to_vec(reply).map_err(|e| WireError::Malformed(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    Ok(())
}
