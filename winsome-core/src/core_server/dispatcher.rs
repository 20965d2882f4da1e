/*
  Dispatcher - hands parsed requests to the worker pool

  dispatch(conn, request):
    1. allocate a request id and record conn -> id as in flight
    2. submit the work to the pool
    3. the worker pushes Completion { conn, request_id, payload } onto an
       unbounded completion queue that the event loop selects on

  The loop calls complete() for every completion it receives. A completion
  whose id no longer matches the connection's in-flight entry belongs to a
  connection that went away and is discarded.

  A handler that panics is caught here: the connection still gets an
  error payload and the pool keeps running.
*/

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::connection::ConnId;
use super::worker_pool::{PoolError, WorkerPool};
use crate::core_engine::{Engine, EngineError, Request};
use crate::metrics::{record_counter, Timer, REQUESTS_FAILED, REQUESTS_TOTAL, REQUEST_DURATION};

/// Executes one request and produces its response payload
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    async fn handle(&self, request: Request) -> String;
}

#[async_trait]
impl RequestHandler for Engine {
    async fn handle(&self, request: Request) -> String {
        self.execute(&request).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub conn: ConnId,
    pub request_id: u64,
    pub payload: String,
}

pub struct Dispatcher {
    handler: Arc<dyn RequestHandler>,
    pool: WorkerPool,
    completions: mpsc::UnboundedSender<Completion>,
    next_request_id: u64,
    in_flight: HashMap<ConnId, u64>,
}

impl Dispatcher {
    pub fn new(handler: Arc<dyn RequestHandler>, pool: WorkerPool) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher {
            handler,
            pool,
            completions,
            next_request_id: 1,
            in_flight: HashMap::new(),
        };
        (dispatcher, rx)
    }

    /// Submit `request` on behalf of `conn`
    pub fn dispatch(&mut self, conn: ConnId, request: Request) -> Result<u64, PoolError> {
        if self.in_flight.contains_key(&conn) {
            return Err(PoolError::ConnectionBusy(conn));
        }
        let request_id = self.next_request_id;

        let handler = self.handler.clone();
        let completions = self.completions.clone();
        let op = request.op;
        self.pool.submit(async move {
            let timer = Timer::new(REQUEST_DURATION);
            let payload = match tokio::spawn(async move { handler.handle(request).await }).await {
                Ok(payload) => payload,
                Err(e) => {
                    record_counter(REQUESTS_FAILED, 1);
                    error!(conn, op, error = %e, "Request handler failed");
                    EngineError::Internal("request could not be completed".to_string()).to_string()
                }
            };
            timer.stop();
            // a closed queue means the loop has stopped
            let _ = completions.send(Completion { conn, request_id, payload });
        })?;

        self.next_request_id += 1;
        self.in_flight.insert(conn, request_id);
        record_counter(REQUESTS_TOTAL, 1);
        debug!(conn, request_id, op, "Request dispatched");
        Ok(request_id)
    }

    /// Accept a completion. Returns false for a stale one.
    pub fn complete(&mut self, completion: &Completion) -> bool {
        match self.in_flight.get(&completion.conn) {
            Some(id) if *id == completion.request_id => {
                self.in_flight.remove(&completion.conn);
                true
            }
            _ => {
                debug!(conn = completion.conn, request_id = completion.request_id, "Discarding stale completion");
                false
            }
        }
    }

    /// Drop the in-flight entry of a closed connection
    pub fn forget(&mut self, conn: ConnId) -> bool {
        self.in_flight.remove(&conn).is_some()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.pool.shutdown(grace).await
    }
}
