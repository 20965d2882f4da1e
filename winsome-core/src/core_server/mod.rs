/*
    core_server - Network front end

    Subsystems:
    - wire: request decoding and response framing for the command channel
    - connection: per-connection state machine and its I/O tasks
    - worker_pool / dispatcher: bounded execution and the completion queue
    - multiplexer: the command-channel event loop and rewards scheduling
    - gateway: login/registration and push subscriptions
    - server: assembly, restore and persist
    - client: thin clients for both channels
*/

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod gateway;
pub mod multiplexer;
pub mod server;
pub mod wire;
pub mod worker_pool;

pub use client::{CommandClient, GatewayClient};
pub use connection::{ConnId, ConnState, Connection, LoopEvent};
pub use dispatcher::{Completion, Dispatcher, RequestHandler};
pub use gateway::{Gateway, GatewayReply, GatewayRequest};
pub use multiplexer::Multiplexer;
pub use server::{Server, ServerError};
pub use wire::{encode_response, read_response, RequestDecoder, WireError};
pub use worker_pool::{PoolError, WorkerPool};
