//! Minimal clients for the command channel and the gateway

use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::gateway::{GatewayReply, GatewayRequest};
use super::wire::{read_response, WireError};
use crate::core_engine::command::OP_CONTROL;
use crate::core_engine::Request;

/// Persistent command-channel connection
pub struct CommandClient {
    stream: TcpStream,
}

impl CommandClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, WireError> {
        Ok(CommandClient { stream: TcpStream::connect(addr).await? })
    }

    /// Send one request and wait for its response
    pub async fn call(&mut self, op: i32, args: &str, token: Option<&str>) -> Result<String, WireError> {
        self.send(&Request::new(op, args, token.map(str::to_string))).await?;
        read_response(&mut self.stream).await
    }

    /// Send a request without reading anything back
    pub async fn send(&mut self, request: &Request) -> Result<(), WireError> {
        let body = serde_json::to_vec(request).map_err(|e| WireError::Malformed(e.to_string()))?;
        self.stream.write_all(&body).await?;
        Ok(())
    }

    pub async fn read_response(&mut self) -> Result<String, WireError> {
        read_response(&mut self.stream).await
    }

    /// `logout` or `shutdown`; the server closes the connection
    pub async fn control(mut self, command: &str, token: Option<&str>) -> Result<(), WireError> {
        self.send(&Request::new(OP_CONTROL, command, token.map(str::to_string))).await
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }
}

/// Line-oriented gateway connection
pub struct GatewayClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl GatewayClient {
    pub async fn connect(addr: SocketAddr) -> Result<Self, WireError> {
        let (read_half, writer) = TcpStream::connect(addr).await?.into_split();
        Ok(GatewayClient { lines: BufReader::new(read_half).lines(), writer })
    }

    pub async fn call(&mut self, request: &GatewayRequest) -> Result<GatewayReply, WireError> {
        let mut line = serde_json::to_vec(request).map_err(|e| WireError::Malformed(e.to_string()))?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.next_reply().await
    }

    /// Next line from the server: a reply or a pushed follower list
    pub async fn next_reply(&mut self) -> Result<GatewayReply, WireError> {
        let line = self.lines.next_line().await?.ok_or(WireError::Closed)?;
        serde_json::from_str(&line).map_err(|e| WireError::Malformed(e.to_string()))
    }
}
