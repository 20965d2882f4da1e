/*
  Connection - one command-channel client as seen by the event loop

  Lifecycle:

    ACCEPTED -> READING -> DISPATCHED -> WRITING -> READING ... -> CLOSED
                   │          (worker)     (writer task)
                   └── control op / protocol error / EOF ──────────> CLOSED

  Socket I/O never runs on the loop. Each connection owns two small tasks:
  - reader: forwards raw bytes as LoopEvent::Data, EOF/errors as Closed
  - writer: writes framed responses handed to it, then reports Written

  The loop owns the decoder and the state, so framing and scheduling
  decisions are made in one place.
*/

use bytes::{Bytes, BytesMut};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use super::wire::{encode_response, RequestDecoder, WireError};
use crate::core_engine::Request;
use crate::core_rewards::SweepReport;

pub type ConnId = u64;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Reading,
    Dispatched,
    Writing,
    Closed,
}

/// Everything the event loop reacts to besides accepts and completions
#[derive(Debug)]
pub enum LoopEvent {
    Data(ConnId, Bytes),
    Written(ConnId),
    Closed(ConnId, Option<String>),
    SweepFinished(Option<SweepReport>),
}

pub struct Connection {
    id: ConnId,
    peer: SocketAddr,
    state: ConnState,
    decoder: RequestDecoder,
    responses: mpsc::UnboundedSender<Bytes>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Split the stream and start its reader and writer tasks
    pub fn spawn(
        id: ConnId,
        stream: TcpStream,
        peer: SocketAddr,
        max_frame_size: usize,
        events: mpsc::Sender<LoopEvent>,
    ) -> Self {
        let (mut read_half, mut write_half) = stream.into_split();
        let (responses, mut outgoing) = mpsc::unbounded_channel::<Bytes>();

        let reader_events = events.clone();
        let reader = tokio::spawn(async move {
            loop {
                let mut buf = BytesMut::with_capacity(READ_CHUNK);
                match read_half.read_buf(&mut buf).await {
                    Ok(0) => {
                        let _ = reader_events.send(LoopEvent::Closed(id, None)).await;
                        break;
                    }
                    Ok(n) => {
                        trace!(conn = id, bytes = n, "Read");
                        if reader_events.send(LoopEvent::Data(id, buf.freeze())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = reader_events.send(LoopEvent::Closed(id, Some(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(frame) = outgoing.recv().await {
                if let Err(e) = write_half.write_all(&frame).await {
                    let _ = events.send(LoopEvent::Closed(id, Some(e.to_string()))).await;
                    break;
                }
                if events.send(LoopEvent::Written(id)).await.is_err() {
                    break;
                }
            }
        });

        Connection {
            id,
            peer,
            state: ConnState::Reading,
            decoder: RequestDecoder::new(max_frame_size),
            responses,
            reader,
            writer,
        }
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    /// Buffer bytes from the reader task
    pub fn feed(&mut self, data: &[u8]) -> Result<(), WireError> {
        self.decoder.extend(data)
    }

    /// Next buffered request, only while READING
    pub fn next_request(&mut self) -> Result<Option<Request>, WireError> {
        if self.state != ConnState::Reading {
            return Ok(None);
        }
        self.decoder.decode()
    }

    pub fn mark_dispatched(&mut self) {
        self.state = ConnState::Dispatched;
    }

    /// Hand a response to the writer task and move to WRITING
    pub fn respond(&mut self, payload: &str) -> Result<(), WireError> {
        let frame = encode_response(payload)?;
        self.responses.send(frame).map_err(|_| WireError::Closed)?;
        self.state = ConnState::Writing;
        Ok(())
    }

    /// The writer finished; back to READING
    pub fn written(&mut self) {
        if self.state == ConnState::Writing {
            self.state = ConnState::Reading;
        }
    }

    pub fn close(&mut self) {
        if self.state != ConnState::Closed {
            self.state = ConnState::Closed;
            self.reader.abort();
            self.writer.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
