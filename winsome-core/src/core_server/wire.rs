/*
  Wire - command channel framing

  Requests are bare JSON objects written back to back; there is no length
  prefix on the way in. The decoder accumulates bytes and pulls one object
  at a time with serde_json's streaming deserializer:

    buffer: {"op":1,"token":"…"}{"op":20,"tok
            └──── complete ─────┘└─ waits ─┘

  - incomplete object   -> Ok(None), keep the bytes
  - syntax error / a value that is not a request -> WireError::Malformed
  - more than max_frame_size bytes buffered       -> WireError::FrameTooLarge

  Responses go the other way with framing: 4-byte big-endian length, then
  the UTF-8 payload.
*/

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::core_engine::Request;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("more than {limit} bytes buffered without a complete request")]
    FrameTooLarge { limit: usize },

    #[error("response of {0} bytes does not fit a frame")]
    ResponseTooLarge(usize),

    #[error("connection closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Incremental decoder for one connection's request stream
#[derive(Debug)]
pub struct RequestDecoder {
    buf: BytesMut,
    max_frame_size: usize,
}

impl RequestDecoder {
    pub fn new(max_frame_size: usize) -> Self {
        RequestDecoder { buf: BytesMut::with_capacity(512), max_frame_size }
    }

    /// Append received bytes
    pub fn extend(&mut self, data: &[u8]) -> Result<(), WireError> {
        self.buf.extend_from_slice(data);
        if self.buf.len() > self.max_frame_size {
            return Err(WireError::FrameTooLarge { limit: self.max_frame_size });
        }
        Ok(())
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete request, if the buffer holds one
    pub fn decode(&mut self) -> Result<Option<Request>, WireError> {
        let (request, consumed) = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<Request>();
            match stream.next() {
                // nothing but whitespace
                None => (None, self.buf.len()),
                Some(Ok(request)) => (Some(request), stream.byte_offset()),
                Some(Err(e)) if e.is_eof() => return Ok(None),
                Some(Err(e)) => return Err(WireError::Malformed(e.to_string())),
            }
        };
        self.buf.advance(consumed);
        Ok(request)
    }
}

/// Frame a response payload
pub fn encode_response(payload: &str) -> Result<Bytes, WireError> {
    let len = u32::try_from(payload.len()).map_err(|_| WireError::ResponseTooLarge(payload.len()))?;
    let mut out = BytesMut::with_capacity(4 + payload.len());
    out.put_u32(len);
    out.put_slice(payload.as_bytes());
    Ok(out.freeze())
}

/// Read one framed response
pub async fn read_response<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, WireError> {
    let len = match reader.read_u32().await {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Err(WireError::Closed),
        Err(e) => return Err(e.into()),
    };
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    String::from_utf8(payload).map_err(|e| WireError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_waits_for_complete_object() {
        let mut decoder = RequestDecoder::new(1024);
        decoder.extend(br#"{"op": 20, "args": "", "tok"#).unwrap();
        assert!(decoder.decode().unwrap().is_none());

        decoder.extend(br#"en": "abc"}"#).unwrap();
        let request = decoder.decode().unwrap().unwrap();
        assert_eq!(request, Request::new(20, "", Some("abc".to_string())));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_pipelined_requests_stay_queued() {
        let mut decoder = RequestDecoder::new(1024);
        decoder.extend(br#"{"op":1} {"op":2}"#).unwrap();

        assert_eq!(decoder.decode().unwrap().unwrap().op, 1);
        assert!(decoder.buffered() > 0);
        assert_eq!(decoder.decode().unwrap().unwrap().op, 2);
        assert!(decoder.decode().unwrap().is_none());
    }

    #[test]
    fn test_malformed_input() {
        let mut decoder = RequestDecoder::new(1024);
        decoder.extend(b"{\"op\": oops}").unwrap();
        assert!(matches!(decoder.decode(), Err(WireError::Malformed(_))));

        let mut decoder = RequestDecoder::new(1024);
        decoder.extend(b"[1, 2, 3]").unwrap();
        assert!(matches!(decoder.decode(), Err(WireError::Malformed(_))));
    }

    #[test]
    fn test_frame_limit() {
        let mut decoder = RequestDecoder::new(16);
        decoder.extend(br#"{"op": 1, "#).unwrap();
        let err = decoder.extend(br#""args": "far too long""#).unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn test_response_framing() {
        let frame = encode_response("héllo").unwrap();
        assert_eq!(&frame[..4], &6u32.to_be_bytes());

        let mut reader = &frame[..];
        assert_eq!(read_response(&mut reader).await.unwrap(), "héllo");
        assert!(matches!(read_response(&mut reader).await, Err(WireError::Closed)));
    }
}
