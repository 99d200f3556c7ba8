use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    schema::JSONRPCMessage,
};

pub(crate) const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Newline-delimited JSON-RPC codec.
///
/// Stdio servers frequently print banners or stray debug output on stdout.
/// Lines that do not parse as a JSON-RPC message are logged and skipped
/// rather than failing the stream, since a decode error would terminate the
/// whole session.
pub(crate) struct JsonRpcCodec {
    /// Index into the buffer up to which we have already searched for `\n`.
    next_index: usize,
    max_frame_bytes: usize,
}

impl JsonRpcCodec {
    pub fn new() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }

    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            next_index: 0,
            max_frame_bytes,
        }
    }

    fn parse_line(line: &[u8]) -> Option<JSONRPCMessage> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        match serde_json::from_slice::<JSONRPCMessage>(line) {
            Ok(message) => {
                debug!("Decoded JSON-RPC message: {}", String::from_utf8_lossy(line));
                Some(message)
            }
            Err(e) => {
                warn!(
                    "Skipping line that is not a JSON-RPC message ({}): {}",
                    e,
                    String::from_utf8_lossy(line)
                );
                None
            }
        }
    }
}

impl Default for JsonRpcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonRpcCodec {
    type Error = Error;
    type Item = JSONRPCMessage;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                if src.len() > self.max_frame_bytes {
                    return Err(Error::FrameTooLarge {
                        size: src.len(),
                        limit: self.max_frame_bytes,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let newline = self.next_index + offset;
            self.next_index = 0;
            if newline > self.max_frame_bytes {
                return Err(Error::FrameTooLarge {
                    size: newline,
                    limit: self.max_frame_bytes,
                });
            }

            let line = src.split_to(newline + 1);
            if let Some(message) = Self::parse_line(&line[..newline]) {
                return Ok(Some(message));
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        // The peer may exit without terminating its last line.
        self.next_index = 0;
        if src.is_empty() {
            return Ok(None);
        }
        let rest = src.split();
        Ok(Self::parse_line(&rest))
    }
}

impl Encoder<JSONRPCMessage> for JsonRpcCodec {
    type Error = Error;

    fn encode(&mut self, item: JSONRPCMessage, dst: &mut BytesMut) -> Result<()> {
        let json = serde_json::to_vec(&item)?;
        dst.reserve(json.len() + 1);
        dst.put_slice(&json);
        dst.put_u8(b'\n');
        debug!("Encoded JSON-RPC message: {}", String::from_utf8_lossy(&json));
        Ok(())
    }
}
