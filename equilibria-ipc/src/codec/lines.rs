use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::IpcError;

/// Longest line accepted from a client, terminator excluded.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// Newline-delimited framing for the IPC stream.
///
/// Decoding yields one UTF-8 line per item with the `\n` (and a stray
/// trailing `\r`) removed; empty lines are skipped. Encoding writes
/// pre-encoded lines verbatim, so a telemetry line encoded once can be
/// shared by every connection.
#[derive(Debug, Clone)]
pub struct LineCodec {
    max_length: usize,
    /// Bytes of `src` already scanned for a newline.
    next_index: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = IpcError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                // No terminator yet: keep buffering, but not forever. A
                // trailing `\r` may still be stripped once `\n` arrives.
                let pending_cr = usize::from(src.last() == Some(&b'\r'));
                if src.len() > self.max_length + pending_cr {
                    return Err(IpcError::LineTooLong {
                        size: src.len(),
                        max: self.max_length,
                    });
                }
                self.next_index = src.len();
                return Ok(None);
            };

            let end = self.next_index + offset;
            self.next_index = 0;

            let mut line = src.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            if line.len() > self.max_length {
                return Err(IpcError::LineTooLong {
                    size: line.len(),
                    max: self.max_length,
                });
            }
            if line.is_empty() {
                continue;
            }

            return String::from_utf8(line.to_vec())
                .map(Some)
                .map_err(|e| IpcError::MalformedJson(format!("invalid utf-8: {e}")));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(line) = self.decode(src)? {
            return Ok(Some(line));
        }
        if !src.is_empty() {
            // A line without its terminator never reaches the dispatcher.
            debug!(bytes = src.len(), "discarding partial line at end of stream");
            src.clear();
            self.next_index = 0;
        }
        Ok(None)
    }
}

impl Encoder<Bytes> for LineCodec {
    type Error = IpcError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.reserve(item.len());
        dst.extend_from_slice(&item);
        Ok(())
    }
}
