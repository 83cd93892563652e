//! Tokio codec for newline-delimited JSON messages

use std::marker::PhantomData;

use bytes::{BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

/// Maximum accepted line length (1 MiB)
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Codec that decodes one `In` per line and encodes any serializable value
/// as a single line.
///
/// Blank lines are skipped, and a trailing `\r` is tolerated so servers
/// written on any platform can be used.
#[derive(Debug)]
pub struct JsonLineCodec<In> {
    /// Bytes already scanned for a newline without finding one
    scanned: usize,
    max_length: usize,
    _marker: PhantomData<fn() -> In>,
}

impl<In> JsonLineCodec<In> {
    /// Create a new codec with the default maximum line length
    pub fn new() -> Self {
        Self::with_max_length(MAX_LINE_LENGTH)
    }

    /// Create a new codec with a custom maximum line length
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            scanned: 0,
            max_length,
            _marker: PhantomData,
        }
    }
}

impl<In> Default for JsonLineCodec<In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: DeserializeOwned> Decoder for JsonLineCodec<In> {
    type Item = In;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.scanned..].iter().position(|b| *b == b'\n');

            let Some(offset) = newline else {
                if src.len() > self.max_length {
                    return Err(ProtocolError::LineTooLong {
                        size: src.len(),
                        max: self.max_length,
                    });
                }
                // Need more data
                self.scanned = src.len();
                return Ok(None);
            };

            let line_end = self.scanned + offset;
            self.scanned = 0;

            if line_end > self.max_length {
                return Err(ProtocolError::LineTooLong {
                    size: line_end,
                    max: self.max_length,
                });
            }

            let line = src.split_to(line_end + 1);
            let mut payload = &line[..line_end];
            if payload.last() == Some(&b'\r') {
                payload = &payload[..payload.len() - 1];
            }

            if payload.iter().all(u8::is_ascii_whitespace) {
                tracing::trace!("Skipping blank line");
                continue;
            }

            let message = serde_json::from_slice(payload)?;
            return Ok(Some(message));
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(buf)? {
            return Ok(Some(message));
        }

        // Accept a final line without trailing newline
        if buf.iter().all(u8::is_ascii_whitespace) {
            buf.clear();
            self.scanned = 0;
            return Ok(None);
        }

        buf.put_u8(b'\n');
        self.decode(buf)
    }
}

impl<In, Out: Serialize> Encoder<Out> for JsonLineCodec<In> {
    type Error = ProtocolError;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = serde_json::to_vec(&item)?;
        if payload.len() > self.max_length {
            return Err(ProtocolError::LineTooLong {
                size: payload.len(),
                max: self.max_length,
            });
        }

        dst.reserve(payload.len() + 1);
        dst.extend_from_slice(&payload);
        dst.put_u8(b'\n');
        Ok(())
    }
}
