//! NDJSON decoding of the backend output stream
//!
//! Chunks may split a JSON line anywhere (including inside a UTF-8
//! sequence); the decoder keeps the partial tail until its newline arrives.
//! Messages are yielded strictly in arrival order.

use crate::models::BackendMessage;
use crate::services::ByteStream;
use futures::stream::{Stream, StreamExt};
use tracing::{debug, warn};

/// One decoded item of the backend stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Message(BackendMessage),
    /// A line that is not a valid message; reported, never fatal
    Malformed { line: String, error: String },
    /// Reading the stream failed; no further events follow
    TransportError(String),
}

/// Incremental line splitter and parser
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    pending: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every complete line it finished
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(event) = decode_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush a final line that had no trailing newline
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let rest = std::mem::take(&mut self.pending);
        decode_line(&rest)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> Option<StreamEvent> {
    let mut line = raw;
    while let Some((last, rest)) = line.split_last() {
        if *last == b'\n' || *last == b'\r' {
            line = rest;
        } else {
            break;
        }
    }
    if line.iter().all(|b| b.is_ascii_whitespace()) {
        return None;
    }

    match serde_json::from_slice::<BackendMessage>(line) {
        Ok(message) => Some(StreamEvent::Message(message)),
        Err(e) => {
            let text = String::from_utf8_lossy(line).into_owned();
            warn!(error = %e, "Malformed line in backend stream");
            Some(StreamEvent::Malformed {
                line: text,
                error: e.to_string(),
            })
        }
    }
}

/// Turn the raw byte stream into decoded events, one batch per chunk
///
/// Every message completed by a chunk arrives in the same batch so the
/// consumer can apply them all before reading again. Empty batches are
/// never yielded.
pub fn decode_stream(mut bytes: ByteStream) -> impl Stream<Item = Vec<StreamEvent>> + Send {
    async_stream::stream! {
        let mut decoder = NdjsonDecoder::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    let events = decoder.push(&chunk);
                    if !events.is_empty() {
                        yield events;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Backend stream read failed");
                    yield vec![StreamEvent::TransportError(e.to_string())];
                    return;
                }
            }
        }

        if let Some(event) = decoder.finish() {
            yield vec![event];
        }
        debug!("Backend stream ended");
    }
}
