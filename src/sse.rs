//!
//! Server-Sent Events decoding for streaming completions.

use crate::traits::{CompletionStream, ProviderError};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::debug;

const DONE_MARKER: &str = "[DONE]";

/// Incremental decoder turning raw SSE bytes into `data:` payloads.
///
/// Bytes are buffered until a full line is available, so events split
/// across network chunks decode the same as unsplit ones. Decoding stops at
/// the `[DONE]` marker.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the payloads of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(payload) = self.decode_line(&line[..newline]) {
                payloads.push(payload);
            }
            if self.done {
                self.buffer.clear();
                break;
            }
        }
        payloads
    }

    /// Flushes a trailing line that never got its newline.
    pub fn finish(&mut self) -> Vec<String> {
        if self.done || self.buffer.is_empty() {
            self.buffer.clear();
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    /// True once `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches('\r');
        // Comments, `event:` and `id:` lines carry nothing we use.
        let payload = line.strip_prefix("data:")?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        if payload == DONE_MARKER {
            self.done = true;
            return None;
        }
        if payload.trim().is_empty() {
            return None;
        }
        Some(payload.to_string())
    }
}

struct DataStreamState<E> {
    bytes: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    exhausted: bool,
}

/// Adapts a byte stream (usually `reqwest::Response::bytes_stream`) into a
/// stream of SSE `data:` payloads.
pub fn data_stream<S, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
    ProviderError: From<E>,
{
    let state = DataStreamState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        exhausted: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(payload) = state.pending.pop_front() {
                return Some((Ok(payload), state));
            }
            if state.exhausted || state.decoder.is_done() {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(&chunk);
                    state.pending.extend(payloads);
                }
                Some(Err(err)) => {
                    state.exhausted = true;
                    return Some((Err(ProviderError::from(err)), state));
                }
                None => {
                    state.exhausted = true;
                    let rest = state.decoder.finish();
                    if !rest.is_empty() {
                        debug!(lines = rest.len(), "stream ended without a trailing newline");
                    }
                    state.pending.extend(rest);
                }
            }
        }
    }))
}
