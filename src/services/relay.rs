// src/services/relay.rs
//
// Server-sent-events plumbing for the streaming endpoint: a splitter that
// reassembles `\n\n`-delimited blocks out of arbitrary read boundaries, and
// a stream adapter that turns Gemini's SSE body into the blocks the browser
// consumes.
use std::collections::VecDeque;
use std::convert::Infallible;
use std::fmt::Display;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::StreamExt;
use futures::stream::{BoxStream, Stream};
use serde_json::Value;

use crate::services::normalizer;

/// One parsed protocol unit: an optional `event:` name plus the joined
/// `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseBlock {
    pub event: Option<String>,
    pub data: String,
}

/// Reassembles SSE blocks from a byte stream.
///
/// The transport may deliver partial or merged blocks; anything short of a
/// `\n\n` delimiter stays buffered until the next read.
#[derive(Debug, Default)]
pub struct BlockSplitter {
    buffer: Vec<u8>,
}

impl BlockSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one read's worth of bytes, returning every block it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseBlock> {
        self.buffer.extend_from_slice(chunk);
        let mut blocks = Vec::new();
        while let Some(at) = find_delimiter(&self.buffer) {
            let rest = self.buffer.split_off(at + 2);
            let head = std::mem::replace(&mut self.buffer, rest);
            if let Some(block) = parse_block(&String::from_utf8_lossy(&head[..at])) {
                blocks.push(block);
            }
        }
        blocks
    }

    /// Parse whatever trailing bytes never saw a terminating delimiter.
    pub fn flush(&mut self) -> Option<SseBlock> {
        if self.buffer.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.buffer);
        parse_block(&String::from_utf8_lossy(&tail))
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

// SSE line rules: multiple `data:` lines in a block join with newlines, and
// a single space after the colon is not part of the payload. Comment-only
// blocks parse to None.
fn parse_block(raw: &str) -> Option<SseBlock> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();
    for line in raw.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data.push(value.strip_prefix(' ').unwrap_or(value));
        } else if let Some(value) = line.strip_prefix("event:") {
            event = Some(value.strip_prefix(' ').unwrap_or(value).to_string());
        }
    }
    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseBlock {
        event,
        data: data.join("\n"),
    })
}

/// Frame a text fragment as a `data:` block.
pub fn data_block(text: &str) -> String {
    let mut out = String::new();
    for line in text.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}

/// Frame a named event block.
pub fn event_block(name: &str, data: &str) -> String {
    format!("event: {name}\ndata: {data}\n\n")
}

/// Relays an upstream Gemini SSE body to the client.
///
/// Each upstream `data:` block is parsed as JSON and reduced to its text
/// fragment, which is re-emitted as one client block, in arrival order.
/// Upstream end produces a single `event: end` block; an upstream failure
/// after streaming has begun produces an `event: error` block instead, and
/// the stream closes either way. Dropping the relay (client disconnect)
/// drops the upstream connection with it.
pub struct RelayStream<E> {
    upstream: BoxStream<'static, Result<Bytes, E>>,
    splitter: BlockSplitter,
    pending: VecDeque<String>,
    done: bool,
}

impl<E: Display> RelayStream<E> {
    pub fn new(upstream: impl Stream<Item = Result<Bytes, E>> + Send + 'static) -> Self {
        Self {
            upstream: upstream.boxed(),
            splitter: BlockSplitter::new(),
            pending: VecDeque::new(),
            done: false,
        }
    }

    fn enqueue(&mut self, blocks: Vec<SseBlock>) {
        for block in blocks {
            // Upstream control blocks are not part of the relay protocol.
            if block.event.is_some() {
                continue;
            }
            let Ok(payload) = serde_json::from_str::<Value>(&block.data) else {
                continue;
            };
            if let Some(text) = normalizer::chunk_text(&payload) {
                self.pending.push_back(data_block(&text));
            }
        }
    }
}

impl<E: Display> Stream for RelayStream<E> {
    type Item = Result<String, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if self.done {
                return Poll::Ready(None);
            }
            match self.upstream.poll_next_unpin(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    let blocks = self.splitter.feed(&bytes);
                    self.enqueue(blocks);
                }
                Poll::Ready(Some(Err(err))) => {
                    tracing::error!(error = %err, "upstream stream failed mid-relay");
                    self.pending
                        .push_back(event_block("error", "upstream connection lost"));
                    self.done = true;
                }
                Poll::Ready(None) => {
                    if let Some(tail) = self.splitter.flush() {
                        self.enqueue(vec![tail]);
                    }
                    self.pending.push_back(event_block("end", "done"));
                    self.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
