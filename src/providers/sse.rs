//! SSE stream decoding
//!
//! Upstream streaming responses arrive as `text/event-stream` frames that may
//! be split arbitrarily across network reads. [`SseLineReader`] reassembles
//! complete lines from the byte stream; [`parse_stream_chunk`] turns one
//! `data:` payload into the unified [`StreamChunk`].

use crate::models::chat::{Delta, StreamChoice, StreamChunk, Usage};
use crate::models::wire::UpstreamStreamChunk;
use crate::utils::error::{ProviderError, ProviderResult};

/// Upper bound for a single SSE line (large tool-call chunks fit comfortably).
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Incremental line splitter over raw SSE bytes.
#[derive(Debug, Default)]
pub struct SseLineReader {
    buf: Vec<u8>,
}

impl SseLineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly received bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete line, without its terminator.
    ///
    /// Returns `Ok(None)` when no full line is buffered yet. A line growing
    /// past [`MAX_LINE_BYTES`] aborts the stream.
    pub fn next_line(&mut self) -> ProviderResult<Option<String>> {
        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.buf.len() > MAX_LINE_BYTES {
                return Err(ProviderError::internal(
                    "stream line exceeds maximum length",
                ));
            }
            return Ok(None);
        };

        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // the \n
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        let line = String::from_utf8(line)
            .map_err(|err| ProviderError::internal(format!("invalid UTF-8 in stream: {err}")))?;

        Ok(Some(line))
    }
}

/// Extract the payload of a `data:` line, if this is one.
pub fn data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data: ")
}

/// Whether a data payload is the stream terminator.
pub fn is_done_marker(data: &str) -> bool {
    data.trim() == "[DONE]"
}

/// Parse one upstream chunk body into the unified chunk, keeping the raw
/// bytes for pass-through.
pub fn parse_stream_chunk(data: &[u8]) -> Result<StreamChunk, serde_json::Error> {
    let raw: UpstreamStreamChunk = serde_json::from_slice(data)?;

    let choices = raw
        .choices
        .into_iter()
        .map(|choice| StreamChoice {
            index: choice.index,
            delta: Delta {
                role: choice.delta.role,
                content: choice.delta.content,
                tool_calls: choice.delta.tool_calls,
            },
            finish_reason: choice.finish_reason,
            logprobs: choice.logprobs,
        })
        .collect();

    Ok(StreamChunk {
        id: raw.id,
        object: raw.object,
        created: raw.created,
        model: raw.model,
        system_fingerprint: raw.system_fingerprint,
        service_tier: raw.service_tier,
        choices,
        usage: raw.usage.map(|usage| Usage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }),
        raw: data.to_vec(),
    })
}
