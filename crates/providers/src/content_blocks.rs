//! Streaming accumulator for the `content_block_*` event vocabulary.
//!
//! Both the direct Messages API (SSE) and Bedrock (binary event stream)
//! deliver the same JSON events; this module turns them into
//! [`StreamChunk`]s. Each tool-use block is tracked by its index through
//! `Opened -> Accumulating -> Closed`, so interleaved blocks are fine and a
//! call is emitted exactly once, on its `content_block_stop`.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::mpsc;
use toolrelay_core::error::ProviderError;
use toolrelay_core::provider::{StreamChunk, Usage};
use tracing::{debug, trace, warn};

pub(crate) type ChunkSender = mpsc::Sender<Result<StreamChunk, ProviderError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    Opened,
    Accumulating,
    Closed,
}

#[derive(Debug)]
struct ToolUseBlock {
    id: String,
    name: String,
    state: BlockState,
    /// Raw `partial_json` fragments, concatenated
    buffer: String,
    /// Last successful parse of `buffer`
    parsed: Option<Value>,
    /// `input` sent on `content_block_start`, usually `{}`
    start_input: Option<Value>,
}

impl ToolUseBlock {
    fn append(&mut self, fragment: &str) {
        self.state = BlockState::Accumulating;
        self.buffer.push_str(fragment);
        // Incomplete JSON is expected until the final fragment arrives.
        if let Ok(value) = serde_json::from_str::<Value>(&self.buffer) {
            self.parsed = Some(value);
        }
    }

    fn close(&mut self) -> StreamChunk {
        self.state = BlockState::Closed;
        let input = if self.buffer.trim().is_empty() {
            self.start_input
                .take()
                .unwrap_or_else(|| Value::Object(Default::default()))
        } else {
            match serde_json::from_str::<Value>(&self.buffer) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool = %self.name, error = %e, "Tool input did not parse, using last good value");
                    self.parsed
                        .take()
                        .unwrap_or_else(|| Value::Object(Default::default()))
                }
            }
        };
        StreamChunk::ToolUse {
            id: std::mem::take(&mut self.id),
            name: std::mem::take(&mut self.name),
            input,
        }
    }
}

/// Per-response accumulator. Feed it every decoded event in order.
#[derive(Debug, Default)]
pub struct ContentBlockAccumulator {
    blocks: HashMap<u64, ToolUseBlock>,
}

impl ContentBlockAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one event and return the chunks it completes.
    pub fn handle(&mut self, event: &Value) -> Result<Vec<StreamChunk>, ProviderError> {
        let index = event["index"].as_u64().unwrap_or(0);
        let mut out = Vec::new();

        match event["type"].as_str().unwrap_or("") {
            "message_start" => {
                let message = &event["message"];
                // Output tokens are reported cumulatively by message_delta.
                let usage = Usage {
                    input_tokens: token_count(message["usage"]["input_tokens"].as_u64().unwrap_or(0)),
                    output_tokens: 0,
                };
                out.push(StreamChunk::Usage {
                    usage,
                    model: message["model"].as_str().map(str::to_string),
                });
            }
            "content_block_start" => {
                let block = &event["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => {
                        self.blocks.insert(
                            index,
                            ToolUseBlock {
                                id: block["id"].as_str().unwrap_or_default().to_string(),
                                name: block["name"].as_str().unwrap_or_default().to_string(),
                                state: BlockState::Opened,
                                buffer: String::new(),
                                parsed: None,
                                start_input: block
                                    .get("input")
                                    .filter(|v| v.as_object().is_some_and(|o| !o.is_empty()))
                                    .cloned(),
                            },
                        );
                    }
                    Some("text") => {
                        if let Some(text) = block["text"].as_str().filter(|t| !t.is_empty()) {
                            out.push(StreamChunk::Text {
                                content: text.to_string(),
                            });
                        }
                    }
                    _ => {}
                }
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str().unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta["text"].as_str() {
                            out.push(StreamChunk::Text {
                                content: text.to_string(),
                            });
                        }
                    }
                    "input_json_delta" => {
                        let fragment = delta["partial_json"].as_str().unwrap_or("");
                        match self.blocks.get_mut(&index) {
                            Some(block) if block.state != BlockState::Closed => block.append(fragment),
                            _ => warn!(index, "input_json_delta for unknown or closed block"),
                        }
                    }
                    other => trace!(delta_type = other, "Ignoring content block delta"),
                }
            }
            "content_block_stop" => {
                if let Some(block) = self.blocks.get_mut(&index) {
                    if block.state != BlockState::Closed {
                        out.push(block.close());
                    }
                }
            }
            "message_delta" => {
                if let Some(output) = event["usage"]["output_tokens"].as_u64() {
                    out.push(StreamChunk::Usage {
                        usage: Usage {
                            input_tokens: 0,
                            output_tokens: token_count(output),
                        },
                        model: None,
                    });
                }
            }
            "error" => {
                let message = event["error"]["message"]
                    .as_str()
                    .or_else(|| event["message"].as_str())
                    .unwrap_or("unknown stream error");
                return Err(ProviderError::StreamInterrupted(message.to_string()));
            }
            _ => {}
        }

        Ok(out)
    }

    /// Close any block the stream left open. Called when the transport ends.
    pub fn finish(&mut self) -> Vec<StreamChunk> {
        let mut open: Vec<(&u64, &mut ToolUseBlock)> = self
            .blocks
            .iter_mut()
            .filter(|(_, b)| b.state != BlockState::Closed)
            .collect();
        open.sort_by_key(|(index, _)| **index);
        open.into_iter()
            .map(|(index, block)| {
                warn!(index = *index, tool = %block.name, "Stream ended with an open tool_use block");
                block.close()
            })
            .collect()
    }
}

/// Run one decoded event through the accumulator and forward the result.
/// Returns `false` once the stream should stop: the event was an error or
/// the receiver is gone.
/// Clamps a reported token count to the `Usage` field width.
fn token_count(raw: u64) -> u32 {
    u32::try_from(raw).unwrap_or(u32::MAX)
}

pub(crate) async fn dispatch(
    acc: &mut ContentBlockAccumulator,
    event: &Value,
    tx: &ChunkSender,
) -> bool {
    match acc.handle(event) {
        Ok(chunks) => send_all(chunks, tx).await,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

pub(crate) async fn send_all(chunks: Vec<StreamChunk>, tx: &ChunkSender) -> bool {
    for chunk in chunks {
        if tx.send(Ok(chunk)).await.is_err() {
            debug!("Stream receiver dropped, stopping");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feed(acc: &mut ContentBlockAccumulator, events: &[Value]) -> Vec<StreamChunk> {
        events
            .iter()
            .flat_map(|e| acc.handle(e).unwrap())
            .collect()
    }

    #[test]
    fn text_deltas_pass_through() {
        let mut acc = ContentBlockAccumulator::new();
        let chunks = feed(
            &mut acc,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "lo"}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        assert_eq!(
            chunks,
            vec![
                StreamChunk::Text { content: "Hel".into() },
                StreamChunk::Text { content: "lo".into() },
            ]
        );
    }

    #[test]
    fn tool_use_emitted_once_on_stop() {
        let mut acc = ContentBlockAccumulator::new();
        let chunks = feed(
            &mut acc,
            &[
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "toolu_1", "name": "create_record", "input": {}}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"name\": \"Q"}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "3 bid\"}"}}),
                json!({"type": "content_block_stop", "index": 1}),
                json!({"type": "content_block_stop", "index": 1}),
            ],
        );
        assert_eq!(
            chunks,
            vec![StreamChunk::ToolUse {
                id: "toolu_1".into(),
                name: "create_record".into(),
                input: json!({"name": "Q3 bid"}),
            }]
        );
        assert!(acc.finish().is_empty());
    }

    #[test]
    fn interleaved_tool_blocks_stay_separate() {
        let mut acc = ContentBlockAccumulator::new();
        let chunks = feed(
            &mut acc,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "a", "name": "first"}}),
                json!({"type": "content_block_start", "index": 1, "content_block": {"type": "tool_use", "id": "b", "name": "second"}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "{\"y\":"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"x\":1}"}}),
                json!({"type": "content_block_delta", "index": 1, "delta": {"type": "input_json_delta", "partial_json": "2}"}}),
                json!({"type": "content_block_stop", "index": 1}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        assert_eq!(chunks.len(), 2);
        assert!(matches!(&chunks[0], StreamChunk::ToolUse { id, input, .. } if id == "b" && input == &json!({"y": 2})));
        assert!(matches!(&chunks[1], StreamChunk::ToolUse { id, input, .. } if id == "a" && input == &json!({"x": 1})));
    }

    #[test]
    fn empty_arguments_fall_back_to_start_input() {
        let mut acc = ContentBlockAccumulator::new();
        let chunks = feed(
            &mut acc,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "list", "input": {}}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        assert!(matches!(&chunks[0], StreamChunk::ToolUse { input, .. } if input == &json!({})));
    }

    #[test]
    fn truncated_arguments_use_last_good_parse() {
        let mut acc = ContentBlockAccumulator::new();
        let chunks = feed(
            &mut acc,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "x"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"a\":1}"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": ","}}),
                json!({"type": "content_block_stop", "index": 0}),
            ],
        );
        assert!(matches!(&chunks[0], StreamChunk::ToolUse { input, .. } if input == &json!({"a": 1})));
    }

    #[test]
    fn usage_from_message_events() {
        let mut acc = ContentBlockAccumulator::new();
        let chunks = feed(
            &mut acc,
            &[
                json!({"type": "message_start", "message": {"model": "claude-x", "usage": {"input_tokens": 25, "output_tokens": 1}}}),
                json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 40}}),
            ],
        );
        let mut collector = toolrelay_core::provider::StreamCollector::default();
        for c in chunks {
            collector.push(c);
        }
        let completion = collector.finish();
        assert_eq!(completion.usage.input_tokens, 25);
        assert_eq!(completion.usage.output_tokens, 40);
        assert_eq!(completion.model.as_deref(), Some("claude-x"));
    }

    #[test]
    fn oversized_token_counts_saturate() {
        let mut acc = ContentBlockAccumulator::new();
        let chunks = feed(
            &mut acc,
            &[
                json!({"type": "message_start", "message": {"usage": {"input_tokens": 5_000_000_000u64}}}),
                json!({"type": "message_delta", "usage": {"output_tokens": 4_294_967_296u64}}),
            ],
        );
        let mut collector = toolrelay_core::provider::StreamCollector::default();
        for c in chunks {
            collector.push(c);
        }
        let usage = collector.finish().usage;
        assert_eq!(usage.input_tokens, u32::MAX);
        assert_eq!(usage.output_tokens, u32::MAX);
        assert_eq!(usage.total(), u32::MAX);
    }

    #[test]
    fn error_event_fails_stream() {
        let mut acc = ContentBlockAccumulator::new();
        let err = acc
            .handle(&json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}))
            .unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }

    #[test]
    fn finish_closes_open_blocks() {
        let mut acc = ContentBlockAccumulator::new();
        feed(
            &mut acc,
            &[
                json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": "t", "name": "x"}}),
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": "{\"k\":true}"}}),
            ],
        );
        let chunks = acc.finish();
        assert_eq!(chunks.len(), 1);
        assert!(acc.finish().is_empty());
    }
}
