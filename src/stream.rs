//! Parsing for the backend's streaming wire protocol: newline-delimited
//! JSON, one object per line, no `data: ` framing and no sentinel line —
//! the terminal line simply carries `"done": true` plus the token counts.
//!
//! This plays the role the teacher's `utils.rs` SSE line-scanner played,
//! but for a materially different protocol: Ollama's `/api/chat` streams
//! a complete tool call per line rather than incremental deltas keyed by
//! index, so there's no multi-chunk accumulator to maintain — each line
//! is parsed and converted to zero or more [`StreamChunk`]s immediately.

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{StreamChunk, ToolCall, Usage};

#[derive(Debug, Deserialize, Default)]
struct WireToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: Option<String>,
    function: WireToolCallFunction,
}

#[derive(Debug, Deserialize, Default)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

/// One raw line of the `/api/chat` NDJSON response.
#[derive(Debug, Deserialize)]
pub(crate) struct WireChunk {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

/// Parses a tool's `arguments` payload, tolerating the backend's two wire
/// forms (a JSON object, or a JSON-encoded string of one) and any
/// malformed/empty input.
///
/// Never errors: unparseable input degrades to an empty map plus a
/// recorded `parse_error`, per the "never crash the caller" contract
/// (SPEC_FULL.md §4.1, testable-property scenario 6).
pub fn parse_tool_arguments(value: &Value) -> (Map<String, Value>, Option<String>) {
    match value {
        Value::Object(map) => (map.clone(), None),
        Value::Null => (Map::new(), None),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() || trimmed == "{}" || trimmed == "null" {
                return (Map::new(), None);
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => (map, None),
                Ok(_) => (
                    Map::new(),
                    Some(format!("arguments string did not encode a JSON object: {trimmed}")),
                ),
                Err(e) => (Map::new(), Some(format!("invalid JSON in arguments: {e}"))),
            }
        }
        other => (
            Map::new(),
            Some(format!("unsupported arguments shape: {other}")),
        ),
    }
}

/// Converts a stream of raw NDJSON lines into [`StreamChunk`]s, assigning
/// a synthetic id (`call_<n>`) to any tool call the backend didn't label
/// itself — Ollama's native `/api/chat` tool calls carry no `id` field,
/// unlike the OpenAI-compatible shape this crate's tool-call linkage
/// invariant assumes.
pub(crate) struct LineConverter {
    next_synthetic_id: usize,
}

impl LineConverter {
    pub(crate) fn new() -> Self {
        Self { next_synthetic_id: 0 }
    }

    pub(crate) fn convert(&mut self, chunk: WireChunk) -> Vec<StreamChunk> {
        let mut out = Vec::new();

        if let Some(err) = chunk.error {
            out.push(StreamChunk::Error(Error::llm_request_failed(err)));
            return out;
        }

        if let Some(message) = chunk.message {
            if let Some(thinking) = message.thinking {
                if !thinking.is_empty() {
                    out.push(StreamChunk::Thinking(thinking));
                }
            }
            if !message.content.is_empty() {
                out.push(StreamChunk::Text(message.content));
            }
            for call in message.tool_calls {
                let id = call.id.unwrap_or_else(|| {
                    let id = format!("call_{}", self.next_synthetic_id);
                    self.next_synthetic_id += 1;
                    id
                });
                let (input, parse_error) = parse_tool_arguments(&call.function.arguments);
                out.push(StreamChunk::ToolCall(ToolCall {
                    id,
                    name: call.function.name,
                    input,
                    parse_error,
                }));
            }
        }

        if chunk.done {
            let usage = match (chunk.prompt_eval_count, chunk.eval_count) {
                (None, None) => None,
                (p, e) => Some(Usage {
                    input_tokens: p.unwrap_or(0),
                    output_tokens: e.unwrap_or(0),
                }),
            };
            out.push(StreamChunk::Done(usage));
        }

        out
    }
}

/// Parses a single non-streamed `/api/chat` JSON response (used by the
/// unary `chat()` path) into the same shape a terminal stream chunk would
/// have produced: accumulated text, any tool calls, and usage.
pub(crate) fn parse_unary_response(
    body: &str,
) -> Result<(String, Vec<ToolCall>, Option<Usage>)> {
    let wire: WireChunk = serde_json::from_str(body)?;
    let mut converter = LineConverter::new();
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    let mut usage = None;
    for chunk in converter.convert(wire) {
        match chunk {
            StreamChunk::Text(t) => text.push_str(&t),
            StreamChunk::ToolCall(tc) => tool_calls.push(tc),
            StreamChunk::Done(u) => usage = u,
            StreamChunk::Error(e) => return Err(e),
            StreamChunk::Thinking(_) => {}
        }
    }
    Ok((text, tool_calls, usage))
}

/// Splits an HTTP response body into NDJSON lines and parses each into a
/// [`StreamChunk`] sequence. Cancellation is the caller's responsibility
/// (dropping the returned stream aborts the underlying body read).
pub(crate) fn parse_ndjson_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>> {
    let byte_stream = response.bytes_stream();

    let stream = futures::stream::unfold(
        (byte_stream, Vec::<u8>::new(), LineConverter::new(), false),
        |(mut byte_stream, mut buf, mut converter, mut done_emitted)| async move {
            loop {
                if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
                    let line: Vec<u8> = buf.drain(..=pos).collect();
                    let line = &line[..line.len() - 1];
                    if line.iter().all(|b| b.is_ascii_whitespace()) {
                        continue;
                    }
                    let text = String::from_utf8_lossy(line);
                    let parsed: std::result::Result<WireChunk, _> = serde_json::from_str(&text);
                    let chunks = match parsed {
                        Ok(wire) => converter.convert(wire),
                        Err(e) => vec![StreamChunk::Error(Error::from(e))],
                    };
                    if chunks.is_empty() {
                        continue;
                    }
                    if chunks.iter().any(|c| matches!(c, StreamChunk::Done(_))) {
                        done_emitted = true;
                    }
                    return Some((
                        futures::stream::iter(chunks.into_iter().map(Ok)),
                        (byte_stream, buf, converter, done_emitted),
                    ));
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                    Some(Err(e)) => {
                        return Some((
                            futures::stream::iter(vec![Ok(StreamChunk::Error(Error::from(e)))]),
                            (byte_stream, Vec::new(), converter, true),
                        ));
                    }
                    None => {
                        if !buf.is_empty() && !done_emitted {
                            let text = String::from_utf8_lossy(&buf).to_string();
                            buf.clear();
                            let parsed: std::result::Result<WireChunk, _> =
                                serde_json::from_str(&text);
                            if let Ok(wire) = parsed {
                                let chunks = converter.convert(wire);
                                if !chunks.is_empty() {
                                    return Some((
                                        futures::stream::iter(chunks.into_iter().map(Ok)),
                                        (byte_stream, buf, converter, done_emitted),
                                    ));
                                }
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
    .flatten();

    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn argument_parsing_accepts_object() {
        let (map, err) = parse_tool_arguments(&json!({"path": "/x"}));
        assert_eq!(map.get("path").unwrap(), "/x");
        assert!(err.is_none());
    }

    #[test]
    fn argument_parsing_accepts_json_encoded_string() {
        let (map, err) = parse_tool_arguments(&Value::String(r#"{"path":"/x"}"#.to_string()));
        assert_eq!(map.get("path").unwrap(), "/x");
        assert!(err.is_none());
    }

    #[test]
    fn argument_parsing_empty_forms_yield_empty_map() {
        for input in ["{}", "", "null"] {
            let (map, err) = parse_tool_arguments(&Value::String(input.to_string()));
            assert!(map.is_empty());
            assert!(err.is_none());
        }
        let (map, err) = parse_tool_arguments(&Value::Null);
        assert!(map.is_empty());
        assert!(err.is_none());
    }

    #[test]
    fn argument_parsing_unparseable_string_degrades_gracefully() {
        let (map, err) = parse_tool_arguments(&Value::String("not json".to_string()));
        assert!(map.is_empty());
        assert!(err.is_some());
    }

    #[test]
    fn converter_emits_text_and_synthetic_tool_call_id() {
        let mut conv = LineConverter::new();
        let chunk = WireChunk {
            message: Some(WireMessage {
                content: "hi".to_string(),
                thinking: None,
                tool_calls: vec![WireToolCall {
                    id: None,
                    function: WireToolCallFunction {
                        name: "read_file".to_string(),
                        arguments: json!({"path": "a.txt"}),
                    },
                }],
            }),
            done: false,
            prompt_eval_count: None,
            eval_count: None,
            error: None,
        };
        let chunks = conv.convert(chunk);
        assert!(matches!(&chunks[0], StreamChunk::Text(t) if t == "hi"));
        match &chunks[1] {
            StreamChunk::ToolCall(tc) => {
                assert_eq!(tc.id, "call_0");
                assert_eq!(tc.name, "read_file");
            }
            _ => panic!("expected a tool call chunk"),
        }
    }

    #[test]
    fn converter_done_chunk_carries_usage() {
        let mut conv = LineConverter::new();
        let chunk = WireChunk {
            message: None,
            done: true,
            prompt_eval_count: Some(10),
            eval_count: Some(20),
            error: None,
        };
        let chunks = conv.convert(chunk);
        match &chunks[0] {
            StreamChunk::Done(Some(usage)) => {
                assert_eq!(usage.input_tokens, 10);
                assert_eq!(usage.output_tokens, 20);
            }
            _ => panic!("expected a done chunk with usage"),
        }
    }

    #[test]
    fn converter_preserves_backend_supplied_id() {
        let mut conv = LineConverter::new();
        let chunk = WireChunk {
            message: Some(WireMessage {
                content: String::new(),
                thinking: None,
                tool_calls: vec![WireToolCall {
                    id: Some("c1".to_string()),
                    function: WireToolCallFunction {
                        name: "read_file".to_string(),
                        arguments: Value::Null,
                    },
                }],
            }),
            done: false,
            prompt_eval_count: None,
            eval_count: None,
            error: None,
        };
        let chunks = conv.convert(chunk);
        match &chunks[0] {
            StreamChunk::ToolCall(tc) => assert_eq!(tc.id, "c1"),
            _ => panic!("expected a tool call chunk"),
        }
    }
}
