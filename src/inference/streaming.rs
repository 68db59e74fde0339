//! SSE streaming response parser for OpenAI-compatible chat completions.
//!
//! Reads a response body as a byte stream, splits on SSE boundaries
//! (`data: …\n\n`) and parses each event into a [`StreamChunk`].

use futures::stream::{self, Stream, StreamExt};

use super::errors::InferenceError;
use super::types::{ChatCompletionChunk, StreamChunk};

// ─── SSE line parser ─────────────────────────────────────────────────────────

/// Parse raw SSE bytes into `StreamChunk`s.
///
/// 1. Buffers bytes until a complete event (`\n\n`) is available
/// 2. Parses each `data:` payload as a `ChatCompletionChunk`
/// 3. Emits one `StreamChunk` per content-bearing event
///
/// The stream ends after `[DONE]` or when the body ends.
pub fn parse_sse_stream<S, B, E>(
    byte_stream: S,
) -> impl Stream<Item = Result<StreamChunk, InferenceError>>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                // Decode only whole events so multi-byte characters split
                // across reads stay intact.
                if let Some((event_end, separator)) = event_boundary(&buffer) {
                    let raw: Vec<u8> = buffer.drain(..event_end + separator).collect();
                    let event = String::from_utf8_lossy(&raw[..event_end]);

                    match process_event(&event) {
                        Ok(SseEvent::Chunk(chunk)) => {
                            return Some((Ok(chunk), (byte_stream, buffer, false)))
                        }
                        Ok(SseEvent::Done) => return None,
                        Ok(SseEvent::Skip) => continue,
                        Err(e) => return Some((Err(e), (byte_stream, buffer, true))),
                    }
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(bytes.as_ref()),
                    Some(Err(e)) => {
                        return Some((
                            Err(InferenceError::StreamError {
                                reason: format!("stream read error: {e}"),
                            }),
                            (byte_stream, buffer, true),
                        ));
                    }
                    None => {
                        // Body ended without a trailing blank line.
                        let rest = String::from_utf8_lossy(&buffer).trim().to_string();
                        buffer.clear();
                        if rest.is_empty() {
                            return None;
                        }
                        return match process_event(&rest) {
                            Ok(SseEvent::Chunk(chunk)) => {
                                Some((Ok(chunk), (byte_stream, buffer, true)))
                            }
                            Ok(_) => None,
                            Err(e) => Some((Err(e), (byte_stream, buffer, true))),
                        };
                    }
                }
            }
        },
    )
}

/// Position and length of the first blank-line separator (`\n\n` or `\r\n\r\n`).
fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    (0..buffer.len()).find_map(|i| {
        let rest = &buffer[i..];
        if rest.starts_with(b"\n\n") {
            Some((i, 2))
        } else if rest.starts_with(b"\r\n\r\n") {
            Some((i, 4))
        } else {
            None
        }
    })
}

enum SseEvent {
    Chunk(StreamChunk),
    Done,
    /// Keep-alive, comment, or an event with no content.
    Skip,
}

/// Process a single SSE event string (may contain multiple `data:` lines).
fn process_event(event: &str) -> Result<SseEvent, InferenceError> {
    let mut data_content = String::new();

    for line in event.lines() {
        if let Some(data) = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")) {
            let data = data.trim();
            if data == "[DONE]" {
                return Ok(SseEvent::Done);
            }
            data_content.push_str(data);
        }
    }

    if data_content.is_empty() {
        return Ok(SseEvent::Skip);
    }

    let chunk: ChatCompletionChunk =
        serde_json::from_str(&data_content).map_err(|e| InferenceError::StreamError {
            reason: format!("failed to parse SSE chunk: {e} (data: {data_content})"),
        })?;

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseEvent::Skip);
    };

    // Only `content` is surfaced; reasoning deltas are dropped.
    let token = choice.delta.content.filter(|c| !c.is_empty());
    if token.is_none() && choice.finish_reason.is_none() {
        return Ok(SseEvent::Skip);
    }

    Ok(SseEvent::Chunk(StreamChunk {
        token,
        finish_reason: choice.finish_reason,
    }))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&'static str]) -> impl Stream<Item = Result<&'static [u8], String>> + Unpin {
        stream::iter(parts.iter().map(|p| Ok::<_, String>(p.as_bytes())).collect::<Vec<_>>())
    }

    fn delta(content: &str) -> String {
        format!(
            "data: {{\"choices\":[{{\"delta\":{{\"content\":{}}},\"finish_reason\":null}}]}}\n\n",
            serde_json::to_string(content).unwrap()
        )
    }

    async fn tokens<S>(stream: S) -> Vec<String>
    where
        S: Stream<Item = Result<StreamChunk, InferenceError>>,
    {
        stream
            .filter_map(|c| async move { c.ok().and_then(|c| c.token) })
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_parses_tokens_until_done() {
        let a = delta("Hel");
        let b = delta("lo");
        let raw: &'static str =
            Box::leak(format!("{a}: keep-alive\n\n{b}data: [DONE]\n\n{}", delta("ignored")).into_boxed_str());
        let out = tokens(Box::pin(parse_sse_stream(body(&[raw])))).await;
        assert_eq!(out, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_event_split_across_reads() {
        let whole = delta("split token");
        let (first, second) = whole.split_at(17);
        let first: &'static str = Box::leak(first.to_string().into_boxed_str());
        let second: &'static str = Box::leak(second.to_string().into_boxed_str());
        let out = tokens(Box::pin(parse_sse_stream(body(&[first, second])))).await;
        assert_eq!(out, vec!["split token"]);
    }

    #[tokio::test]
    async fn test_multibyte_character_split_across_reads() {
        let whole = delta("café");
        let bytes = whole.as_bytes();
        // Cut between the two bytes of 'é' (0xC3 0xA9).
        let cut = bytes.iter().position(|&b| b == 0xC3).unwrap() + 1;
        let first: &'static [u8] = Box::leak(bytes[..cut].to_vec().into_boxed_slice());
        let second: &'static [u8] = Box::leak(bytes[cut..].to_vec().into_boxed_slice());
        let reads = stream::iter(vec![Ok::<_, String>(first), Ok(second)]);
        let out = tokens(Box::pin(parse_sse_stream(reads))).await;
        assert_eq!(out, vec!["café"]);
    }

    #[tokio::test]
    async fn test_crlf_separated_events() {
        let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\r\n\r\ndata: [DONE]\r\n\r\n";
        let out = tokens(Box::pin(parse_sse_stream(body(&[raw])))).await;
        assert_eq!(out, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_reasoning_only_delta_skipped() {
        let raw = "data: {\"choices\":[{\"delta\":{\"reasoning\":\"thinking\"}}]}\n\n\
                   data: {\"choices\":[{\"delta\":{\"content\":\"answer\"}}]}\n\n";
        let out = tokens(Box::pin(parse_sse_stream(body(&[raw])))).await;
        assert_eq!(out, vec!["answer"]);
    }

    #[tokio::test]
    async fn test_malformed_chunk_is_error() {
        let raw = "data: {not json}\n\n";
        let results: Vec<_> = Box::pin(parse_sse_stream(body(&[raw]))).collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(InferenceError::StreamError { .. })));
    }

    #[tokio::test]
    async fn test_read_error_ends_stream() {
        let failing = stream::iter(vec![Err::<&'static [u8], String>("reset by peer".into())]);
        let results: Vec<_> = Box::pin(parse_sse_stream(failing)).collect().await;
        assert_eq!(results.len(), 1);
        match &results[0] {
            Err(InferenceError::StreamError { reason }) => assert!(reason.contains("reset by peer")),
            other => panic!("expected StreamError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trailing_event_without_blank_line() {
        let raw = "data: {\"choices\":[{\"delta\":{\"content\":\"tail\"},\"finish_reason\":\"stop\"}]}";
        let results: Vec<_> = Box::pin(parse_sse_stream(body(&[raw]))).collect().await;
        let chunk = results[0].as_ref().unwrap();
        assert_eq!(chunk.token.as_deref(), Some("tail"));
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }
}
