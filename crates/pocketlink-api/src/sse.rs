//! Server-Sent Events framing.
//!
//! [`SseParser`] is the line-level state machine; [`sse_events`] drives it
//! over a byte stream (e.g. `reqwest::Response::bytes_stream`) and yields
//! complete frames. The resulting stream is single-pass and ends at the
//! first read error or when the channel closes. Reconnecting means building
//! a new stream from a new response.

use futures_core::Stream;
use futures_util::StreamExt;

use crate::error::Error;

/// Longest line accepted before the stream is abandoned.
pub const MAX_LINE_BYTES: usize = 4 * 1024 * 1024;

/// One dispatched SSE frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Option<String>,
    pub id: Option<String>,
    /// Reconnection time in milliseconds.
    pub retry: Option<u64>,
}

impl SseEvent {
    /// A frame carrying only an `id` marks a connection or keepalive.
    pub fn is_id_only(&self) -> bool {
        self.id.is_some() && self.event.is_none() && self.data.is_none()
    }
}

/// Accumulates field lines into a draft and emits it on a blank line.
#[derive(Debug, Default)]
pub struct SseParser {
    draft: SseEvent,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line (without its terminator; a trailing `\r` is dropped).
    ///
    /// Returns the completed frame when `line` is blank and the draft has
    /// `data` or `id` set. Any other blank line just resets the draft.
    pub fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if line.is_empty() {
            let draft = std::mem::take(&mut self.draft);
            return (draft.data.is_some() || draft.id.is_some()).then_some(draft);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = line.split_once(':').unwrap_or((line, ""));

        match field {
            "event" => self.draft.event = Some(value.trim().to_owned()),
            "data" => {
                let value = value.trim_start();
                match &mut self.draft.data {
                    Some(existing) => {
                        existing.push('\n');
                        existing.push_str(value);
                    }
                    None => self.draft.data = Some(value.to_owned()),
                }
            }
            "id" => self.draft.id = Some(value.trim().to_owned()),
            "retry" => {
                if let Ok(ms) = value.trim().parse::<u64>() {
                    self.draft.retry = Some(ms);
                }
            }
            _ => {}
        }

        None
    }

    /// Drop any partially accumulated frame.
    pub fn reset(&mut self) {
        self.draft = SseEvent::default();
    }
}

/// Decode a chunked byte stream into SSE frames.
///
/// Chunks may split lines anywhere; bytes are buffered until a `\n`
/// arrives. A read error, or a line longer than [`MAX_LINE_BYTES`], is
/// yielded once and ends the stream. A partial frame left at channel
/// closure is discarded.
pub fn sse_events<S, B, E>(chunks: S) -> impl Stream<Item = Result<SseEvent, Error>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<Error>,
{
    async_stream::stream! {
        let mut parser = SseParser::new();
        let mut buffer: Vec<u8> = Vec::new();
        // Bytes of `buffer` already known to hold no newline.
        let mut scanned = 0;
        let mut chunks = std::pin::pin!(chunks);

        while let Some(chunk) = chunks.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            };
            buffer.extend_from_slice(bytes.as_ref());

            while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=scanned + offset).collect();
                scanned = 0;
                let line = raw.strip_suffix(b"\n").unwrap_or(&raw);
                if let Some(event) = parser.feed_line(&String::from_utf8_lossy(line)) {
                    tracing::trace!(event = ?event.event, id = ?event.id, "SSE frame");
                    yield Ok(event);
                }
            }
            scanned = buffer.len();

            if buffer.len() > MAX_LINE_BYTES {
                yield Err(Error::RealtimeStream(format!(
                    "SSE line exceeds {MAX_LINE_BYTES} bytes"
                )));
                return;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use futures_util::stream;
    use pretty_assertions::assert_eq;

    use super::*;

    fn feed_all(parser: &mut SseParser, text: &str) -> Vec<SseEvent> {
        text.split('\n').filter_map(|l| parser.feed_line(l)).collect()
    }

    #[test]
    fn multi_line_data_is_joined_with_newline() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "data: foo\ndata: bar\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some("foo\nbar"));
    }

    #[test]
    fn named_event_with_json_data() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "event: update\ndata: {\"a\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event: Some("update".into()),
                data: Some("{\"a\":1}".into()),
                ..SseEvent::default()
            }]
        );
    }

    #[test]
    fn id_only_frame_is_emitted() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "id: abc123 \n\n");
        assert_eq!(events.len(), 1);
        assert!(events[0].is_id_only());
        assert_eq!(events[0].id.as_deref(), Some("abc123"));
    }

    #[test]
    fn event_without_data_or_id_is_dropped() {
        let mut parser = SseParser::new();
        assert!(feed_all(&mut parser, "event: ping\n\n").is_empty());
        // The draft was reset, so the name does not leak into the next frame.
        let events = feed_all(&mut parser, "data: x\n\n");
        assert_eq!(events[0].event, None);
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, ": keepalive\nfoo: bar\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data.as_deref(), Some("x"));
    }

    #[test]
    fn retry_is_parsed_or_ignored() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "retry: 2500\ndata: x\n\nretry: soon\ndata: y\n\n");
        assert_eq!(events[0].retry, Some(2500));
        assert_eq!(events[1].retry, None);
    }

    #[test]
    fn crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "event: a\r\ndata: b\r\n\r\n");
        assert_eq!(events[0].event.as_deref(), Some("a"));
        assert_eq!(events[0].data.as_deref(), Some("b"));
    }

    #[test]
    fn data_keeps_trailing_whitespace() {
        let mut parser = SseParser::new();
        let events = feed_all(&mut parser, "data:   padded  \n\n");
        assert_eq!(events[0].data.as_deref(), Some("padded  "));
    }

    #[tokio::test]
    async fn stream_handles_chunks_split_mid_line() {
        let chunks = vec![
            Ok::<_, Error>("event: up".as_bytes().to_vec()),
            Ok("date\ndata: {\"a\"".as_bytes().to_vec()),
            Ok(":1}\n\nid: 7\n\n".as_bytes().to_vec()),
        ];
        let events: Vec<_> = sse_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        let first = events[0].as_ref().unwrap();
        assert_eq!(first.event.as_deref(), Some("update"));
        assert_eq!(first.data.as_deref(), Some("{\"a\":1}"));
        assert!(events[1].as_ref().unwrap().is_id_only());
    }

    #[tokio::test]
    async fn stream_ends_after_read_error() {
        let chunks = vec![
            Ok::<_, Error>(b"data: one\n\n".to_vec()),
            Err(Error::RealtimeStream("reset".into())),
            Ok(b"data: two\n\n".to_vec()),
        ];
        let events: Vec<_> = sse_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(Error::RealtimeStream(_))));
    }

    #[tokio::test]
    async fn partial_frame_at_close_is_discarded() {
        let chunks = vec![Ok::<_, Error>(b"data: unterminated\n".to_vec())];
        let events: Vec<_> = sse_events(stream::iter(chunks)).collect().await;
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn overlong_line_ends_the_stream() {
        let chunk = vec![b'x'; MAX_LINE_BYTES / 2 + 1];
        let chunks = vec![
            Ok::<_, Error>(b"data: ok\n\ndata: ".to_vec()),
            Ok(chunk.clone()),
            Ok(chunk),
            Ok(b"\n\n".to_vec()),
        ];
        let events: Vec<_> = sse_events(stream::iter(chunks)).collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap().data.as_deref(), Some("ok"));
        assert!(matches!(events[1], Err(Error::RealtimeStream(_))));
    }
}
