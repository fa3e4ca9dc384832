use std::fmt::Display;
use std::pin::pin;

use axum::body::Bytes;
use axum::response::sse::Event;
use eventsource_stream::Eventsource;
use futures::{future, stream, Stream, StreamExt};
use serde_json::Value;

use crate::services::dify::DifyError;

/// Answer and conversation id captured from one streamed chat call.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedAnswer {
    pub answer: String,
    pub conversation_id: Option<String>,
}

/// Folds the JSON payloads of a chat event stream.
///
/// `answer` and `conversation_id` are last-one-wins. A `workflow_finished`
/// event carrying `data.outputs.answer` overrides any partial answer seen
/// before or after it.
#[derive(Debug, Default)]
pub struct AnswerAggregator {
    latest_answer: Option<String>,
    final_answer: Option<String>,
    conversation_id: Option<String>,
    upstream_error: Option<String>,
    events: usize,
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl AnswerAggregator {
    pub fn observe(&mut self, data: &str) {
        let value: Value = match serde_json::from_str(data.trim()) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "skipping malformed stream event");
                return;
            }
        };
        self.events += 1;

        if let Some(id) = non_empty_str(value.get("conversation_id")) {
            self.conversation_id = Some(id);
        }

        match value.get("event").and_then(Value::as_str) {
            Some("workflow_finished") => {
                if let Some(answer) = non_empty_str(value.pointer("/data/outputs/answer")) {
                    self.final_answer = Some(answer);
                }
            }
            Some("error") => {
                let message = non_empty_str(value.get("message"))
                    .unwrap_or_else(|| "unknown upstream error".to_string());
                self.upstream_error = Some(message);
            }
            _ => {}
        }

        if let Some(answer) = non_empty_str(value.get("answer")) {
            self.latest_answer = Some(answer);
        }
    }

    pub fn finish(self) -> Result<CapturedAnswer, DifyError> {
        let conversation_id = self.conversation_id;

        if let Some(message) = self.upstream_error {
            return Err(DifyError::UpstreamEvent {
                message,
                conversation_id,
            });
        }

        match self.final_answer.or(self.latest_answer) {
            Some(answer) => Ok(CapturedAnswer {
                answer,
                conversation_id,
            }),
            None => {
                tracing::warn!(
                    events = self.events,
                    conversation_id = ?conversation_id,
                    "stream ended without an answer"
                );
                Err(DifyError::EmptyAnswer { conversation_id })
            }
        }
    }
}

/// Reads an SSE byte stream to completion and returns the captured answer.
///
/// Lines split across chunks are reassembled before parsing, and every
/// `data:` line is observed on its own. The trailing blank line flushes a
/// final event the upstream did not terminate.
pub async fn collect_answer<S, B, E>(body: S) -> Result<CapturedAnswer, DifyError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let body = body
        .map(|chunk| chunk.map(|b| Bytes::copy_from_slice(b.as_ref())))
        .chain(stream::once(future::ready(Ok(Bytes::from_static(b"\n\n")))));
    let mut events = pin!(body.eventsource());
    let mut aggregator = AnswerAggregator::default();

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| DifyError::StreamError(e.to_string()))?;
        for line in event.data.lines().filter(|l| !l.trim().is_empty()) {
            aggregator.observe(line);
        }
    }

    aggregator.finish()
}

/// Re-emits every upstream chunk as one SSE `data` event, in arrival order.
pub fn rewrap_as_sse<S, E>(body: S) -> impl Stream<Item = Result<Event, E>> + Send + 'static
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    let state = (Box::pin(body), Utf8Carry::default(), false);

    stream::unfold(state, |(mut body, mut carry, done)| async move {
        if done {
            return None;
        }

        loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    let text = carry.push(&chunk);
                    if !text.is_empty() {
                        return Some((Ok(chunk_event(&text)), (body, carry, false)));
                    }
                }
                Some(Err(e)) => return Some((Err(e), (body, carry, true))),
                None => {
                    let rest = carry.flush();
                    if rest.is_empty() {
                        return None;
                    }
                    return Some((Ok(chunk_event(&rest)), (body, carry, true)));
                }
            }
        }
    })
}

// SSE field values cannot hold a bare CR.
fn chunk_event(text: &str) -> Event {
    Event::default().data(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Decodes chunks as UTF-8, holding back a trailing partial code point until
/// the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn push(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let mut text = String::new();

        loop {
            let (valid, invalid) = match std::str::from_utf8(&self.pending) {
                Ok(complete) => {
                    text.push_str(complete);
                    self.pending.clear();
                    return text;
                }
                Err(e) => (e.valid_up_to(), e.error_len()),
            };

            // Only the broken sequence is replaced; a partial code point at
            // the end stays pending.
            let end = match invalid {
                Some(len) => valid + len,
                None => valid,
            };
            text.push_str(&String::from_utf8_lossy(&self.pending[..end]));
            self.pending.drain(..end);

            if invalid.is_none() {
                return text;
            }
        }
    }

    pub fn flush(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, Infallible>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn last_answer_and_conversation_id_win() {
        let body = chunks(&[
            "data: {\"answer\":\"Hello\"}\n\n",
            "data: {\"answer\":\"Hello world\",\"conversation_id\":\"abc123\"}\n\n",
        ]);

        let captured = tokio_test::block_on(collect_answer(body)).unwrap();

        assert_eq!(captured.answer, "Hello world");
        assert_eq!(captured.conversation_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn lines_split_across_chunks_are_reassembled() {
        let body = chunks(&[
            "data: {\"answ",
            "er\":\"joined\",\"conversation",
            "_id\":\"c-1\"}\n",
            "\n",
        ]);

        let captured = tokio_test::block_on(collect_answer(body)).unwrap();

        assert_eq!(captured.answer, "joined");
        assert_eq!(captured.conversation_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn workflow_finished_answer_is_authoritative() {
        let body = chunks(&[
            "data: {\"event\":\"message\",\"answer\":\"partial\",\"conversation_id\":\"c-9\"}\n\n",
            "data: {\"event\":\"workflow_finished\",\"data\":{\"outputs\":{\"answer\":\"▼初稿\\nDraftText\\n▼修正稿\\nFinalText\"}}}\n\n",
            "data: {\"event\":\"message\",\"answer\":\"late partial\"}\n\n",
        ]);

        let captured = tokio_test::block_on(collect_answer(body)).unwrap();

        assert_eq!(captured.answer, "▼初稿\nDraftText\n▼修正稿\nFinalText");
        assert_eq!(captured.conversation_id.as_deref(), Some("c-9"));
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let body = chunks(&[
            "data: not json\n\n",
            "event: ping\n\n",
            "data: {\"answer\":\"ok\"}\n\n",
        ]);

        let captured = tokio_test::block_on(collect_answer(body)).unwrap();

        assert_eq!(captured.answer, "ok");
    }

    #[test]
    fn empty_stream_reports_conversation_id() {
        let body = chunks(&["data: {\"event\":\"message_end\",\"conversation_id\":\"c-2\"}\n\n"]);

        let err = tokio_test::block_on(collect_answer(body)).unwrap_err();

        match err {
            DifyError::EmptyAnswer { conversation_id } => {
                assert_eq!(conversation_id.as_deref(), Some("c-2"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn error_event_fails_the_stream() {
        let mut aggregator = AnswerAggregator::default();
        aggregator.observe(r#"{"answer":"half"}"#);
        aggregator.observe(r#"{"event":"error","message":"quota exceeded","conversation_id":"c-3"}"#);

        match aggregator.finish() {
            Err(DifyError::UpstreamEvent {
                message,
                conversation_id,
            }) => {
                assert_eq!(message, "quota exceeded");
                assert_eq!(conversation_id.as_deref(), Some("c-3"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn carry_holds_split_code_points() {
        let bytes = "初稿".as_bytes();
        let mut carry = Utf8Carry::default();

        assert_eq!(carry.push(&bytes[..2]), "");
        assert_eq!(carry.push(&bytes[2..4]), "初");
        assert_eq!(carry.push(&bytes[4..]), "稿");
        assert_eq!(carry.flush(), "");
    }

    #[test]
    fn carry_replaces_only_the_broken_bytes() {
        let bytes = "初".as_bytes();
        let mut chunk = vec![0xFF, b'a'];
        chunk.extend_from_slice(&bytes[..2]);
        let mut carry = Utf8Carry::default();

        assert_eq!(carry.push(&chunk), "\u{FFFD}a");
        assert_eq!(carry.push(&bytes[2..]), "初");
        assert_eq!(carry.flush(), "");
    }

    #[test]
    fn unterminated_final_line_is_kept() {
        let body = chunks(&["data: {\"answer\":\"x\",\"conversation_id\":\"c\"}\n"]);

        let captured = tokio_test::block_on(collect_answer(body)).unwrap();

        assert_eq!(captured.answer, "x");
        assert_eq!(captured.conversation_id.as_deref(), Some("c"));
    }

    #[test]
    fn adjacent_data_lines_are_read_separately() {
        let body = chunks(&[
            "data: {\"answer\":\"Hello\"}\ndata: {\"answer\":\"Hello world\",\"conversation_id\":\"abc123\"}\n\n",
        ]);

        let captured = tokio_test::block_on(collect_answer(body)).unwrap();

        assert_eq!(captured.answer, "Hello world");
        assert_eq!(captured.conversation_id.as_deref(), Some("abc123"));
    }

    fn raw_chunks(parts: Vec<Vec<u8>>) -> impl Stream<Item = Result<Bytes, Infallible>> {
        stream::iter(parts.into_iter().map(|p| Ok(Bytes::from(p))).collect::<Vec<_>>())
    }

    /// Data payload of each event in a rendered SSE body.
    fn event_payloads(body: &str) -> Vec<String> {
        body.split("\n\n")
            .filter(|block| !block.is_empty())
            .map(|block| {
                block
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(|value| value.strip_prefix(' ').unwrap_or(value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect()
    }

    #[test]
    fn rewrap_emits_one_event_per_chunk() {
        use axum::response::{IntoResponse, Sse};

        let draft = "data: {\"answer\":\"初稿\"}\r\n".as_bytes().to_vec();
        let split = draft.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let body = raw_chunks(vec![
            b"data: {\"answer\":\"a\"}\r\n".to_vec(),
            draft[..split].to_vec(),
            draft[split..].to_vec(),
            b"end\rline".to_vec(),
        ]);

        let response = Sse::new(rewrap_as_sse(body)).into_response();
        let rendered =
            tokio_test::block_on(axum::body::to_bytes(response.into_body(), usize::MAX)).unwrap();
        let rendered = String::from_utf8(rendered.to_vec()).unwrap();

        assert_eq!(
            event_payloads(&rendered),
            vec![
                "data: {\"answer\":\"a\"}\n".to_string(),
                "data: {\"answer\":\"".to_string(),
                "初稿\"}\n".to_string(),
                "end\nline".to_string(),
            ]
        );
        assert!(!rendered.contains('\r'));
    }
}
