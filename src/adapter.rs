//! Streaming adapter between the conversation UI and the upstream
//! text-generation service.
//!
//! The adapter either talks to the live upstream endpoint or serves a
//! deterministic mock reply, chosen by configuration. Either way it feeds
//! decoded text fragments through an event channel as they arrive and settles
//! with a final assistant message.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatMessage, HistoryMessage, trim_chat_history};
use crate::config::{Config, Language};
use crate::events::AssistantEvent;

/// In-band marker: the trailing text is an upstream error, not content.
pub const STREAM_ERROR_MARKER: &str = "[STREAM_ERROR]";

/// In-band marker: the trailing text substitutes the reply.
pub const STREAM_FALLBACK_MARKER: &str = "[STREAM_FALLBACK]";

/// Substitute reply when a fallback marker arrives with nothing after it.
/// The upstream emits this sentence in the product's home language.
pub const CANNED_FALLBACK: &str =
    "Desculpe, não consegui gerar uma resposta agora. Tente novamente em instantes.";

const DEFAULT_STREAM_ERROR: &str = "Assistant streaming error";

// Chat-template artifacts the upstream model occasionally leaks.
static SENTINEL_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?s>").expect("valid regex"));
static ROLE_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[/?(ASS|ASSISTANT|SYS|SYSTEM|USR|USER|INST)\]").expect("valid regex")
});

/// Failure taxonomy of an assistant request.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The caller's cancellation signal fired; discard, do not display.
    #[error("request cancelled")]
    Cancelled,

    #[error("upstream returned status {0}")]
    UpstreamStatus(StatusCode),

    /// The response carried no streamable body.
    #[error("assistant response stream is not available")]
    StreamUnavailable,

    #[error("assistant response payload is empty")]
    EmptyPayload,

    /// An in-band error marker surfaced this message.
    #[error("{0}")]
    Stream(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AdapterError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, AdapterError::Cancelled)
    }
}

/// A single submission handed to the adapter.
#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub prompt: String,
    pub language: Language,
    pub history: Vec<HistoryMessage>,
}

/// Wire payload of the streaming chat endpoint.
#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    message: &'a str,
    lang: &'a str,
    history: &'a [HistoryMessage],
}

/// Client for assistant responses, streaming them over an event channel.
#[derive(Clone)]
pub struct AssistantAdapter {
    config: Arc<Config>,
    client: reqwest::Client,
}

impl AssistantAdapter {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { config, client })
    }

    /// Start a request on a background task and return its event stream.
    ///
    /// Fragments arrive as `Delta` events in stream order, terminated by a
    /// single `Completed` or `Failed`. Dropping the receiver detaches the
    /// task; cancelling the token makes it settle with
    /// [`AdapterError::Cancelled`].
    pub fn spawn_request(
        &self,
        request: AssistantRequest,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<AssistantEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = self.clone();
        tokio::spawn(async move {
            let outcome = adapter.respond(&request, &cancel, &tx).await;
            let _ = match outcome {
                Ok(message) => tx.send(AssistantEvent::Completed(message)),
                Err(error) => tx.send(AssistantEvent::Failed(error)),
            };
        });
        rx
    }

    /// Resolve a request to a completed assistant message.
    ///
    /// A live-path failure other than cancellation falls back to the mock
    /// path instead of propagating, keeping the widget responsive when the
    /// upstream misbehaves.
    pub async fn respond(
        &self,
        request: &AssistantRequest,
        cancel: &CancellationToken,
        chunks: &mpsc::UnboundedSender<AssistantEvent>,
    ) -> Result<ChatMessage, AdapterError> {
        if self.config.use_mock_adapter() {
            return self.mock_response(request, cancel, chunks).await;
        }

        match self.live_response(request, cancel, chunks).await {
            Ok(message) => Ok(message),
            Err(AdapterError::Cancelled) => Err(AdapterError::Cancelled),
            Err(error) => {
                log::warn!("live assistant request failed, falling back to mock: {error}");
                self.mock_response(request, cancel, chunks).await
            }
        }
    }

    async fn mock_response(
        &self,
        request: &AssistantRequest,
        cancel: &CancellationToken,
        chunks: &mpsc::UnboundedSender<AssistantEvent>,
    ) -> Result<ChatMessage, AdapterError> {
        wait_for(self.config.mock_delay, cancel).await?;

        let content = mock_reply(&request.prompt, request.language);
        let _ = chunks.send(AssistantEvent::Delta(content.clone()));
        Ok(ChatMessage::assistant(content))
    }

    async fn live_response(
        &self,
        request: &AssistantRequest,
        cancel: &CancellationToken,
        chunks: &mpsc::UnboundedSender<AssistantEvent>,
    ) -> Result<ChatMessage, AdapterError> {
        let endpoint = self
            .config
            .chat_endpoint()
            .ok_or(AdapterError::StreamUnavailable)?;
        let history = trim_chat_history(&request.history, self.config.history_turns);
        let payload = ChatPayload {
            message: &request.prompt,
            lang: request.language.code(),
            history: &history,
        };

        let mut builder = self.client.post(&endpoint).json(&payload);
        if let Some(key) = &self.config.upstream_api_key {
            builder = builder.header("x-api-key", key);
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
            result = builder.send() => result?,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::UpstreamStatus(status));
        }
        if response.content_length() == Some(0) {
            return Err(AdapterError::StreamUnavailable);
        }

        let raw = consume_stream(response.bytes_stream(), cancel, chunks).await?;
        finalize_stream_text(&raw).map(ChatMessage::assistant)
    }
}

/// Deterministic templated reply of the mock path.
pub fn mock_reply(prompt: &str, language: Language) -> String {
    match language {
        Language::EnUs => {
            format!("Mocked response for \"{prompt}\". We will connect to the real AI model soon.")
        }
        Language::PtBr => format!(
            "Resposta mockada para \"{prompt}\". Em breve, conectaremos com o modelo de IA real."
        ),
    }
}

/// Cancellable sleep used to simulate mock latency.
async fn wait_for(delay: Duration, cancel: &CancellationToken) -> Result<(), AdapterError> {
    if cancel.is_cancelled() {
        return Err(AdapterError::Cancelled);
    }
    if delay.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Drain a byte stream into text, emitting each decoded fragment as a
/// `Delta` event in arrival order. Multi-byte sequences split across reads
/// are held back until complete and the decoder is flushed at end of stream.
async fn consume_stream<S, B>(
    mut stream: S,
    cancel: &CancellationToken,
    chunks: &mpsc::UnboundedSender<AssistantEvent>,
) -> Result<String, AdapterError>
where
    S: Stream<Item = reqwest::Result<B>> + Unpin,
    B: AsRef<[u8]>,
{
    let mut decoder = Utf8Decoder::default();
    let mut assembled = String::new();

    loop {
        if cancel.is_cancelled() {
            return Err(AdapterError::Cancelled);
        }
        let next = tokio::select! {
            _ = cancel.cancelled() => return Err(AdapterError::Cancelled),
            next = stream.next() => next,
        };
        let Some(bytes) = next.transpose()? else {
            break;
        };

        let text = decoder.decode(bytes.as_ref());
        if !text.is_empty() {
            assembled.push_str(&text);
            let _ = chunks.send(AssistantEvent::Delta(text));
        }
    }

    let tail = decoder.flush();
    if !tail.is_empty() {
        assembled.push_str(&tail);
        let _ = chunks.send(AssistantEvent::Delta(tail));
    }

    Ok(assembled)
}

/// Incremental UTF-8 decoder carrying incomplete sequences between reads.
#[derive(Debug, Default)]
struct Utf8Decoder {
    carry: Vec<u8>,
}

impl Utf8Decoder {
    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buffer = std::mem::take(&mut self.carry);
        buffer.extend_from_slice(bytes);

        let mut out = String::new();
        let mut rest: &[u8] = &buffer;
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(error) => {
                    let valid = error.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match error.error_len() {
                        Some(invalid) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &rest[valid + invalid..];
                        }
                        None => {
                            // Incomplete sequence at the end of this read.
                            rest = &rest[valid..];
                            break;
                        }
                    }
                }
            }
        }

        self.carry = rest.to_vec();
        out
    }

    /// Emit whatever is still buffered at end of stream.
    fn flush(&mut self) -> String {
        if self.carry.is_empty() {
            return String::new();
        }
        let carry = std::mem::take(&mut self.carry);
        String::from_utf8_lossy(&carry).into_owned()
    }
}

/// Interpret in-band markers and strip template artifacts from the
/// assembled stream text.
fn finalize_stream_text(raw: &str) -> Result<String, AdapterError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(AdapterError::EmptyPayload);
    }

    if let Some((_, tail)) = text.rsplit_once(STREAM_ERROR_MARKER) {
        let message = tail.trim();
        return Err(AdapterError::Stream(if message.is_empty() {
            DEFAULT_STREAM_ERROR.to_string()
        } else {
            message.to_string()
        }));
    }

    if let Some((_, tail)) = text.rsplit_once(STREAM_FALLBACK_MARKER) {
        let message = tail.trim();
        return Ok(if message.is_empty() {
            CANNED_FALLBACK.to_string()
        } else {
            message.to_string()
        });
    }

    Ok(sanitize_reply(text))
}

/// Strip role-delimiter tags, unless that would leave nothing.
fn sanitize_reply(text: &str) -> String {
    let stripped = SENTINEL_TAGS.replace_all(text, "");
    let stripped = ROLE_TAGS.replace_all(&stripped, "");
    let cleaned = stripped.trim();
    if cleaned.is_empty() {
        text.to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn mock_config(delay_ms: u64) -> Arc<Config> {
        Arc::new(Config {
            mock_delay: Duration::from_millis(delay_ms),
            ..Config::default()
        })
    }

    fn request(prompt: &str, language: Language) -> AssistantRequest {
        AssistantRequest {
            prompt: prompt.to_string(),
            language,
            history: Vec::new(),
        }
    }

    #[test]
    fn mock_reply_is_templated_per_language() {
        assert_eq!(
            mock_reply("Olá", Language::PtBr),
            "Resposta mockada para \"Olá\". Em breve, conectaremos com o modelo de IA real."
        );
        assert_eq!(
            mock_reply("Hi", Language::EnUs),
            "Mocked response for \"Hi\". We will connect to the real AI model soon."
        );
    }

    #[tokio::test]
    async fn mock_path_streams_and_settles_after_delay() {
        let adapter = AssistantAdapter::new(mock_config(25)).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let started = Instant::now();
        let message = adapter
            .respond(&request("Olá", Language::PtBr), &cancel, &tx)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(25));
        assert_eq!(
            message.content,
            "Resposta mockada para \"Olá\". Em breve, conectaremos com o modelo de IA real."
        );

        match rx.try_recv().unwrap() {
            AssistantEvent::Delta(delta) => assert_eq!(delta, message.content),
            other => panic!("expected delta, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn mock_path_rejects_when_already_cancelled() {
        let adapter = AssistantAdapter::new(mock_config(1000)).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = adapter
            .respond(&request("Olá", Language::PtBr), &cancel, &tx)
            .await
            .unwrap_err();
        assert!(error.is_cancelled());
    }

    #[tokio::test]
    async fn mock_path_rejects_when_cancelled_mid_wait() {
        let adapter = AssistantAdapter::new(mock_config(5000)).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let error = adapter
            .respond(&request("Olá", Language::PtBr), &cancel, &tx)
            .await
            .unwrap_err();
        assert!(error.is_cancelled());
    }

    #[tokio::test]
    async fn spawned_request_terminates_with_completed() {
        let adapter = AssistantAdapter::new(mock_config(1)).unwrap();
        let mut rx = adapter.spawn_request(
            request("Tudo bem?", Language::PtBr),
            CancellationToken::new(),
        );

        let mut deltas = String::new();
        loop {
            match rx.recv().await.expect("event stream closed early") {
                AssistantEvent::Delta(delta) => deltas.push_str(&delta),
                AssistantEvent::Completed(message) => {
                    assert_eq!(message.content, deltas);
                    break;
                }
                AssistantEvent::Failed(error) => panic!("unexpected failure: {error}"),
            }
        }
    }

    #[tokio::test]
    async fn stream_decoding_preserves_split_multibyte_sequences() {
        // "Olá, tudo bem?" with "á" (0xC3 0xA1) split across two reads.
        let bytes = "Olá, tudo bem?".as_bytes();
        let reads = vec![
            Ok::<_, reqwest::Error>(bytes[..3].to_vec()),
            Ok(bytes[3..8].to_vec()),
            Ok(bytes[8..].to_vec()),
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();

        let assembled = consume_stream(
            futures::stream::iter(reads),
            &CancellationToken::new(),
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(assembled, "Olá, tudo bem?");

        let mut deltas = Vec::new();
        while let Ok(AssistantEvent::Delta(delta)) = rx.try_recv() {
            deltas.push(delta);
        }
        assert_eq!(deltas.concat(), "Olá, tudo bem?");
        // The first read ends mid-sequence, so its delta stops before the "á".
        assert_eq!(deltas[0], "Ol");
    }

    #[tokio::test]
    async fn stream_decoding_flushes_trailing_bytes() {
        // Stream ends with a dangling continuation-start byte.
        let reads = vec![Ok::<_, reqwest::Error>(vec![b'o', b'i', 0xC3])];
        let (tx, _rx) = mpsc::unbounded_channel();

        let assembled = consume_stream(
            futures::stream::iter(reads),
            &CancellationToken::new(),
            &tx,
        )
        .await
        .unwrap();

        assert_eq!(assembled, format!("oi{}", char::REPLACEMENT_CHARACTER));
    }

    #[tokio::test]
    async fn stream_consumption_honors_cancellation() {
        let reads = vec![Ok::<_, reqwest::Error>(b"never read".to_vec())];
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let error = consume_stream(futures::stream::iter(reads), &cancel, &tx)
            .await
            .unwrap_err();
        assert!(error.is_cancelled());
    }

    #[test]
    fn empty_payload_is_an_error() {
        assert!(matches!(
            finalize_stream_text("   \n"),
            Err(AdapterError::EmptyPayload)
        ));
    }

    #[test]
    fn error_marker_fails_with_trailing_text() {
        let error = finalize_stream_text("...text[STREAM_ERROR] boom").unwrap_err();
        match error {
            AdapterError::Stream(message) => assert_eq!(message, "boom"),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[test]
    fn error_marker_without_text_uses_default_message() {
        let error = finalize_stream_text("oops[STREAM_ERROR]").unwrap_err();
        match error {
            AdapterError::Stream(message) => assert_eq!(message, DEFAULT_STREAM_ERROR),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[test]
    fn fallback_marker_substitutes_trailing_text() {
        assert_eq!(
            finalize_stream_text("[STREAM_FALLBACK] sorry").unwrap(),
            "sorry"
        );
    }

    #[test]
    fn fallback_marker_without_text_uses_canned_reply() {
        assert_eq!(
            finalize_stream_text("[STREAM_FALLBACK]   ").unwrap(),
            CANNED_FALLBACK
        );
    }

    #[test]
    fn template_artifacts_are_stripped() {
        assert_eq!(
            finalize_stream_text("<s>[INST] Oi, sou o Stanley. [/INST]</s>").unwrap(),
            "Oi, sou o Stanley."
        );
        assert_eq!(
            finalize_stream_text("[ASSISTANT]Resposta[/ASSISTANT]").unwrap(),
            "Resposta"
        );
    }

    #[test]
    fn sanitizing_never_returns_an_empty_reply() {
        // Artifacts only: stripping would empty the text, so it is returned
        // untouched.
        assert_eq!(finalize_stream_text("<s>[INST]</s>").unwrap(), "<s>[INST]</s>");
    }
}
