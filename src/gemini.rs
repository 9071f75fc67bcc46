use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::config::ModelConfig;
use crate::error::UpstreamError;
use crate::generator::{ChunkStream, ContentGenerator};
use crate::request::Request;

/// Streams answers from the Gemini `streamGenerateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    config: ModelConfig,
}

impl GeminiClient {
    pub fn new(api_key: String, config: ModelConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("harvest-interpreter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    fn stream_url(&self) -> String {
        let model = self.config.name.trim();
        let model_path = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.config.endpoint.trim_end_matches('/'),
            model_path
        )
    }

    fn build_body(&self, request: &Request) -> Value {
        let mut parts: Vec<Value> = request
            .images()
            .iter()
            .map(|image| {
                json!({
                    "inlineData": {
                        "mimeType": image.mime_type,
                        "data": BASE64.encode(&image.data),
                    }
                })
            })
            .collect();
        parts.push(json!({ "text": request.prompt() }));

        json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": self.config.temperature },
        })
    }
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    fn name(&self) -> String {
        format!("gemini:{}", self.config.name)
    }

    async fn generate_stream(&self, request: &Request) -> Result<ChunkStream, UpstreamError> {
        let url = self.stream_url();
        info!(
            "Submitting request to {} with {} images",
            self.config.name,
            request.images().len()
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body = api_error_message(&body).unwrap_or(body);
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let (chunk_tx, chunk_rx) = mpsc::channel(16);
        tokio::spawn(pump_events(response.bytes_stream(), chunk_tx));

        Ok(receiver_stream(chunk_rx))
    }
}

/// Read server-sent events off the response body and forward their text until
/// the body ends, an error is forwarded, or the receiver goes away.
async fn pump_events<S>(body: S, chunk_tx: mpsc::Sender<Result<String, UpstreamError>>)
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    let mut body = std::pin::pin!(body);
    let mut decoder = SseDecoder::default();
    let mut event_count = 0usize;

    loop {
        let next = tokio::select! {
            _ = chunk_tx.closed() => {
                debug!("Chunk receiver dropped after {} events, stopping Gemini stream", event_count);
                return;
            }
            next = body.next() => next,
        };

        let bytes = match next {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => {
                error!("Gemini stream error: {}", e);
                let _ = chunk_tx.send(Err(e.into())).await;
                return;
            }
            None => break,
        };

        for payload in decoder.push(&bytes) {
            event_count += 1;
            if !forward_event(&chunk_tx, &payload).await {
                return;
            }
        }
    }

    if let Some(payload) = decoder.finish() {
        event_count += 1;
        forward_event(&chunk_tx, &payload).await;
    }

    debug!("Gemini stream ended after {} events", event_count);
}

async fn forward_event(
    chunk_tx: &mpsc::Sender<Result<String, UpstreamError>>,
    payload: &str,
) -> bool {
    let item = match chunk_text(payload) {
        Ok(Some(text)) => Ok(text),
        Ok(None) => return true,
        Err(e) => Err(e),
    };
    let keep_going = item.is_ok();

    if chunk_tx.send(item).await.is_err() {
        debug!("Chunk receiver dropped, stopping Gemini stream");
        return false;
    }

    keep_going
}

fn receiver_stream(mut chunk_rx: mpsc::Receiver<Result<String, UpstreamError>>) -> ChunkStream {
    futures::stream::poll_fn(move |cx| chunk_rx.poll_recv(cx)).boxed()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

/// Text carried by one event payload, `None` when it carries no text
fn chunk_text(payload: &str) -> Result<Option<String>, UpstreamError> {
    let response: StreamResponse = serde_json::from_str(payload)?;

    if let Some(err) = response.error {
        return Err(UpstreamError::Api(describe_api_error(err)));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(UpstreamError::Blocked(reason));
        }
        return Ok(None);
    };

    let text: String = candidate
        .content
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|part| part.text)
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        return match candidate.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST")) => {
                Err(UpstreamError::Blocked(reason.to_string()))
            }
            _ => Ok(None),
        };
    }

    Ok(Some(text))
}

fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| describe_api_error(envelope.error))
}

fn describe_api_error(err: ApiError) -> String {
    match (err.status, err.message) {
        (Some(status), Some(message)) => format!("{status}: {message}"),
        (None, Some(message)) => message,
        (Some(status), None) => status,
        (None, None) => "model returned an error without a message".to_string(),
    }
}

/// Incremental decoder for a `text/event-stream` body. Only `data` fields are
/// kept; an event may arrive split over any number of reads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed raw bytes, returning the data of every event completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.take_line(line.trim_end_matches(|c: char| c == '\n' || c == '\r'))
            {
                events.push(event);
            }
        }
        events
    }

    /// Flush whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest);
            if let Some(event) = self.take_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.take_line("")
    }

    fn take_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            let event = self.data.join("\n");
            self.data.clear();
            return Some(event);
        }

        if let Some(rest) = line.strip_prefix("data:") {
            self.data
                .push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
        None
    }
}
