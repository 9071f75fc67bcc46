use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

use crate::error::UpstreamError;
use crate::request::Request;

/// Partial text chunks in arrival order, ending normally or with an error.
pub type ChunkStream = BoxStream<'static, Result<String, UpstreamError>>;

/// A hosted model that answers a request with a stream of text chunks.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Human-readable name used in logs
    fn name(&self) -> String;

    /// Submit the request and return the stream of response chunks
    async fn generate_stream(&self, request: &Request) -> Result<ChunkStream, UpstreamError>;
}

/// Replays canned chunks. Useful offline and in tests.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    chunks: Vec<String>,
    delay: Duration,
    trailing_error: Option<String>,
    connect_error: Option<String>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Wait this long before each chunk
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// End the stream with an error after the last chunk
    pub fn with_trailing_error(mut self, message: impl Into<String>) -> Self {
        self.trailing_error = Some(message.into());
        self
    }

    /// Fail before any chunk is produced
    pub fn with_connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    fn name(&self) -> String {
        "scripted".to_string()
    }

    async fn generate_stream(&self, request: &Request) -> Result<ChunkStream, UpstreamError> {
        if let Some(message) = &self.connect_error {
            return Err(UpstreamError::Other(message.clone()));
        }

        debug!(
            "Replaying {} chunks for a request with {} images",
            self.chunks.len(),
            request.images().len()
        );

        let delay = self.delay;
        let chunks = stream::iter(self.chunks.clone()).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(chunk)
        });
        let tail = stream::iter(
            self.trailing_error
                .clone()
                .map(|message| Err(UpstreamError::Other(message))),
        );

        Ok(chunks.chain(tail).boxed())
    }
}
