use std::time::Duration;

use async_openai::{config::OpenAIConfig, types::CreateEmbeddingRequestArgs, Client};
use async_trait::async_trait;
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::debug;

use crate::error::AppError;

/// Total request attempts for one embedding call, first try included.
pub const EMBED_MAX_ATTEMPTS: usize = 25;
/// Delay before the first retry; later retries double from here.
pub const EMBED_STARTING_DELAY_MS: u64 = 1000;
/// Ceiling for a single backoff delay.
pub const EMBED_MAX_DELAY_SECS: u64 = 60;

/// Converts text into vector representations via an external provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError>;

    fn model(&self) -> &str;
}

/// OpenAI-backed [`Embedder`] with automatic retry on failed requests.
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let client =
            Client::with_config(OpenAIConfig::new().with_api_key(api_key.into()));

        OpenAiEmbedder {
            client,
            model: model.into(),
        }
    }

    /// Backoff schedule without jitter: starts at
    /// [`EMBED_STARTING_DELAY_MS`] and doubles per retry.
    fn base_backoff() -> ExponentialBackoff {
        ExponentialBackoff::from_millis(2)
            .factor(EMBED_STARTING_DELAY_MS / 2)
            .max_delay(Duration::from_secs(EMBED_MAX_DELAY_SECS))
    }

    fn backoff_schedule() -> impl Iterator<Item = Duration> {
        // take() counts retries; total attempts are one higher.
        Self::base_backoff()
            .map(jitter)
            .take(EMBED_MAX_ATTEMPTS - 1)
    }

    async fn request_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(self.model.clone())
            .input(texts.to_vec())
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        if response.data.len() != texts.len() {
            return Err(AppError::Processing(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                response.data.len()
            )));
        }

        Ok(response
            .data
            .into_iter()
            .map(|item| item.embedding)
            .collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let input = vec![text.to_owned()];
        let embeddings = Retry::spawn(Self::backoff_schedule(), || {
            self.request_embeddings(&input)
        })
        .await?;

        debug!(model = %self.model, "generated embedding");

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Processing("no embedding data received".to_string()))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        Retry::spawn(Self::backoff_schedule(), || self.request_embeddings(&texts)).await
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_starts_at_one_second_and_doubles() {
        let delays: Vec<Duration> = OpenAiEmbedder::base_backoff().take(3).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000)
            ]
        );
    }

    #[test]
    fn backoff_is_capped() {
        let last = OpenAiEmbedder::base_backoff()
            .take(EMBED_MAX_ATTEMPTS - 1)
            .last()
            .expect("schedule is non-empty");
        assert_eq!(last, Duration::from_secs(EMBED_MAX_DELAY_SECS));
    }

    #[test]
    fn schedule_allows_twenty_five_attempts() {
        let retries = OpenAiEmbedder::backoff_schedule().count();
        assert_eq!(retries + 1, EMBED_MAX_ATTEMPTS);
    }

    #[test]
    fn jittered_delays_never_exceed_base() {
        for (jittered, base) in OpenAiEmbedder::backoff_schedule()
            .zip(OpenAiEmbedder::base_backoff())
        {
            assert!(jittered <= base);
        }
    }

    #[test]
    fn embedder_reports_configured_model() {
        let embedder = OpenAiEmbedder::new("test-key", "text-embedding-3-small");
        assert_eq!(embedder.model(), "text-embedding-3-small");
    }
}
