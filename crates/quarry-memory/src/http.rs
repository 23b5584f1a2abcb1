use crate::embedding::EmbeddingProvider;
use crate::usage::UsageTracker;
use async_trait::async_trait;
use quarry_core::{ensure_dimension, EmbeddingConfig, QuarryError, QuarryResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

/// Client for OpenAI-compatible `/v1/embeddings` endpoints.
///
/// Makes a single attempt per call; wrap it in
/// [`crate::RetryingEmbedder`] for backoff. Transport failures surface as
/// [`QuarryError::Http`] with the status code or `timeout` / `connection`
/// in the message.
pub struct HttpEmbedding {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: usize,
    usage: Arc<UsageTracker>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
    #[serde(default)]
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Leads every non-success response error, followed by the status code.
pub(crate) const API_ERROR_PREFIX: &str = "embeddings API error ";

impl HttpEmbedding {
    /// Client for the endpoint and model in `config`, recording into `usage`.
    pub fn new(config: &EmbeddingConfig, usage: Arc<UsageTracker>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            dimension: config.dimension,
            usage,
        }
    }

    /// Tracker this client records into.
    pub fn usage(&self) -> &Arc<UsageTracker> {
        &self.usage
    }

    fn transport_error(e: reqwest::Error) -> QuarryError {
        if e.is_timeout() {
            QuarryError::Http(format!("timeout calling embeddings API: {e}"))
        } else if e.is_connect() {
            QuarryError::Http(format!("connection error calling embeddings API: {e}"))
        } else {
            QuarryError::Http(e.to_string())
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbedding {
    async fn embed(&self, text: &str) -> QuarryResult<Vec<f32>> {
        self.embed_batch(&[text])
            .await?
            .pop()
            .ok_or_else(|| QuarryError::Provider("embeddings API returned no data".to_string()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> QuarryResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(Self::transport_error)?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(QuarryError::Http(format!(
                "{API_ERROR_PREFIX}{status}: {detail}"
            )));
        }

        let parsed: EmbeddingResponse = resp.json().await.map_err(Self::transport_error)?;
        if parsed.data.len() != texts.len() {
            return Err(QuarryError::Provider(format!(
                "embeddings API returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            )));
        }

        let mut data = parsed.data;
        data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();
        for v in &vectors {
            ensure_dimension(self.dimension, v.len())?;
        }

        let (prompt, total) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.total_tokens))
            .unwrap_or((0, 0));
        self.usage.record(texts.len() as u64, prompt, total);
        debug!(
            model = %self.model,
            inputs = texts.len(),
            total_tokens = total,
            "Embedded batch"
        );

        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
