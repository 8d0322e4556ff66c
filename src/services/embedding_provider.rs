use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::EmbeddingConfig;

/// Source of subject embeddings. Implementations must return vectors of one fixed
/// length for the lifetime of a deployment.
#[axum::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, subject: &str) -> Result<Vec<f64>, EmbeddingError>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding request timed out")]
    Timeout,
    #[error("embedding network error: {0}")]
    Network(String),
    #[error("embedding api error: status={status}, message={message}")]
    Api { status: u16, message: String },
    #[error("embedding provider returned an invalid vector: {0}")]
    InvalidVector(String),
}

/// Build the provider selected by configuration.
pub fn from_config(config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider> {
    if config.mock {
        Arc::new(MockEmbeddingProvider::new(config.dimension))
    } else {
        Arc::new(HttpEmbeddingProvider::new(config))
    }
}

/// Reject configurations that cannot produce embeddings. Called once at startup.
pub fn validate_config(config: &EmbeddingConfig) {
    if !config.mock && config.api_url.trim().is_empty() {
        panic!(
            "Invalid embedding configuration: EMBEDDING_MOCK=false requires EMBEDDING_API_URL. \
             Set EMBEDDING_API_URL or EMBEDDING_MOCK=true."
        );
    }
    if config.mock && config.dimension == 0 {
        panic!("Invalid embedding configuration: EMBEDDING_DIMENSION must be positive");
    }
}

fn check_vector(vector: &[f64]) -> Result<(), EmbeddingError> {
    if vector.is_empty() {
        return Err(EmbeddingError::InvalidVector("empty vector".to_string()));
    }
    if let Some(idx) = vector.iter().position(|v| !v.is_finite()) {
        return Err(EmbeddingError::InvalidVector(format!(
            "non-finite component at index {idx}"
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    subject: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f64>,
}

/// Calls the remote `embed-subjects` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    config: EmbeddingConfig,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }
}

#[axum::async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, subject: &str) -> Result<Vec<f64>, EmbeddingError> {
        let mut request = self
            .client
            .post(&self.config.api_url)
            .json(&EmbedRequest { subject });
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout
            } else {
                EmbeddingError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: EmbedResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                EmbeddingError::Timeout
            } else {
                EmbeddingError::InvalidVector(e.to_string())
            }
        })?;
        check_vector(&body.embedding)?;
        tracing::debug!(subject, dimension = body.embedding.len(), "Fetched subject embedding");
        Ok(body.embedding)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Deterministic offline provider: components are derived from the SHA-256 of
/// the subject name and scaled into `[-1, 1]`.
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    pub fn vector_for(&self, subject: &str) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.dimension);
        let mut block = 0u32;
        while out.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(subject.as_bytes());
            hasher.update(block.to_be_bytes());
            for byte in hasher.finalize() {
                if out.len() == self.dimension {
                    break;
                }
                out.push(f64::from(byte) / 127.5 - 1.0);
            }
            block += 1;
        }
        out
    }
}

#[axum::async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, subject: &str) -> Result<Vec<f64>, EmbeddingError> {
        Ok(self.vector_for(subject))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
