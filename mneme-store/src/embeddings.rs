use serde::Deserialize;

use mneme_core::EmbeddingSettings;

use crate::errors::{StoreError, StoreResult};

/// Client for an Ollama-compatible embedding endpoint. Every failure mode
/// here (network, HTTP status, malformed body) surfaces as
/// `BackendUnavailable` so the orchestrator can stop the run immediately
/// instead of failing document by document.
#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> StoreResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest {
            model: self.model.clone(),
            input: inputs.to_vec(),
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::BackendUnavailable(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StoreError::BackendUnavailable(format!(
                "embedding request failed: {status} {text}"
            )));
        }

        let payload: EmbedResponse = response.json().await.map_err(|e| {
            StoreError::BackendUnavailable(format!("bad embedding response: {e}"))
        })?;

        if let Some(embeddings) = payload.embeddings {
            if embeddings.len() != inputs.len() {
                return Err(StoreError::BackendUnavailable(format!(
                    "asked for {} embeddings, got {}",
                    inputs.len(),
                    embeddings.len()
                )));
            }
            return Ok(embeddings);
        }

        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(StoreError::BackendUnavailable(
            "embedding response missing vectors".to_string(),
        ))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_backend_is_backend_unavailable() {
        let settings = EmbeddingSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let client = EmbeddingClient::new(&settings);

        match client.embed_batch(&["hello".to_string()]).await {
            Err(StoreError::BackendUnavailable(_)) => {}
            other => panic!("expected BackendUnavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_batch_never_hits_the_network() {
        let settings = EmbeddingSettings {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let client = EmbeddingClient::new(&settings);
        assert!(client.embed_batch(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_trailing_slash_is_trimmed() {
        let settings = EmbeddingSettings {
            base_url: "http://localhost:11434/".to_string(),
            ..Default::default()
        };
        let client = EmbeddingClient::new(&settings);
        assert_eq!(client.base_url, "http://localhost:11434");
    }
}
