use std::pin::Pin;

use async_openai::{config::OpenAIConfig, error::OpenAIError, types::CreateCompletionRequestArgs, Client};
use async_trait::async_trait;
use cacheburn_core::{CacheBurnError, Result};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

/// Fragments of one streamed completion. `None` marks a chunk that carried
/// no text (keep-alives, usage-only chunks).
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<Option<String>>> + Send>>;

/// Anything that can stream a completion for a prompt.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_completion(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<FragmentStream>;
}

fn stream_err(e: OpenAIError) -> CacheBurnError {
    match e {
        OpenAIError::Reqwest(e) if e.is_connect() => CacheBurnError::Connection(e.to_string()),
        other => CacheBurnError::Stream(other.to_string()),
    }
}

/// Streaming `/completions` client for OpenAI-compatible servers.
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    /// `endpoint` is a normalized base ending in `/v1/`.
    pub fn new(endpoint: &str, api_key: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(endpoint.trim_end_matches('/'))
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn stream_completion(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<FragmentStream> {
        let request = CreateCompletionRequestArgs::default()
            .model(model)
            .prompt(prompt)
            .max_tokens(max_tokens)
            .stream(true)
            .build()
            .map_err(|e| CacheBurnError::Config(e.to_string()))?;

        let stream = self
            .client
            .completions()
            .create_stream(request)
            .await
            .map_err(stream_err)?;

        let fragments = stream.map(|chunk| {
            chunk
                .map(|response| response.choices.into_iter().next().map(|c| c.text))
                .map_err(stream_err)
        });

        Ok(Box::pin(fragments))
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// List the model ids served at `endpoint` (`GET <endpoint>models`).
pub async fn list_models(endpoint: &str, api_key: &str) -> Result<Vec<String>> {
    let url = format!("{}models", endpoint);
    debug!("Listing models at {}", url);

    let resp = reqwest::Client::new()
        .get(&url)
        .bearer_auth(api_key)
        .send()
        .await
        .map_err(|e| match e.is_connect() || e.is_timeout() {
            true => CacheBurnError::Connection(e.to_string()),
            false => CacheBurnError::Http(e.to_string()),
        })?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        return Err(CacheBurnError::Http(format!(
            "Failed to list models: {} - {}",
            status,
            body.chars().take(500).collect::<String>()
        )));
    }

    let models: ModelsResponse = resp
        .json()
        .await
        .map_err(|e| CacheBurnError::Http(e.to_string()))?;

    Ok(models.data.into_iter().map(|m| m.id).collect())
}

/// The model currently loaded behind `endpoint`: the first one it lists.
pub async fn discover_model(endpoint: &str, api_key: &str) -> Result<String> {
    let model = list_models(endpoint, api_key)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| CacheBurnError::ModelNotFound(format!("{} serves no models", endpoint)))?;

    info!("found model: {}", model);
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_models_response_parses_openai_shape() {
        let body = r#"{"object":"list","data":[
            {"id":"meta-llama/Llama-3.1-8B-Instruct","object":"model","owned_by":"vllm"},
            {"id":"lora-adapter","object":"model"}
        ]}"#;
        let parsed: ModelsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0].id, "meta-llama/Llama-3.1-8B-Instruct");
    }
}
