//! Text-completion capability backing the LLM translator and classifier.
//!
//! The crate only needs "prompt in, text out". Tests plug in canned models;
//! the `ollama` feature adds a client for a local Ollama deployment.

use async_trait::async_trait;

use crate::error::ModelError;

#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Complete `prompt`, returning the raw answer text
    async fn complete(&self, prompt: &str) -> Result<String, ModelError>;
}

#[async_trait]
impl<M: CompletionModel + ?Sized> CompletionModel for std::sync::Arc<M> {
    async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
        (**self).complete(prompt).await
    }
}

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaModel};

#[cfg(feature = "ollama")]
mod ollama {
    use std::time::Duration;

    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};

    use super::CompletionModel;
    use crate::error::ModelError;

    const DEFAULT_URL: &str = "http://localhost:11434";
    const DEFAULT_MODEL: &str = "llama3.1";

    /// Connection settings for an Ollama server
    #[derive(Clone, Debug)]
    pub struct OllamaConfig {
        pub base_url: String,
        pub model: String,
        pub timeout: Duration,
    }

    impl Default for OllamaConfig {
        fn default() -> Self {
            Self {
                base_url: DEFAULT_URL.to_string(),
                model: DEFAULT_MODEL.to_string(),
                timeout: Duration::from_secs(120),
            }
        }
    }

    impl OllamaConfig {
        /// Read `SIFT_OLLAMA_URL` and `SIFT_OLLAMA_MODEL`, falling back to defaults
        pub fn from_env() -> Self {
            let defaults = Self::default();
            Self {
                base_url: std::env::var("SIFT_OLLAMA_URL").unwrap_or(defaults.base_url),
                model: std::env::var("SIFT_OLLAMA_MODEL").unwrap_or(defaults.model),
                timeout: defaults.timeout,
            }
        }
    }

    #[derive(Serialize)]
    struct GenerateRequest<'a> {
        model: &'a str,
        prompt: &'a str,
        stream: bool,
    }

    #[derive(Deserialize)]
    struct GenerateResponse {
        response: String,
    }

    /// [`CompletionModel`] talking to `POST /api/generate`
    pub struct OllamaModel {
        client: reqwest::Client,
        config: OllamaConfig,
    }

    impl OllamaModel {
        pub fn new(config: OllamaConfig) -> Result<Self, ModelError> {
            let client = reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| ModelError::Request(e.to_string()))?;
            Ok(Self { client, config })
        }

        fn url(&self) -> String {
            format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
        }
    }

    #[async_trait]
    impl CompletionModel for OllamaModel {
        async fn complete(&self, prompt: &str) -> Result<String, ModelError> {
            let request = GenerateRequest {
                model: &self.config.model,
                prompt,
                stream: false,
            };
            let response = self
                .client
                .post(self.url())
                .json(&request)
                .send()
                .await
                .map_err(|e| ModelError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ModelError::Status {
                    status: status.as_u16(),
                    message,
                });
            }

            let body: GenerateResponse = response
                .json()
                .await
                .map_err(|e| ModelError::Response(e.to_string()))?;
            Ok(body.response)
        }
    }
}
