mod error;
mod openai;
pub mod provider;

pub use error::ApiError;
pub use openai::OpenAIClient;
pub use provider::{CompletionResponse, Provider};

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::conversation::Message;
use datapilot_tools::ToolSchema;

const MAX_BACKOFF_SECS: u64 = 30;

/// Thin wrapper over a [`Provider`] adding retry with capped exponential
/// backoff. Transport failures that survive the retries are fatal to the
/// caller.
#[derive(Clone)]
pub struct Client {
    provider: Arc<dyn Provider>,
}

impl Client {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }

    pub fn from_config(config: &Config) -> Result<Self, ApiError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ApiError::Configuration("OPENAI_API_KEY is not set".to_string()))?;
        let provider = OpenAIClient::new(config.model.clone(), api_key, config.base_url.clone());
        Ok(Self::new(Arc::new(provider)))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn complete_with_retry(
        &self,
        messages: &[Message],
        system_prompt: &Option<String>,
        tools: &Option<Vec<ToolSchema>>,
        token: CancellationToken,
        max_attempts: usize,
    ) -> Result<CompletionResponse, ApiError> {
        let mut attempts = 0;

        loop {
            if token.is_cancelled() {
                return Err(ApiError::Cancelled {
                    provider: self.provider.name().to_string(),
                });
            }

            debug!(
                target: "api::complete_with_retry",
                attempt = attempts + 1,
                "requesting completion"
            );

            match self
                .provider
                .complete(
                    messages.to_vec(),
                    system_prompt.clone(),
                    tools.clone(),
                    token.clone(),
                )
                .await
            {
                Ok(response) => return Ok(response),
                Err(error) => {
                    attempts += 1;
                    warn!(
                        "API completion attempt {}/{} failed: {:?}",
                        attempts, max_attempts, error
                    );

                    if attempts >= max_attempts || !error.is_retryable() {
                        return Err(error);
                    }

                    let backoff =
                        Duration::from_secs((1_u64 << (attempts - 1)).min(MAX_BACKOFF_SECS));
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
                    tokio::select! {
                        () = token.cancelled() => {
                            return Err(ApiError::Cancelled {
                                provider: self.provider.name().to_string(),
                            });
                        }
                        () = tokio::time::sleep(backoff + jitter) => {}
                    }
                }
            }
        }
    }
}
