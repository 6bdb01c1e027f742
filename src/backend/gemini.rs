use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use genapi::providers::gemini;
use genapi::{ApiStatusError, ImageClient, ImageProvider};

use super::{client_error, not_started, GenerationBackend};
use crate::config::GeminiConfig;
use crate::error::{FatalError, FatalResult, GenerationError};
use crate::models::{GeneratedImage, GenerationOptions, Prompt};

/// Hosted Gemini image model.
#[derive(Debug)]
pub struct GeminiBackend {
    client: ImageClient,
    verified: bool,
}

impl GeminiBackend {
    pub fn new(config: &GeminiConfig, timeout: Duration) -> FatalResult<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                FatalError::MissingCredentials(
                    "a Gemini API key is required (--api-key or GEMINI_API_KEY)".into(),
                )
            })?;

        let model = config.model.trim();
        let model = model.strip_prefix("models/").unwrap_or(model);

        let client = ImageClient::new(
            ImageProvider::Gemini,
            api_key,
            config.endpoint.trim(),
            model,
            Some(timeout),
        )
        .map_err(client_error)?;

        Ok(Self {
            client,
            verified: false,
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn startup(&mut self) -> FatalResult<()> {
        if self.verified {
            return Ok(());
        }

        let info = gemini::fetch_model(&self.client).await.map_err(|err| {
            let model = self.client.default_model();
            let (auth_failure, not_found) = err
                .downcast_ref::<ApiStatusError>()
                .map_or((false, false), |status| {
                    (status.is_auth_failure(), status.is_not_found())
                });
            let cause = if auth_failure {
                err.context("API key was rejected")
            } else if not_found {
                err.context(format!("model '{model}' does not exist"))
            } else {
                err.context(format!("unable to verify model '{model}'"))
            };
            FatalError::BackendStartup {
                backend: self.name().to_string(),
                cause,
            }
        })?;

        log::info!(
            "Gemini model '{}' ready",
            info.display_name.as_deref().unwrap_or(&info.name)
        );
        self.verified = true;
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        if !self.verified {
            return Err(not_started(self.name()));
        }

        let request = options.to_request(prompt);
        let images = gemini::generate_images(&self.client, &request)
            .await
            .context("Failed to request image generation")?;
        Ok(images)
    }
}
