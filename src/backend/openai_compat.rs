use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use genapi::providers::openai;
use genapi::{ImageClient, ImageProvider};

use super::{client_error, not_started, GenerationBackend};
use crate::config::OpenAiCompatConfig;
use crate::error::{FatalError, FatalResult, GenerationError};
use crate::models::{GeneratedImage, GenerationOptions, Prompt};

/// Local server speaking the OpenAI images API (LocalAI,
/// stable-diffusion.cpp's `sd-server`).
#[derive(Debug)]
pub struct OpenAiCompatBackend {
    client: ImageClient,
    ready: bool,
}

impl OpenAiCompatBackend {
    pub fn new(config: &OpenAiCompatConfig, timeout: Duration) -> FatalResult<Self> {
        let api_key = config.api_key.as_deref().map(str::trim).unwrap_or_default();
        let client = ImageClient::new(
            ImageProvider::OpenAiCompatible,
            api_key,
            config.endpoint.trim(),
            config.model.trim(),
            Some(timeout),
        )
        .map_err(client_error)?;

        Ok(Self {
            client,
            ready: false,
        })
    }

    async fn check_model(&self) -> anyhow::Result<()> {
        let models = openai::list_models(&self.client)
            .await
            .with_context(|| format!("image server not reachable at {}", self.client.endpoint()))?;

        let wanted = self.client.default_model();
        if models.iter().any(|id| id == wanted) {
            Ok(())
        } else {
            Err(anyhow!(
                "model '{}' is not installed; available: {}",
                wanted,
                models.join(", ")
            ))
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn startup(&mut self) -> FatalResult<()> {
        if self.ready {
            return Ok(());
        }

        self.check_model()
            .await
            .map_err(|cause| FatalError::BackendStartup {
                backend: self.name().to_string(),
                cause,
            })?;
        log::info!("Image server model '{}' ready", self.client.default_model());
        self.ready = true;
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        if !self.ready {
            return Err(not_started(self.name()));
        }

        let request = options.to_request(prompt);
        let images = openai::generate_images(&self.client, &request)
            .await
            .context("images/generations request failed")?;
        Ok(images)
    }
}
