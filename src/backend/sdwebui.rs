use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use genapi::providers::sdwebui;
use genapi::{ImageClient, ImageProvider};

use super::{client_error, not_started, GenerationBackend};
use crate::config::SdWebUiConfig;
use crate::error::{FatalError, FatalResult, GenerationError};
use crate::models::{GeneratedImage, GenerationOptions, Prompt};

/// Local Stable Diffusion WebUI. The checkpoint is loaded into the server's
/// memory once at startup and reused for every record.
#[derive(Debug)]
pub struct SdWebUiBackend {
    client: ImageClient,
    checkpoint: Option<String>,
    loaded: Option<String>,
}

impl SdWebUiBackend {
    pub fn new(config: &SdWebUiConfig, timeout: Duration) -> FatalResult<Self> {
        let client = ImageClient::new(
            ImageProvider::SdWebUi,
            "",
            config.endpoint.trim(),
            config.checkpoint.clone().unwrap_or_default(),
            Some(timeout),
        )
        .map_err(client_error)?;

        Ok(Self {
            client,
            checkpoint: config
                .checkpoint
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            loaded: None,
        })
    }

    async fn load(&self) -> anyhow::Result<String> {
        let available = sdwebui::list_checkpoints(&self.client)
            .await
            .with_context(|| format!("Stable Diffusion WebUI not reachable at {}", self.client.endpoint()))?;

        if available.is_empty() {
            return Err(anyhow!("server reports no checkpoints"));
        }

        let Some(wanted) = &self.checkpoint else {
            return Ok(String::from("<server default>"));
        };

        let model = available
            .iter()
            .find(|model| model.matches(wanted))
            .ok_or_else(|| {
                anyhow!(
                    "checkpoint '{}' not found; available: {}",
                    wanted,
                    available
                        .iter()
                        .map(|model| model.model_name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })?;

        log::info!("Loading checkpoint '{}'", model.title);
        sdwebui::load_checkpoint(&self.client, &model.title)
            .await
            .with_context(|| format!("failed to load checkpoint '{}'", model.title))?;
        Ok(model.title.clone())
    }
}

#[async_trait]
impl GenerationBackend for SdWebUiBackend {
    fn name(&self) -> &str {
        "sd-webui"
    }

    async fn startup(&mut self) -> FatalResult<()> {
        if self.loaded.is_some() {
            return Ok(());
        }

        let title = self.load().await.map_err(|cause| FatalError::BackendStartup {
            backend: self.name().to_string(),
            cause,
        })?;
        log::info!("Stable Diffusion WebUI ready with checkpoint {title}");
        self.loaded = Some(title);
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        if self.loaded.is_none() {
            return Err(not_started(self.name()));
        }

        let request = options.to_request(prompt);
        let images = sdwebui::txt2img(&self.client, &request)
            .await
            .context("txt2img request failed")?;
        Ok(images)
    }
}
