//! Image generation backends.
//!
//! Every backend is started exactly once, before the first record, and then
//! serves `generate` calls. `generate` only returns image data: it never
//! writes files and never retries.

mod gemini;
mod openai_compat;
mod placeholder;
mod sdwebui;

use async_trait::async_trait;

use crate::config::{BackendKind, PipelineConfig};
use crate::error::{FatalResult, GenerationError};
use crate::models::{GeneratedImage, GenerationOptions, Prompt};

pub use gemini::GeminiBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use placeholder::PlaceholderBackend;
pub use sdwebui::SdWebUiBackend;

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Acquires credentials or loads the model. Idempotent: once it has
    /// succeeded, later calls return immediately.
    async fn startup(&mut self) -> FatalResult<()>;

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedImage>, GenerationError>;
}

/// Constructs the backend selected by `config.backend`. Missing credentials
/// are reported here, before any network traffic.
pub fn build_backend(config: &PipelineConfig) -> FatalResult<Box<dyn GenerationBackend>> {
    let timeout = config.request_timeout();
    let backend: Box<dyn GenerationBackend> = match config.backend {
        BackendKind::Gemini => Box::new(GeminiBackend::new(&config.gemini, timeout)?),
        BackendKind::SdWebui => Box::new(SdWebUiBackend::new(&config.sd_webui, timeout)?),
        BackendKind::OpenaiCompat => {
            Box::new(OpenAiCompatBackend::new(&config.openai_compat, timeout)?)
        }
        BackendKind::Placeholder => Box::new(PlaceholderBackend::new()),
    };
    Ok(backend)
}

fn not_started(name: &str) -> GenerationError {
    GenerationError::Backend(anyhow::anyhow!("{name} backend used before startup"))
}

fn client_error(err: anyhow::Error) -> crate::error::FatalError {
    crate::error::FatalError::InvalidConfiguration(format!("{err:#}"))
}
