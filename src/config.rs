//! Run configuration.
//!
//! Sources, highest priority first:
//! - CLI arguments and their environment variables
//! - TOML config file (`partgen.toml` unless `--config` says otherwise)
//! - Defaults

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_GEMINI_ENDPOINT, DEFAULT_IMAGE_MODEL, DEFAULT_INPUT_FILE,
    DEFAULT_OPENAI_COMPAT_ENDPOINT, DEFAULT_OPENAI_COMPAT_MODEL, DEFAULT_OUTPUT_DIR,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SD_WEBUI_ENDPOINT,
};
use crate::error::{FatalError, FatalResult};
use crate::models::{parse_size, GenerationOptions};
use crate::prompt::PromptBuilder;

/// Command-line arguments.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "partgen")]
#[command(about = "Generate one image per row of a CSV part list")]
#[command(version)]
pub struct CliArgs {
    /// Configuration file path (optional; missing file means defaults)
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_FILE, env = "PARTGEN_CONFIG")]
    pub config: PathBuf,

    /// CSV input with a "Part Name" (or "name") column and optional "Description"
    #[arg(long, short = 'i', env = "PARTGEN_INPUT")]
    pub input: Option<PathBuf>,

    /// Directory that receives the generated PNGs
    #[arg(long, short = 'o', env = "PARTGEN_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Image generation backend
    #[arg(long, short = 'b', env = "PARTGEN_BACKEND")]
    pub backend: Option<BackendKind>,

    /// Image size as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_size, env = "PARTGEN_SIZE")]
    pub size: Option<(u32, u32)>,

    /// Diffusion step count (local backends)
    #[arg(long, env = "PARTGEN_STEPS")]
    pub steps: Option<u32>,

    /// Guidance / CFG scale (local backends)
    #[arg(long, env = "PARTGEN_GUIDANCE")]
    pub guidance: Option<f32>,

    /// Images to request per record
    #[arg(long, short = 'n', env = "PARTGEN_COUNT")]
    pub count: Option<u32>,

    /// Things the image should not contain
    #[arg(long, env = "PARTGEN_NEGATIVE_PROMPT")]
    pub negative_prompt: Option<String>,

    /// Model (gemini, openai-compat) or checkpoint (sd-webui) for the selected backend
    #[arg(long, short = 'm', env = "PARTGEN_MODEL")]
    pub model: Option<String>,

    /// Base URL of the selected backend
    #[arg(long, env = "PARTGEN_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Bearer token for an OpenAI-compatible server, if it wants one
    #[arg(long, env = "PARTGEN_OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Do not maintain generation_log.json in the output directory
    #[arg(long)]
    pub no_generation_log: bool,
}

/// Which backend serves `generate` for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Hosted Gemini image model
    #[default]
    Gemini,
    /// Local Stable Diffusion WebUI (AUTOMATIC1111 / Forge API)
    SdWebui,
    /// Local OpenAI-compatible image server (LocalAI, stable-diffusion.cpp server)
    OpenaiCompat,
    /// Solid-colour images rendered in-process, for dry runs
    Placeholder,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gemini => "gemini",
            BackendKind::SdWebui => "sd-webui",
            BackendKind::OpenaiCompat => "openai-compat",
            BackendKind::Placeholder => "placeholder",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            model: DEFAULT_IMAGE_MODEL.to_string(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdWebUiConfig {
    pub endpoint: String,
    /// Checkpoint to load at startup; `None` keeps whatever the server has loaded.
    pub checkpoint: Option<String>,
}

impl Default for SdWebUiConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_SD_WEBUI_ENDPOINT.to_string(),
            checkpoint: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiCompatConfig {
    pub endpoint: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_OPENAI_COMPAT_ENDPOINT.to_string(),
            model: DEFAULT_OPENAI_COMPAT_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Everything a run needs, merged from all sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub backend: BackendKind,
    pub generation_log: bool,
    pub request_timeout_secs: u64,
    pub options: GenerationOptions,
    pub prompt: PromptBuilder,
    pub gemini: GeminiConfig,
    pub sd_webui: SdWebUiConfig,
    pub openai_compat: OpenAiCompatConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT_FILE),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            backend: BackendKind::default(),
            generation_log: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            options: GenerationOptions::default(),
            prompt: PromptBuilder::default(),
            gemini: GeminiConfig::default(),
            sd_webui: SdWebUiConfig::default(),
            openai_compat: OpenAiCompatConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Merges defaults, the config file (if present) and `args`, then validates.
    pub fn load(args: &CliArgs) -> FatalResult<Self> {
        let mut config = if args.config.exists() {
            log::info!("Loading configuration from {}", args.config.display());
            Self::from_file(&args.config)?
        } else {
            log::debug!(
                "No configuration file at {}, using defaults",
                args.config.display()
            );
            Self::default()
        };

        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> FatalResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            FatalError::InvalidConfiguration(format!(
                "Failed to read config file {}: {err}",
                path.display()
            ))
        })?;
        Self::from_toml(&contents).map_err(|err| {
            FatalError::InvalidConfiguration(format!(
                "Failed to parse config file {}: {err}",
                path.display()
            ))
        })
    }

    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(input) = &args.input {
            self.input = input.clone();
        }
        if let Some(output_dir) = &args.output_dir {
            self.output_dir = output_dir.clone();
        }
        if let Some(backend) = args.backend {
            self.backend = backend;
        }
        if let Some((width, height)) = args.size {
            self.options.width = width;
            self.options.height = height;
        }
        if let Some(steps) = args.steps {
            self.options.steps = steps;
        }
        if let Some(guidance) = args.guidance {
            self.options.guidance = guidance;
        }
        if let Some(count) = args.count {
            self.options.count = count;
        }
        if let Some(negative) = &args.negative_prompt {
            self.options.negative_prompt = Some(negative.clone());
        }
        if args.no_generation_log {
            self.generation_log = false;
        }
        if let Some(key) = &args.api_key {
            self.gemini.api_key = Some(key.clone());
        }
        if let Some(key) = &args.openai_api_key {
            self.openai_compat.api_key = Some(key.clone());
        }

        match self.backend {
            BackendKind::Gemini => {
                override_string(&mut self.gemini.model, &args.model);
                override_string(&mut self.gemini.endpoint, &args.endpoint);
            }
            BackendKind::SdWebui => {
                if let Some(model) = &args.model {
                    self.sd_webui.checkpoint = Some(model.clone());
                }
                override_string(&mut self.sd_webui.endpoint, &args.endpoint);
            }
            BackendKind::OpenaiCompat => {
                override_string(&mut self.openai_compat.model, &args.model);
                override_string(&mut self.openai_compat.endpoint, &args.endpoint);
            }
            BackendKind::Placeholder => {}
        }
    }

    pub fn validate(&self) -> FatalResult<()> {
        self.options.validate()?;
        if self.output_dir.as_os_str().is_empty() {
            return Err(FatalError::InvalidConfiguration(
                "output directory must not be empty".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(FatalError::InvalidConfiguration(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if !self.prompt.template.contains("{name}") {
            return Err(FatalError::InvalidConfiguration(
                "prompt template must contain {name}".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn override_string(target: &mut String, value: &Option<String>) {
    if let Some(value) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        *target = value.to_string();
    }
}
