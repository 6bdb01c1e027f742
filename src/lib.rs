mod backend;
mod config;
mod constants;
mod error;
mod models;
mod pipeline;
mod prompt;
mod source;
mod writer;

pub use backend::{
    build_backend, GeminiBackend, GenerationBackend, OpenAiCompatBackend, PlaceholderBackend,
    SdWebUiBackend,
};
pub use config::{
    BackendKind, CliArgs, GeminiConfig, OpenAiCompatConfig, PipelineConfig, SdWebUiConfig,
};
pub use constants::{
    DEFAULT_CONFIG_FILE, DEFAULT_GEMINI_ENDPOINT, DEFAULT_IMAGE_MODEL, DEFAULT_INPUT_FILE,
    DEFAULT_OUTPUT_DIR, DEFAULT_PROMPT_TEMPLATE, GENERATION_LOG_FILE,
};
pub use error::{FatalError, FatalResult, GenerationError, WriteError};
pub use models::{
    parse_size, FailureStage, GeneratedImage, GenerationOptions, Prompt, Record, RecordOutcome,
    RecordReport, RunReport,
};
pub use pipeline::{run, Pipeline};
pub use prompt::PromptBuilder;
pub use source::{demo_records, load_records, read_records};
pub use writer::{read_generation_log, sanitize_stem, GenerationLogEntry, OutputWriter};
