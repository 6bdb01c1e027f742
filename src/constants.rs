pub const DEFAULT_CONFIG_FILE: &str = "partgen.toml";
pub const DEFAULT_INPUT_FILE: &str = "car_parts.csv";
pub const DEFAULT_OUTPUT_DIR: &str = "generated";
pub const GENERATION_LOG_FILE: &str = "generation_log.json";
pub const MAX_GENERATION_LOG_ENTRIES: usize = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_SD_WEBUI_ENDPOINT: &str = "http://127.0.0.1:7860";
pub const DEFAULT_OPENAI_COMPAT_ENDPOINT: &str = "http://127.0.0.1:8080/v1";
pub const DEFAULT_OPENAI_COMPAT_MODEL: &str = "stablediffusion";

pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "A highly detailed, realistic image of a futuristic car part: {name}. {description} Game-style illustration.";

pub const OUTPUT_EXTENSION: &str = "png";
