use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageProvider {
    Gemini,
    SdWebUi,
    OpenAiCompatible,
}

/// Provider-neutral description of one text-to-image call.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f32,
    pub count: u32,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            width: 1024,
            height: 1024,
            steps: 30,
            guidance: 7.5,
            count: 1,
        }
    }

    /// `WxH`, the size notation shared by the OpenAI images API and most local servers.
    pub fn size_string(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageData {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            bytes,
        }
    }
}

/// Non-success HTTP status returned by a provider, kept typed so callers can
/// tell authentication failures apart from everything else.
#[derive(Debug, Clone)]
pub struct ApiStatusError {
    pub status: u16,
    pub body: String,
}

impl ApiStatusError {
    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl fmt::Display for ApiStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {} body {}", self.status, self.body)
    }
}

impl std::error::Error for ApiStatusError {}

#[derive(Clone)]
pub struct ImageClient {
    pub(crate) provider: ImageProvider,
    pub(crate) api_key: String,
    pub(crate) endpoint: String,
    pub(crate) default_model: String,
    pub(crate) http: Client,
}

impl ImageClient {
    pub fn new(
        provider: ImageProvider,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        default_model: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        Ok(Self {
            provider,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            default_model: default_model.into(),
            http,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }
}

impl fmt::Debug for ImageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageClient")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("default_model", &self.default_model)
            .field("api_key", &if self.api_key.is_empty() { "<none>" } else { "<redacted>" })
            .finish()
    }
}
