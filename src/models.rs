use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{FatalError, FatalResult};

/// Raw image bytes as returned by a backend.
pub type GeneratedImage = genapi::ImageData;

/// One named item from the input table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl Record {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn has_name(&self) -> bool {
        !self.name.trim().is_empty()
    }
}

/// Prompt text derived from a [`Record`]. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt(String);

impl Prompt {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options handed through to the backend untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance: f32,
    pub count: u32,
    pub negative_prompt: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            steps: 30,
            guidance: 7.5,
            count: 1,
            negative_prompt: None,
        }
    }
}

impl GenerationOptions {
    pub fn validate(&self) -> FatalResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(FatalError::InvalidConfiguration(format!(
                "image size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.count == 0 {
            return Err(FatalError::InvalidConfiguration(
                "image count must be at least 1".into(),
            ));
        }
        if self.steps == 0 {
            return Err(FatalError::InvalidConfiguration(
                "step count must be at least 1".into(),
            ));
        }
        if !self.guidance.is_finite() || self.guidance < 0.0 {
            return Err(FatalError::InvalidConfiguration(format!(
                "guidance must be a non-negative number, got {}",
                self.guidance
            )));
        }
        Ok(())
    }

    pub fn to_request(&self, prompt: &Prompt) -> genapi::ImageRequest {
        genapi::ImageRequest {
            prompt: prompt.as_str().to_string(),
            negative_prompt: self.negative_prompt.clone(),
            width: self.width,
            height: self.height,
            steps: self.steps,
            guidance: self.guidance,
            count: self.count,
        }
    }
}

/// Parses `WxH` (also accepts `X` and `*` as the separator).
pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X', '*'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid width '{w}': {err}"))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid height '{h}': {err}"))?;
    Ok((width, height))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Generation,
    Write,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Generation => f.write_str("generation"),
            FailureStage::Write => f.write_str("write"),
        }
    }
}

/// Terminal state of one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RecordOutcome {
    Written { paths: Vec<PathBuf> },
    Skipped { reason: String },
    Failed { stage: FailureStage, cause: String },
}

impl RecordOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, RecordOutcome::Written { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RecordOutcome::Skipped { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordReport {
    /// Position in the input, zero-based.
    pub index: usize,
    pub name: String,
    pub outcome: RecordOutcome,
}

/// Per-record outcomes of a run, in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub records: Vec<RecordReport>,
    /// Number of `generate` calls made.
    pub attempted: usize,
}

impl RunReport {
    pub fn written(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_written()).count()
    }

    pub fn skipped(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_skipped()).count()
    }

    pub fn failed(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_failed()).count()
    }

    pub fn files_written(&self) -> impl Iterator<Item = &PathBuf> {
        self.records.iter().flat_map(|r| match &r.outcome {
            RecordOutcome::Written { paths } => paths.as_slice(),
            _ => &[][..],
        })
    }

    pub fn outcome_for(&self, name: &str) -> Option<&RecordOutcome> {
        self.records
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records: {} written, {} skipped, {} failed",
            self.records.len(),
            self.written(),
            self.skipped(),
            self.failed()
        )
    }
}
