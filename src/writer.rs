use std::borrow::Cow;
use std::collections::HashSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::fs::try_exists;

use crate::constants::{GENERATION_LOG_FILE, MAX_GENERATION_LOG_ENTRIES, OUTPUT_EXTENSION};
use crate::error::{FatalError, FatalResult, WriteError};
use crate::models::{GeneratedImage, Prompt, Record};

const REPLACEMENT: char = '_';

/// Maps a record name to a file stem that is safe on every mainstream filesystem.
///
/// Whitespace, path separators, control characters and the characters Windows
/// reserves are replaced with `_`, as is a leading `.`. The replacement is
/// itself safe, so `sanitize_stem(sanitize_stem(x)) == sanitize_stem(x)`.
pub fn sanitize_stem(name: &str) -> String {
    let mut stem: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace()
                || c.is_control()
                || matches!(c, '/' | '\\' | '<' | '>' | ':' | '"' | '|' | '?' | '*')
            {
                REPLACEMENT
            } else {
                c
            }
        })
        .collect();

    if stem.starts_with('.') {
        stem.replace_range(..1, "_");
    }
    if stem.is_empty() {
        stem.push(REPLACEMENT);
    }
    stem
}

/// Persists generated images under one output directory.
///
/// The writer remembers every file name it has handed out in this run; a
/// record whose targets are already taken gets the smallest free `_<n>` stem
/// suffix instead of overwriting an earlier record's image.
#[derive(Debug)]
pub struct OutputWriter {
    output_dir: PathBuf,
    claimed: HashSet<String>,
    generation_log: bool,
}

impl OutputWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            claimed: HashSet::new(),
            generation_log: false,
        }
    }

    pub fn with_generation_log(mut self, enabled: bool) -> Self {
        self.generation_log = enabled;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub async fn ensure_output_dir(&self) -> FatalResult<&Path> {
        create_dir(&self.output_dir)
            .await
            .map_err(|source| FatalError::OutputDirectory {
                path: self.output_dir.clone(),
                source,
            })?;
        Ok(&self.output_dir)
    }

    /// Forgets the names handed out by a previous run, so rerunning the same
    /// input overwrites its own files instead of suffixing them.
    pub fn begin_run(&mut self) {
        self.claimed.clear();
    }

    /// Reserves target paths for `image_count` images of `record`.
    pub fn plan_paths(&mut self, record: &Record, image_count: usize) -> Vec<PathBuf> {
        let base = sanitize_stem(&record.name);
        let mut stem = base.clone();
        let mut suffix = 0usize;

        loop {
            let names = target_names(&stem, image_count);
            if names.iter().all(|name| !self.claimed.contains(&claim_key(name))) {
                for name in &names {
                    self.claimed.insert(claim_key(name));
                }
                if suffix > 0 {
                    log::warn!(
                        "'{}' collides with an earlier record, writing as '{}'",
                        record.name,
                        stem
                    );
                }
                return names
                    .into_iter()
                    .map(|name| self.output_dir.join(name))
                    .collect();
            }
            suffix += 1;
            stem = format!("{base}_{suffix}");
        }
    }

    /// Writes each image to its planned path. A failed image does not stop
    /// the remaining ones, and files already written stay in place.
    pub async fn write(
        &mut self,
        record: &Record,
        images: &[GeneratedImage],
    ) -> Vec<Result<PathBuf, WriteError>> {
        let targets = self.plan_paths(record, images.len());
        let mut results = Vec::with_capacity(images.len());

        for (generated, target) in images.iter().zip(targets) {
            results.push(self.write_one(generated, target).await);
        }
        results
    }

    async fn write_one(&self, generated: &GeneratedImage, target: PathBuf) -> Result<PathBuf, WriteError> {
        let bytes = ensure_png(generated)?;

        create_dir(&self.output_dir)
            .await
            .map_err(|source| WriteError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        write_atomically(&target, &bytes).await?;
        Ok(target)
    }

    /// Appends a record to `generation_log.json` when enabled. Failures are
    /// logged and otherwise ignored.
    pub async fn record_generation(&self, record: &Record, prompt: &Prompt, files: &[PathBuf]) {
        if !self.generation_log || files.is_empty() {
            return;
        }

        let entry = GenerationLogEntry {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
            name: record.name.clone(),
            prompt: prompt.as_str().to_string(),
            output_files: files
                .iter()
                .filter_map(|path| path.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .collect(),
        };

        if let Err(err) = append_generation_log(&self.output_dir, entry).await {
            log::warn!("Failed to update generation log: {err:#}");
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationLogEntry {
    pub timestamp: u64,
    pub name: String,
    pub prompt: String,
    pub output_files: Vec<String>,
}

pub async fn read_generation_log(output_dir: &Path) -> anyhow::Result<Vec<GenerationLogEntry>> {
    let path = output_dir.join(GENERATION_LOG_FILE);

    if !try_exists(&path)
        .await
        .context("Failed to check generation log")?
    {
        return Ok(Vec::new());
    }

    let contents = fs::read_to_string(&path)
        .await
        .with_context(|| format!("Unable to read {}", path.display()))?;

    serde_json::from_str(&contents).with_context(|| format!("Unable to parse {}", path.display()))
}

async fn append_generation_log(output_dir: &Path, entry: GenerationLogEntry) -> anyhow::Result<()> {
    let path = output_dir.join(GENERATION_LOG_FILE);

    let mut entries = match read_generation_log(output_dir).await {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("{err:#}; starting a new generation log");
            Vec::new()
        }
    };

    entries.push(entry);
    if entries.len() > MAX_GENERATION_LOG_ENTRIES {
        entries = entries.split_off(entries.len() - MAX_GENERATION_LOG_ENTRIES);
    }

    let payload =
        serde_json::to_string_pretty(&entries).context("Unable to serialise generation log")?;

    fs::write(&path, payload)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

fn target_names(stem: &str, image_count: usize) -> Vec<String> {
    if image_count <= 1 {
        vec![format!("{stem}.{OUTPUT_EXTENSION}")]
    } else {
        (0..image_count)
            .map(|index| format!("{stem}_{index}.{OUTPUT_EXTENSION}"))
            .collect()
    }
}

/// Case-folded so `Spoiler` and `spoiler` collide as they would on macOS or Windows.
fn claim_key(file_name: &str) -> String {
    file_name.to_lowercase()
}

fn ensure_png(generated: &GeneratedImage) -> Result<Cow<'_, [u8]>, WriteError> {
    if matches!(image::guess_format(&generated.bytes), Ok(ImageFormat::Png)) {
        return Ok(Cow::Borrowed(&generated.bytes));
    }

    let decoded = image::load_from_memory(&generated.bytes)?;
    let mut encoded = Cursor::new(Vec::new());
    decoded.write_to(&mut encoded, ImageFormat::Png)?;
    Ok(Cow::Owned(encoded.into_inner()))
}

async fn create_dir(path: &Path) -> std::io::Result<()> {
    if !try_exists(path).await? {
        fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Writes to a hidden sibling first so the final name only ever holds a complete file.
async fn write_atomically(target: &Path, bytes: &[u8]) -> Result<(), WriteError> {
    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = target.with_file_name(format!(".{file_name}.partial"));

    fs::write(&partial, bytes)
        .await
        .map_err(|source| WriteError::Io {
            path: partial.clone(),
            source,
        })?;

    if let Err(source) = fs::rename(&partial, target).await {
        let _ = fs::remove_file(&partial).await;
        return Err(WriteError::Io {
            path: target.to_path_buf(),
            source,
        });
    }
    Ok(())
}
