//! The per-record loop.
//!
//! Records are processed one at a time in input order. Each ends as
//! `Written`, `Skipped` or `Failed`; a failure is logged and recorded in the
//! [`RunReport`] and the loop moves on. Only [`crate::FatalError`]s, all raised
//! before the first record, abort a run.

use std::path::{Path, PathBuf};

use crate::backend::{build_backend, GenerationBackend};
use crate::config::PipelineConfig;
use crate::error::{FatalResult, GenerationError};
use crate::models::{
    FailureStage, GenerationOptions, Record, RecordOutcome, RecordReport, RunReport,
};
use crate::prompt::PromptBuilder;
use crate::source::load_records;
use crate::writer::OutputWriter;

pub struct Pipeline {
    backend: Box<dyn GenerationBackend>,
    prompts: PromptBuilder,
    writer: OutputWriter,
    options: GenerationOptions,
    started: bool,
}

impl Pipeline {
    pub fn new(
        backend: Box<dyn GenerationBackend>,
        prompts: PromptBuilder,
        writer: OutputWriter,
        options: GenerationOptions,
    ) -> Self {
        Self {
            backend,
            prompts,
            writer,
            options,
            started: false,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> FatalResult<Self> {
        let backend = build_backend(config)?;
        let writer =
            OutputWriter::new(config.output_dir.clone()).with_generation_log(config.generation_log);
        Ok(Self::new(
            backend,
            config.prompt.clone(),
            writer,
            config.options.clone(),
        ))
    }

    pub fn output_dir(&self) -> &Path {
        self.writer.output_dir()
    }

    /// Validates options, starts the backend and prepares the output
    /// directory. Runs once; later calls are no-ops.
    pub async fn startup(&mut self) -> FatalResult<()> {
        if self.started {
            return Ok(());
        }

        self.options.validate()?;
        log::info!("Starting backend '{}'", self.backend.name());
        self.backend.startup().await?;
        let dir = self.writer.ensure_output_dir().await?;
        log::info!("Writing images to {}", dir.display());

        self.started = true;
        Ok(())
    }

    /// Loads records from `input` and runs them. A malformed input aborts
    /// before the backend is started.
    pub async fn run_from_source(&mut self, input: &Path) -> FatalResult<RunReport> {
        let records = load_records(input)?;
        self.run(records).await
    }

    pub async fn run(&mut self, records: Vec<Record>) -> FatalResult<RunReport> {
        self.startup().await?;
        self.writer.begin_run();

        if records.is_empty() {
            log::warn!("Input contains no records, nothing to generate");
        }

        let mut report = RunReport::default();
        for (index, record) in records.iter().enumerate() {
            let outcome = self.process(index, record, &mut report).await;
            report.records.push(RecordReport {
                index,
                name: record.name.clone(),
                outcome,
            });
        }

        log::info!("Finished: {report}");
        Ok(report)
    }

    async fn process(&mut self, index: usize, record: &Record, report: &mut RunReport) -> RecordOutcome {
        if !record.has_name() {
            log::info!("Skipping row {}: missing name", index + 1);
            return RecordOutcome::Skipped {
                reason: "missing name".into(),
            };
        }

        let prompt = self.prompts.build(record);
        log::debug!("Generating '{}' with prompt: {}", record.name, prompt);

        report.attempted += 1;
        let images = match self.backend.generate(&prompt, &self.options).await {
            Ok(images) if images.is_empty() => Err(GenerationError::EmptyResponse),
            other => other,
        };
        let images = match images {
            Ok(images) => images,
            Err(err) => {
                log::warn!("Failed for {} (row {}): {}", record.name, index + 1, err);
                return RecordOutcome::Failed {
                    stage: FailureStage::Generation,
                    cause: err.to_string(),
                };
            }
        };

        let mut paths: Vec<PathBuf> = Vec::with_capacity(images.len());
        let mut errors = Vec::new();
        for result in self.writer.write(record, &images).await {
            match result {
                Ok(path) => {
                    log::info!("Generated: {} -> {}", record.name, path.display());
                    paths.push(path);
                }
                Err(err) => {
                    log::warn!("Failed for {} (row {}): {}", record.name, index + 1, err);
                    errors.push(err.to_string());
                }
            }
        }

        if !errors.is_empty() {
            return RecordOutcome::Failed {
                stage: FailureStage::Write,
                cause: errors.join("; "),
            };
        }

        self.writer.record_generation(record, &prompt, &paths).await;
        RecordOutcome::Written { paths }
    }
}

/// Runs the whole pipeline described by `config`: load input, start the
/// backend, process every record.
pub async fn run(config: &PipelineConfig) -> FatalResult<RunReport> {
    let records = load_records(&config.input)?;
    let mut pipeline = Pipeline::from_config(config)?;
    pipeline.run(records).await
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("backend", &self.backend.name())
            .field("output_dir", &self.writer.output_dir())
            .field("options", &self.options)
            .field("started", &self.started)
            .finish()
    }
}
