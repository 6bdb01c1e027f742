//! Pipeline behaviour with in-process stub backends.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use partgen_lib::{
    demo_records, read_generation_log, BackendKind, FailureStage, FatalError, FatalResult,
    GeneratedImage, GenerationBackend, GenerationError, GenerationOptions, Pipeline,
    PipelineConfig, Prompt, PromptBuilder, Record, RecordOutcome, OutputWriter,
};
use tempfile::TempDir;

fn encode(format: ImageFormat) -> Vec<u8> {
    let buffer = ImageBuffer::from_pixel(4, 4, Rgb([0u8, 0, 0]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(buffer)
        .write_to(&mut out, format)
        .expect("encode test image");
    out.into_inner()
}

fn blank_png() -> GeneratedImage {
    GeneratedImage::new("image/png", encode(ImageFormat::Png))
}

#[derive(Clone, Default)]
struct Calls {
    prompts: Arc<Mutex<Vec<String>>>,
    startups: Arc<AtomicUsize>,
}

impl Calls {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn startups(&self) -> usize {
        self.startups.load(Ordering::SeqCst)
    }
}

/// Returns `images` blank PNGs, or fails when the prompt mentions a name in `fail_for`.
struct StubBackend {
    calls: Calls,
    fail_for: Vec<String>,
    images: Vec<GeneratedImage>,
    fail_startup: bool,
}

impl StubBackend {
    fn new(calls: &Calls) -> Self {
        Self {
            calls: calls.clone(),
            fail_for: Vec::new(),
            images: vec![blank_png()],
            fail_startup: false,
        }
    }

    fn failing_for(mut self, name: &str) -> Self {
        self.fail_for.push(name.to_string());
        self
    }

    fn returning(mut self, images: Vec<GeneratedImage>) -> Self {
        self.images = images;
        self
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    async fn startup(&mut self) -> FatalResult<()> {
        self.calls.startups.fetch_add(1, Ordering::SeqCst);
        if self.fail_startup {
            return Err(FatalError::BackendStartup {
                backend: "stub".into(),
                cause: anyhow::anyhow!("model weights missing"),
            });
        }
        Ok(())
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        _options: &GenerationOptions,
    ) -> Result<Vec<GeneratedImage>, GenerationError> {
        self.calls.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(name) = self.fail_for.iter().find(|name| prompt.as_str().contains(name.as_str())) {
            return Err(GenerationError::Backend(anyhow::anyhow!(
                "quota exceeded while drawing {name}"
            )));
        }
        Ok(self.images.clone())
    }
}

fn pipeline(backend: StubBackend, out: &Path) -> Pipeline {
    Pipeline::new(
        Box::new(backend),
        PromptBuilder::default(),
        OutputWriter::new(out),
        GenerationOptions::default(),
    )
}

fn car_parts() -> Vec<Record> {
    vec![
        Record::new("Alloy Wheel", "A shiny chrome alloy wheel."),
        Record::new("Spoiler", "A sleek carbon fiber spoiler."),
    ]
}

fn png_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".png") && !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn writes_one_file_per_record() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("generated");
    let calls = Calls::default();

    let report = pipeline(StubBackend::new(&calls), &out)
        .run(car_parts())
        .await
        .expect("run should not be fatal");

    assert_eq!(report.written(), 2);
    assert_eq!(report.failed(), 0);
    assert_eq!(report.attempted, 2);
    assert_eq!(calls.count(), 2);
    assert!(out.join("Alloy_Wheel.png").is_file());
    assert!(out.join("Spoiler.png").is_file());
    assert_eq!(
        report.outcome_for("Spoiler"),
        Some(&RecordOutcome::Written {
            paths: vec![out.join("Spoiler.png")]
        })
    );
}

#[tokio::test]
async fn generation_failure_is_isolated() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("generated");
    let calls = Calls::default();

    let report = pipeline(StubBackend::new(&calls).failing_for("Spoiler"), &out)
        .run(car_parts())
        .await
        .expect("a record failure must not abort the run");

    assert!(out.join("Alloy_Wheel.png").is_file());
    assert!(!out.join("Spoiler.png").exists());
    assert_eq!(report.written(), 1);
    assert_eq!(report.failed(), 1);

    match report.outcome_for("Spoiler") {
        Some(RecordOutcome::Failed { stage, cause }) => {
            assert_eq!(*stage, FailureStage::Generation);
            assert!(cause.contains("Spoiler"), "cause was {cause}");
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn records_after_a_failure_are_still_processed() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let records: Vec<Record> = ["Hood", "Grille", "Exhaust", "Mirror", "Bumper"]
        .into_iter()
        .map(|name| Record::new(name, ""))
        .collect();

    let report = pipeline(StubBackend::new(&calls).failing_for("Grille"), &out)
        .run(records)
        .await
        .unwrap();

    assert_eq!(calls.count(), 5);
    assert_eq!(report.failed(), 1);
    assert_eq!(
        png_files(&out),
        vec!["Bumper.png", "Exhaust.png", "Hood.png", "Mirror.png"]
    );
    assert!(report.records[1].outcome.is_failed());
    assert!(report.records[2..].iter().all(|r| r.outcome.is_written()));
}

#[tokio::test]
async fn nameless_records_are_skipped_without_a_backend_call() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let records = vec![
        Record::new("", "orphan"),
        Record::new("Hood", ""),
        Record::new("   ", "blank"),
    ];

    let report = pipeline(StubBackend::new(&calls), &out)
        .run(records)
        .await
        .unwrap();

    assert_eq!(calls.count(), 1);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.skipped(), 2);
    assert_eq!(png_files(&out), vec!["Hood.png"]);
}

#[tokio::test]
async fn missing_input_falls_back_to_demo_records() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();

    let report = pipeline(StubBackend::new(&calls), &out)
        .run_from_source(&tmp.path().join("no_such_file.csv"))
        .await
        .unwrap();

    assert_eq!(calls.count(), demo_records().len());
    assert!(report.written() >= 1);
    assert!(out.join("Alloy_Wheel.png").is_file());
}

#[tokio::test]
async fn malformed_input_aborts_before_any_backend_call() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("parts.csv");
    std::fs::write(&input, "Part Name,Description\nWheel,round,unexpected\n").unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();

    let err = pipeline(StubBackend::new(&calls), &out)
        .run_from_source(&input)
        .await
        .unwrap_err();

    assert!(matches!(err, FatalError::MalformedInput { .. }));
    assert_eq!(calls.count(), 0);
    assert_eq!(calls.startups(), 0);
}

#[tokio::test]
async fn csv_input_drives_the_run() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("parts.csv");
    std::fs::write(
        &input,
        "Part Name,Description\nAlloy Wheel,A shiny chrome alloy wheel.\nSpoiler,A sleek carbon fiber spoiler.\n",
    )
    .unwrap();
    let out = tmp.path().join("generated");
    let calls = Calls::default();

    let report = pipeline(StubBackend::new(&calls), &out)
        .run_from_source(&input)
        .await
        .unwrap();

    assert_eq!(report.written(), 2);
    assert!(calls.prompts()[0].contains("Alloy Wheel. A shiny chrome alloy wheel."));
    assert_eq!(png_files(&out), vec!["Alloy_Wheel.png", "Spoiler.png"]);
}

#[tokio::test]
async fn startup_failure_is_fatal_and_processes_nothing() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let mut backend = StubBackend::new(&calls);
    backend.fail_startup = true;

    let err = pipeline(backend, &out).run(car_parts()).await.unwrap_err();

    assert!(matches!(err, FatalError::BackendStartup { .. }));
    assert!(err.to_string().contains("model weights missing"));
    assert_eq!(calls.count(), 0);
    assert!(!out.exists());
}

#[tokio::test]
async fn backend_starts_once_across_runs() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let mut pipeline = pipeline(StubBackend::new(&calls), &out);

    pipeline.run(vec![Record::new("Hood", "")]).await.unwrap();
    pipeline.run(vec![Record::new("Grille", "")]).await.unwrap();

    assert_eq!(calls.startups(), 1);
    assert_eq!(calls.count(), 2);
}

#[tokio::test]
async fn write_failure_is_isolated() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    // A directory squatting on the target name makes the final rename fail.
    std::fs::create_dir_all(out.join("Alloy_Wheel.png")).unwrap();
    let calls = Calls::default();

    let report = pipeline(StubBackend::new(&calls), &out)
        .run(car_parts())
        .await
        .unwrap();

    match report.outcome_for("Alloy Wheel") {
        Some(RecordOutcome::Failed { stage, .. }) => assert_eq!(*stage, FailureStage::Write),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(out.join("Spoiler.png").is_file());
    assert!(!out.join(".Alloy_Wheel.png.partial").exists());
    assert_eq!(report.written(), 1);
}

#[tokio::test]
async fn multiple_images_get_index_suffixes() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let backend = StubBackend::new(&calls).returning(vec![blank_png(), blank_png()]);

    let report = pipeline(backend, &out)
        .run(vec![Record::new("Alloy Wheel", "")])
        .await
        .unwrap();

    assert_eq!(report.files_written().count(), 2);
    assert_eq!(png_files(&out), vec!["Alloy_Wheel_0.png", "Alloy_Wheel_1.png"]);
}

#[tokio::test]
async fn colliding_names_do_not_overwrite() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let records = vec![
        Record::new("Alloy Wheel", "front"),
        Record::new("Alloy/Wheel", "rear"),
    ];

    let report = pipeline(StubBackend::new(&calls), &out)
        .run(records)
        .await
        .unwrap();

    assert_eq!(report.written(), 2);
    assert_eq!(png_files(&out), vec!["Alloy_Wheel.png", "Alloy_Wheel_1.png"]);
}

#[tokio::test]
async fn rerunning_the_same_input_overwrites_its_own_files() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let mut pipeline = pipeline(StubBackend::new(&calls), &out);

    let first = pipeline.run(vec![Record::new("Hood", "")]).await.unwrap();
    let second = pipeline.run(vec![Record::new("Hood", "")]).await.unwrap();

    for report in [&first, &second] {
        assert_eq!(
            report.outcome_for("Hood"),
            Some(&RecordOutcome::Written {
                paths: vec![out.join("Hood.png")]
            })
        );
    }
    assert_eq!(png_files(&out), vec!["Hood.png"]);
}

#[tokio::test]
async fn empty_backend_response_is_a_generation_failure() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let backend = StubBackend::new(&calls).returning(Vec::new());

    let report = pipeline(backend, &out)
        .run(vec![Record::new("Hood", "")])
        .await
        .unwrap();

    assert_eq!(
        report.outcome_for("Hood"),
        Some(&RecordOutcome::Failed {
            stage: FailureStage::Generation,
            cause: "backend returned no images".into(),
        })
    );
    assert!(png_files(&out).is_empty());
}

#[tokio::test]
async fn non_png_output_is_converted() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let jpeg = GeneratedImage::new("image/jpeg", encode(ImageFormat::Jpeg));
    let backend = StubBackend::new(&calls).returning(vec![jpeg]);

    pipeline(backend, &out)
        .run(vec![Record::new("Spoiler", "")])
        .await
        .unwrap();

    let bytes = std::fs::read(out.join("Spoiler.png")).unwrap();
    assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
}

#[tokio::test]
async fn undecodable_output_is_a_write_failure() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let garbage = GeneratedImage::new("image/png", b"definitely not an image".to_vec());
    let backend = StubBackend::new(&calls).returning(vec![garbage]);

    let report = pipeline(backend, &out)
        .run(vec![Record::new("Spoiler", "")])
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for("Spoiler"),
        Some(RecordOutcome::Failed { stage: FailureStage::Write, .. })
    ));
    assert!(!out.join("Spoiler.png").exists());
}

#[tokio::test]
async fn generation_log_lists_written_records() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let calls = Calls::default();
    let mut pipeline = Pipeline::new(
        Box::new(StubBackend::new(&calls).failing_for("Spoiler")),
        PromptBuilder::default(),
        OutputWriter::new(&out).with_generation_log(true),
        GenerationOptions::default(),
    );

    pipeline.run(car_parts()).await.unwrap();

    let entries = read_generation_log(&out).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Alloy Wheel");
    assert_eq!(entries[0].output_files, vec!["Alloy_Wheel.png"]);
    assert!(entries[0].prompt.contains("Alloy Wheel"));
}

#[tokio::test]
async fn placeholder_backend_runs_end_to_end_from_config() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("parts.csv");
    std::fs::write(&input, "name\nTurbocharger\nBrake Caliper\n").unwrap();

    let mut config = PipelineConfig::default();
    config.backend = BackendKind::Placeholder;
    config.input = input;
    config.output_dir = tmp.path().join("renders");
    config.generation_log = false;
    config.options.width = 16;
    config.options.height = 16;

    let report = partgen_lib::run(&config).await.unwrap();

    assert_eq!(report.written(), 2);
    let files: Vec<PathBuf> = report.files_written().cloned().collect();
    assert_eq!(
        files,
        vec![
            config.output_dir.join("Turbocharger.png"),
            config.output_dir.join("Brake_Caliper.png"),
        ]
    );
    assert!(!config.output_dir.join("generation_log.json").exists());
}
