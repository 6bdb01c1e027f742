use anyhow::Result;
use clap::Parser;

use partgen_lib::{CliArgs, PipelineConfig};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    let config = PipelineConfig::load(&args)?;

    log::info!(
        "partgen v{}: backend={}, input={}, output={}",
        env!("CARGO_PKG_VERSION"),
        config.backend.as_str(),
        config.input.display(),
        config.output_dir.display()
    );

    let report = partgen_lib::run(&config).await?;

    println!("{report}");
    for record in report.records.iter().filter(|r| r.outcome.is_failed()) {
        println!("  failed: {}", record.name);
    }
    Ok(())
}
