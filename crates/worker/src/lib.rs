//! Batch runner: loads a dataset directory, runs the pipeline and writes
//! the resulting feature collection as JSON.

pub mod config;

use anyhow::Context;
use tokio::io::AsyncWriteExt;

use roadscan_pipeline::{DatasetLoader, Pipeline};

pub use config::{LogFormat, WorkerConfig};

/// Default `tracing` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "roadscan_worker=info,roadscan_pipeline=info,roadscan_core=warn";

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub feature_count: usize,
    pub job_count: usize,
    pub failed_sources: Vec<String>,
}

/// Load, process and write one dataset.
pub async fn run(config: &WorkerConfig) -> anyhow::Result<RunSummary> {
    let pipeline = Pipeline::new(config.resolver.clone()).with_segment_config(config.segments.clone());
    pipeline.validate()?;

    let dataset = DatasetLoader::new(&config.data_dir, config.resolver.clone())
        .load()
        .await
        .with_context(|| format!("failed to load dataset at {}", config.data_dir.display()))?;

    let value = pipeline.run(&dataset, config.output_mode)?;
    let mut bytes = serde_json::to_vec_pretty(&value)?;
    bytes.push(b'\n');

    match &config.output_path {
        Some(path) => {
            tokio::fs::write(path, &bytes)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), bytes = bytes.len(), "Wrote output");
        }
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
    }

    Ok(RunSummary {
        feature_count: value["features"].as_array().map_or(0, Vec::len),
        job_count: dataset.job_count(),
        failed_sources: dataset.failed_sources,
    })
}
