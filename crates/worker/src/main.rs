use roadscan_worker::{LogFormat, WorkerConfig, DEFAULT_LOG_FILTER};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    // Logs go to stderr; stdout may carry the output collection.
    match LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref()) {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Invalid worker configuration");
            std::process::exit(1);
        }
    };

    tracing::info!(
        data_dir = %config.data_dir.display(),
        mode = %config.output_mode,
        "Worker starting"
    );

    match roadscan_worker::run(&config).await {
        Ok(summary) => tracing::info!(
            features = summary.feature_count,
            jobs = summary.job_count,
            failed_sources = summary.failed_sources.len(),
            "Worker finished"
        ),
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "Worker run failed");
            std::process::exit(1);
        }
    }
}
