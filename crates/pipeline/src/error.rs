use roadscan_core::error::CoreError;

/// Errors raised while reading or parsing dataset sources.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A source that must exist was not found.
    #[error("Missing source: {0}")]
    MissingSource(String),
}
