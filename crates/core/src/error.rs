#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Unknown defect type: {0}")]
    UnknownDefectType(String),

    #[error("Unknown severity: {0}")]
    UnknownSeverity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
