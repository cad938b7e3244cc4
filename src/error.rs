//! Error types for the risk pipeline

use thiserror::Error;

/// Pipeline error taxonomy
#[derive(Error, Debug)]
pub enum PipelineError {
    /// No usable model backend, missing target, or invalid settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Input table cannot support the requested stage
    #[error("Data error: {0}")]
    Data(String),

    #[error("Data error: required column '{column}' is missing")]
    MissingColumn { column: String },

    #[error("Data error: minority class has {actual} rows, balancing needs at least {required}")]
    InsufficientMinority { required: usize, actual: usize },

    #[error("Singular system - features may be perfectly collinear")]
    SingularMatrix,

    /// Attribution backend missing or failing; never fatal
    #[error("Explainability failure: {0}")]
    Explainability(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Whether this error must abort the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Explainability(_))
    }

    /// Taxonomy bucket used in log lines
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Configuration(_) | PipelineError::Config(_) => "configuration",
            PipelineError::Data(_)
            | PipelineError::MissingColumn { .. }
            | PipelineError::InsufficientMinority { .. }
            | PipelineError::Csv(_) => "data",
            PipelineError::SingularMatrix => "numeric",
            PipelineError::Explainability(_) => "explainability",
            PipelineError::Io(_) | PipelineError::Json(_) => "io",
        }
    }
}
