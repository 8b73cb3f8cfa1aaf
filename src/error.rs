use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("vector store at '{endpoint}' is unreachable: {reason}")]
    StoreUnavailable { endpoint: String, reason: String },

    #[error("collection '{0}' does not exist")]
    CollectionNotFound(String),

    #[error("scroll on collection '{collection}' failed: {reason}")]
    Query { collection: String, reason: String },

    #[error("failed to read input '{}'", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record on line {line} of '{}'", path.display())]
    MalformedInput {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("point {id} has no vector")]
    MissingVector { id: String },

    #[error("point {id}: vector dimension mismatch, expected {expected}, got {found}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("point {id}: vector contains NaN or infinite components")]
    NonFiniteVector { id: String },

    #[error("point {id}: attribute '{key}' is {found}, expected a number")]
    NonNumericAttribute {
        id: String,
        key: String,
        found: String,
    },

    #[error("insufficient data: {found} samples fetched, at least {required} required")]
    InsufficientData { found: usize, required: usize },

    #[error("all vectors are identical, nothing to project")]
    DegenerateVectors,

    #[error("attribute has no variance (every point is {value}), cannot normalize")]
    NoVariance { value: f64 },

    #[error("rendering failed: {0}")]
    Render(String),
}
