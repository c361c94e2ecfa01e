#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("cannot relax an empty point set")]
    EmptyInput,

    #[error("relaxation needs at least 2 points, found {found}")]
    InsufficientPoints { found: usize },

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("buffer of {len} values is not a whole number of {dim}-dimensional points")]
    RaggedInput { len: usize, dim: usize },

    #[error("point {row} has a non-finite coordinate")]
    NonFinite { row: usize },

    #[error("degenerate geometry: {reason}")]
    DegenerateGeometry { reason: String },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error(transparent)]
    Index(#[from] kdspace::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn degenerate(reason: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            reason: reason.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
