#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("cannot build a kd-tree from zero points")]
    EmptyInput,

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("buffer of {len} values is not a whole number of {dim}-dimensional rows")]
    RaggedInput { len: usize, dim: usize },

    #[error("invalid dimension weights: {reason}")]
    InvalidWeights { reason: &'static str },

    #[error("no point satisfies the query")]
    NotFound,
}

pub type Result<T> = std::result::Result<T, Error>;
