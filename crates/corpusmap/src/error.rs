#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("a corpus needs at least one descriptor dimension")]
    ZeroDimension,

    #[error("descriptor has {found} values, corpus dimension is {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("{descriptors} descriptor rows but {payloads} payloads")]
    PayloadCount { descriptors: usize, payloads: usize },

    #[error("descriptor {row} has a non-finite value")]
    NonFinite { row: usize },

    #[error("axis {axis} is out of range for a {dim}-dimensional corpus")]
    AxisOutOfRange { axis: usize, dim: usize },

    #[error(transparent)]
    Index(#[from] kdspace::Error),

    #[error(transparent)]
    Layout(#[from] unispring::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
