use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BakeError>;

#[derive(Error, Debug)]
pub enum BakeError {
    #[error("could not decode {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("hard example pool of {pool} cannot supply {requested} distinct samples")]
    InsufficientPool { pool: usize, requested: usize },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("resampling failed: {0}")]
    Resample(String),
    #[error("transform failed: {0}")]
    Transform(String),
    #[error("WAV encoding failed")]
    Wav(#[from] hound::Error),
    #[error("IO error")]
    Io(#[from] std::io::Error),
    #[error("bad glob pattern")]
    GlobPattern(#[from] glob::PatternError),
    #[error("unreadable directory entry")]
    Glob(#[from] glob::GlobError),
    #[error("pair list decoding failed")]
    Json(#[from] serde_json::Error),
    #[error("ndarray shape error")]
    Shape(#[from] ndarray::ShapeError),
    #[error("reading .npy failed")]
    ReadNpy(#[from] ndarray_npy::ReadNpyError),
    #[error("writing .npy failed")]
    WriteNpy(#[from] ndarray_npy::WriteNpyError),
    #[error("reading .npz failed")]
    ReadNpz(#[from] ndarray_npy::ReadNpzError),
    #[error("writing .npz failed")]
    WriteNpz(#[from] ndarray_npy::WriteNpzError),
}

impl BakeError {
    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        BakeError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
