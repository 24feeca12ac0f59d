//! Error type shared by the autoencoder crates

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported image size {height}x{width} (expected {expected})")]
    UnsupportedSize {
        height: usize,
        width: usize,
        expected: &'static str,
    },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Unknown statistic: {0}")]
    UnknownStat(String),

    #[error("No cached latent codes to generate from (run a training step first)")]
    NoCachedLatent,
}

pub type Result<T> = std::result::Result<T, Error>;
