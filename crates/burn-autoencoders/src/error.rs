//! Error type for models, training and logging

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] burn_autoencoders_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Checkpoint error: {0}")]
    Recorder(#[from] burn::record::RecorderError),

    #[error("Not a VAE without regularization: reg_wt must be positive, got {0}")]
    MissingRegularization(f64),

    #[error("KL regularization needs a distribution-valued latent (use a normal or fixed-std head)")]
    PointLatentKl,

    #[error("Tensor data error: {0}")]
    TensorData(String),

    #[error("No images found under {0}")]
    EmptyDataset(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
