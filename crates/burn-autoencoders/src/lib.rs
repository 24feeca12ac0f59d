//! Generative autoencoders in pure Rust
//!
//! This crate provides a family of latent-variable autoencoders built on the
//! [Burn](https://burn.dev) deep learning framework, together with a small
//! training harness.
//!
//! # Models
//!
//! - **AE**: plain autoencoder with an optional L1/L2 latent penalty
//! - **VAE**: variational autoencoder (KL to a standard normal)
//! - **WAE**: Wasserstein autoencoder (MMD to a standard normal)
//! - **SWAE**: sliced Wasserstein autoencoder
//! - **Cost-aware** variants (`cae`, `cwae`, `cswae`, `cvae`) that learn how
//!   much each latent dimension is worth
//!
//! # Backend Selection
//!
//! Enable one of the backend features:
//! - `ndarray` - CPU backend (default)
//! - `wgpu` - WebGPU backend
//!
//! # Example
//!
//! ```ignore
//! use burn::optim::AdamConfig;
//! use burn_autoencoders::{ModelConfig, ModelKind, Trainer, TrainConfig};
//! use burn_autoencoders::backends::TrainBackend;
//!
//! let model = ModelConfig::dislib64(ModelKind::Wae, 3, 10)
//!     .with_reg_wt(10.0)
//!     .init::<TrainBackend>(&device)?;
//! let mut trainer = Trainer::new(model, AdamConfig::new().init(), TrainConfig::default());
//! let out = trainer.train_step(batch)?;
//! ```

pub mod backends;
pub mod classifier;
pub mod config;
pub mod data;
pub mod error;
pub mod logger;
pub mod model;
pub mod trainer;
pub mod visualize;

pub use classifier::{Classifier, ClassifierConfig, evaluate_classifier, fit_classifier};
pub use config::{CostAwareConfig, ModelConfig, ModelKind, RunConfig, RunInfo, TrainConfig, run_name};
pub use data::ImageFolder;
pub use error::{Error, Result};
pub use logger::{DirLogger, ImageBatch, Logger, MemoryLogger};
pub use model::{AutoEncoder, Encoded, LatentCache};
pub use trainer::{
    EvalReport, Trainer, evaluate, load_checkpoint, load_latent_cache, save_checkpoint,
    save_latent_cache,
};
pub use visualize::{VizContext, visualize};
