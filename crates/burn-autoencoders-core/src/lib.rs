//! Core building blocks for latent-variable autoencoders
//!
//! This crate holds the model-independent pieces shared by every autoencoder
//! variant in the burn-autoencoders workspace.
//!
//! # Modules
//!
//! - [`latent`] - Point and diagonal-Gaussian latent codes
//! - [`regularize`] - KL, MMD, sliced Wasserstein and norm penalties
//! - [`criterion`] - Reconstruction losses
//! - [`hybrid`] - Dimension-wise shuffling for hybrid samples
//! - [`stats`] - Named running averages for logging
//! - [`traversal`] - Latent traversals, tiling and image size limits
//! - [`output`] - Per-step output container
//!
//! # Example
//!
//! ```ignore
//! use burn_autoencoders_core::regularize::{sample_prior, mmd};
//!
//! let p = sample_prior::<Backend>(batch, latent_dim, &device);
//! let penalty = mmd(p, codes);
//! ```

pub mod criterion;
pub mod error;
pub mod hybrid;
pub mod latent;
pub mod output;
pub mod regularize;
pub mod stats;
pub mod traversal;

pub use criterion::Criterion;
pub use error::{Error, Result};
pub use latent::Latent;
pub use output::StepOutput;
pub use regularize::NormKind;
pub use stats::StatsMeter;
