//! Latent heads: how raw encoder outputs become latent codes

use burn::module::{Ignored, Param};
use burn::prelude::*;
use burn::tensor::Distribution;
use serde::{Deserialize, Serialize};

use burn_autoencoders_core::Latent;

/// Interpretation of an encoder's output
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LatentHead {
    /// The output is the code itself
    #[default]
    Point,
    /// The output is `[loc | log_std]`, twice the latent width
    Normal {
        #[serde(default)]
        min_log_std: Option<f64>,
    },
    /// The output is the mean; a learned per-dimension `log_std` is shared
    /// across the batch
    FixedStd {
        #[serde(default)]
        min_log_std: Option<f64>,
    },
}

impl LatentHead {
    /// Raw output width for a given latent dimensionality
    pub fn output_width(&self, latent_dim: usize) -> usize {
        match self {
            Self::Normal { .. } => 2 * latent_dim,
            _ => latent_dim,
        }
    }

    pub fn is_distribution(&self) -> bool {
        !matches!(self, Self::Point)
    }

    pub fn std_type(&self) -> &'static str {
        match self {
            Self::Point => "none",
            Self::Normal { .. } => "learned",
            Self::FixedStd { .. } => "fixed",
        }
    }
}

/// Learned log standard deviation shared across the batch
#[derive(Module, Debug)]
pub struct FixedStd<B: Backend> {
    pub log_std: Param<Tensor<B, 1>>,
    min_log_std: Ignored<Option<f64>>,
}

impl<B: Backend> FixedStd<B> {
    /// Initialises `log_std ~ N(0, 0.1^2)`
    pub fn new(latent_dim: usize, min_log_std: Option<f64>, device: &B::Device) -> Self {
        let init = Tensor::random([latent_dim], Distribution::Normal(0.0, 0.1), device);
        Self {
            log_std: Param::from_tensor(init),
            min_log_std: Ignored(min_log_std),
        }
    }

    /// Wraps point estimates `[batch, dim]` into a normal latent
    pub fn forward(&self, mu: Tensor<B, 2>) -> Latent<B> {
        let mut log_std = self.log_std.val();
        if let Some(min) = self.min_log_std.0 {
            log_std = log_std.clamp_min(min);
        }
        let scale = log_std.exp().unsqueeze::<2>().expand(mu.dims());
        Latent::Normal { loc: mu, scale }
    }
}
