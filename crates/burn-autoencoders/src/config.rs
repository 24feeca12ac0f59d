//! Model and run configuration
//!
//! Runs are described by a single JSON document:
//!
//! ```json
//! {
//!   "info": { "model_type": "wae", "dataset": "shapes", "arch": "conv" },
//!   "model": {
//!     "kind": "wae",
//!     "reg_wt": 10.0,
//!     "encoder": { "arch": "dislib", "in_shape": [3, 64, 64], "latent_dim": 10 },
//!     "decoder": { "arch": "dislib", "out_shape": [3, 64, 64], "latent_dim": 10 }
//!   },
//!   "train": { "iterations": 10000, "batch_size": 64 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use burn_autoencoders_core::{Criterion, NormKind};
use burn_autoencoders_nets::dislib::{DislibDecoderConfig, DislibEncoderConfig};
use burn_autoencoders_nets::{DecoderConfig, EncoderConfig, LatentHead};

use crate::error::{Error, Result};

/// Autoencoder variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Plain autoencoder, optional norm penalty, hybrid generation
    #[default]
    Ae,
    /// Variational autoencoder (KL against N(0, I))
    Vae,
    /// Wasserstein autoencoder (MMD against N(0, I))
    Wae,
    /// Sliced Wasserstein autoencoder
    Swae,
    /// Cost-aware autoencoder with a norm prior penalty
    Cae,
    /// Cost-aware WAE
    Cwae,
    /// Cost-aware sliced WAE
    Cswae,
    /// Cost-aware VAE (importance sets the posterior scale)
    Cvae,
}

/// How the prior part of the regularizer is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorReg {
    Norm(NormKind),
    Kl,
    Mmd,
    Sliced,
}

/// How the learned importance enters the encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportanceMode {
    /// Codes are mixed with prior noise: `v * q + (1 - v) * p`
    Deterministic,
    /// Importance becomes the posterior scale: `N(q, v)`
    Stochastic,
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ae => "ae",
            Self::Vae => "vae",
            Self::Wae => "wae",
            Self::Swae => "swae",
            Self::Cae => "cae",
            Self::Cwae => "cwae",
            Self::Cswae => "cswae",
            Self::Cvae => "cvae",
        }
    }

    /// Generates from the prior rather than from hybrids
    pub fn has_prior(&self) -> bool {
        !matches!(self, Self::Ae)
    }

    pub fn importance(&self) -> Option<ImportanceMode> {
        match self {
            Self::Cae | Self::Cwae | Self::Cswae => Some(ImportanceMode::Deterministic),
            Self::Cvae => Some(ImportanceMode::Stochastic),
            _ => None,
        }
    }

    pub fn is_cost_aware(&self) -> bool {
        self.importance().is_some()
    }

    pub fn prior_reg(&self, norm: NormKind) -> PriorReg {
        match self {
            Self::Ae | Self::Cae => PriorReg::Norm(norm),
            Self::Vae | Self::Cvae => PriorReg::Kl,
            Self::Wae | Self::Cwae => PriorReg::Mmd,
            Self::Swae | Self::Cswae => PriorReg::Sliced,
        }
    }
}

impl PriorReg {
    /// Short name used in hyperparameter summaries
    pub fn name(&self) -> &'static str {
        match self {
            Self::Norm(kind) => kind.name(),
            Self::Kl => "KL",
            Self::Mmd => "W",
            Self::Sliced => "SW",
        }
    }
}

/// Cost-aware importance settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostAwareConfig {
    /// Exponent of the importance penalty `sum(v^p)`
    pub reg_imp_p: f64,
    /// Weight of the importance penalty
    pub reg_imp_wt: f64,
    /// Weight of the prior regularizer
    pub reg_prior_wt: f64,
    /// Mean of the initial importance logits
    pub init_imp_mu: f64,
    /// Std of the initial importance logits
    pub init_imp_std: f64,
    /// Scale codes and prior samples by the (detached) importance before
    /// measuring their distance
    pub weigh_distances: bool,
    /// Std of noise added to the importance logits while encoding
    pub imp_noise: f64,
}

impl Default for CostAwareConfig {
    fn default() -> Self {
        Self {
            reg_imp_p: 1.0,
            reg_imp_wt: 0.5,
            reg_prior_wt: 1.0,
            init_imp_mu: 0.0,
            init_imp_std: 1.0,
            weigh_distances: false,
            imp_noise: 0.0,
        }
    }
}

/// Autoencoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Variant (defaults to `ae`)
    #[serde(default)]
    pub kind: ModelKind,
    pub encoder: EncoderConfig,
    pub decoder: DecoderConfig,
    /// Reconstruction loss (defaults to BCE)
    #[serde(default)]
    pub criterion: Criterion,
    /// Weight of the regularizer (0 disables it)
    #[serde(default)]
    pub reg_wt: f64,
    /// Norm used by `ae` and `cae`
    #[serde(default)]
    pub reg: NormKind,
    /// Log generated samples during training too
    #[serde(default)]
    pub viz_gen: bool,
    /// Projections for sliced models (defaults to the latent dim)
    #[serde(default)]
    pub slices: Option<usize>,
    /// Importance settings, used by the cost-aware kinds only
    #[serde(default)]
    pub cost_aware: CostAwareConfig,
}

impl ModelConfig {
    pub fn new(kind: ModelKind, encoder: EncoderConfig, decoder: DecoderConfig) -> Self {
        Self {
            kind,
            encoder,
            decoder,
            criterion: Criterion::Bce,
            reg_wt: 0.0,
            reg: NormKind::L2,
            viz_gen: false,
            slices: None,
            cost_aware: CostAwareConfig::default(),
        }
    }

    /// Disentanglement-lib conv encoder/decoder pair for 64x64 images
    ///
    /// VAE-style kinds get a normal head on the encoder.
    pub fn dislib64(kind: ModelKind, channels: usize, latent_dim: usize) -> Self {
        let mut encoder = EncoderConfig::dislib(DislibEncoderConfig::conv64(channels, latent_dim));
        if kind == ModelKind::Vae {
            encoder = encoder.with_head(LatentHead::Normal { min_log_std: None });
        }
        let decoder = DecoderConfig::Dislib(DislibDecoderConfig::conv64(channels, latent_dim));
        Self::new(kind, encoder, decoder)
    }

    pub fn with_reg_wt(mut self, reg_wt: f64) -> Self {
        self.reg_wt = reg_wt;
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_slices(mut self, slices: usize) -> Self {
        self.slices = Some(slices);
        self
    }

    pub fn with_cost_aware(mut self, cost_aware: CostAwareConfig) -> Self {
        self.cost_aware = cost_aware;
        self
    }

    pub fn with_viz_gen(mut self, viz_gen: bool) -> Self {
        self.viz_gen = viz_gen;
        self
    }

    pub fn latent_dim(&self) -> usize {
        self.encoder.latent_dim()
    }

    pub fn slices(&self) -> usize {
        self.slices.unwrap_or_else(|| self.latent_dim())
    }

    pub fn prior_reg(&self) -> PriorReg {
        self.kind.prior_reg(self.reg)
    }

    /// Checks cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if matches!(self.kind, ModelKind::Vae | ModelKind::Cvae) && self.reg_wt <= 0.0 {
            return Err(Error::MissingRegularization(self.reg_wt));
        }

        let (enc, dec) = (self.encoder.latent_dim(), self.decoder.latent_dim());
        if enc != dec {
            return Err(burn_autoencoders_core::Error::ShapeMismatch {
                expected: vec![enc],
                actual: vec![dec],
            }
            .into());
        }

        let (input, output) = (self.encoder.in_shape(), self.decoder.out_shape());
        if input != output {
            return Err(burn_autoencoders_core::Error::ShapeMismatch {
                expected: input.to_vec(),
                actual: output.to_vec(),
            }
            .into());
        }

        if self.slices == Some(0) {
            return Err(
                burn_autoencoders_core::Error::InvalidConfig("slices must be positive".into())
                    .into(),
            );
        }

        Ok(())
    }
}

/// Optimization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Total optimizer steps
    pub iterations: usize,
    pub batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Visualize every this many iterations (0 disables)
    pub viz_every: usize,
    /// Save a checkpoint every this many iterations (0 disables)
    pub save_every: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            iterations: 10_000,
            batch_size: 64,
            learning_rate: 1e-3,
            viz_every: 500,
            save_every: 5_000,
        }
    }
}

/// Labels used to name a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunInfo {
    pub model_type: Option<String>,
    pub dataset: Option<String>,
    pub arch: Option<String>,
    pub extra: Option<String>,
}

/// Complete run description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub info: RunInfo,
    pub model: ModelConfig,
    #[serde(default)]
    pub train: TrainConfig,
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `{model}_{dataset}[_{arch}][_{extra}]`
    ///
    /// The model falls back to the configured kind and the dataset to
    /// `dataset_fallback` (typically the data directory name).
    pub fn run_name(&self, dataset_fallback: Option<&str>) -> String {
        let model = self
            .info
            .model_type
            .as_deref()
            .unwrap_or_else(|| self.model.kind.name());
        let data = self.info.dataset.as_deref().or(dataset_fallback);
        run_name(
            model,
            data,
            self.info.arch.as_deref(),
            self.info.extra.as_deref(),
        )
    }
}

/// Builds a run name from its parts; a missing dataset is written as `None`
pub fn run_name(model: &str, data: Option<&str>, arch: Option<&str>, extra: Option<&str>) -> String {
    let mut name = format!("{model}_{}", data.unwrap_or("None"));
    if let Some(arch) = arch {
        name.push('_');
        name.push_str(arch);
    }
    if let Some(extra) = extra {
        name.push('_');
        name.push_str(extra);
    }
    name
}
