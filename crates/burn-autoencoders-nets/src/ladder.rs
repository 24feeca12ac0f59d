//! Ladder encoder
//!
//! A conv stack whose intermediate feature maps each feed a small dense "rung".
//! The rung outputs are concatenated into the latent code, so early rungs see
//! low-level features and late rungs see abstract ones.

use burn::module::Ignored;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_autoencoders_core::{Error, Result};

use crate::conv::{ConvStack, plan_conv};
use crate::mlp::Mlp;
use crate::nonlin::Nonlinearity;

/// Latent width contributed by each layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RungDims {
    /// Same width at every layer
    Uniform(usize),
    /// Width per layer; `None` means the layer has no rung
    PerLayer(Vec<Option<usize>>),
}

impl RungDims {
    fn resolve(&self, layers: usize) -> Vec<Option<usize>> {
        match self {
            Self::Uniform(d) => vec![Some(*d); layers],
            Self::PerLayer(dims) => dims.clone(),
        }
    }
}

/// Ladder encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LadderEncoderConfig {
    /// Input shape `[channels, height, width]`
    pub in_shape: [usize; 3],
    /// Output channels of each conv layer
    pub channels: Vec<usize>,
    /// Kernel size of each conv layer
    pub kernels: Vec<usize>,
    /// Stride of each conv layer
    pub strides: Vec<usize>,
    pub nonlin: Nonlinearity,
    /// Latent width of each rung
    pub rung_dims: RungDims,
    /// Hidden widths of every rung
    pub rung_hidden: Vec<usize>,
    /// Concatenate rungs from the deepest layer first
    pub reverse_order: bool,
}

impl Default for LadderEncoderConfig {
    fn default() -> Self {
        Self {
            in_shape: [1, 64, 64],
            channels: vec![32, 32, 64, 64],
            kernels: vec![4, 4, 4, 4],
            strides: vec![2, 2, 2, 2],
            nonlin: Nonlinearity::Elu,
            rung_dims: RungDims::Uniform(3),
            rung_hidden: vec![128],
            reverse_order: false,
        }
    }
}

impl LadderEncoderConfig {
    /// Total latent width (before any distribution doubling)
    pub fn latent_dim(&self) -> usize {
        self.rung_dims
            .resolve(self.channels.len())
            .into_iter()
            .flatten()
            .sum()
    }
}

/// Ladder encoder
#[derive(Module, Debug)]
pub struct LadderEncoder<B: Backend> {
    layers: ConvStack<B>,
    rungs: Vec<Option<Mlp<B>>>,
    /// Output width of each present rung, in layer order
    widths: Ignored<Vec<usize>>,
    /// Rungs emit `[loc | log_std]` halves that must stay grouped
    split: bool,
    reverse_order: bool,
}

impl<B: Backend> LadderEncoder<B> {
    /// Creates the encoder; `split` doubles every rung for a normal head
    pub fn new(config: &LadderEncoderConfig, split: bool, device: &B::Device) -> Result<Self> {
        let (shapes, settings) = plan_conv(
            config.in_shape,
            &config.channels,
            &config.kernels,
            &config.strides,
        )?;

        let mut dims = config.rung_dims.resolve(settings.len());
        if dims.len() != settings.len() {
            return Err(Error::InvalidConfig(format!(
                "{} rung dims for {} layers",
                dims.len(),
                settings.len()
            )));
        }
        if split {
            dims = dims.into_iter().map(|d| d.map(|d| 2 * d)).collect();
        }

        let total: usize = dims.iter().flatten().sum();
        if total == 0 {
            return Err(Error::InvalidConfig("ladder encoder has no latent dim".into()));
        }

        // Layers past the last rung never contribute
        while dims.last() == Some(&None) {
            dims.pop();
        }
        let depth = dims.len();

        let rungs = dims
            .iter()
            .zip(&shapes[1..])
            .map(|(dim, &[c, h, w])| {
                dim.map(|d| Mlp::new(c * h * w, d, &config.rung_hidden, config.nonlin, None, device))
            })
            .collect();

        Ok(Self {
            layers: ConvStack::new(&settings[..depth], config.nonlin, device),
            rungs,
            widths: Ignored(dims.into_iter().flatten().collect()),
            split,
            reverse_order: config.reverse_order,
        })
    }

    /// Raw output width (twice the latent width when split)
    pub fn out_width(&self) -> usize {
        self.widths.iter().sum()
    }

    /// Number of conv layers kept
    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// `[batch, c, h, w]` -> `[batch, out_width]`
    ///
    /// When split, the output is laid out as `[loc of every rung | log_std of
    /// every rung]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, ..] = x.dims();

        let mut outs = Vec::with_capacity(self.widths.len());
        let mut c = x;
        for (i, rung) in self.rungs.iter().enumerate() {
            c = self.layers.forward_layer(i, c);
            if let Some(rung) = rung {
                outs.push(rung.forward_flat(c.clone()));
            }
        }
        if self.reverse_order {
            outs.reverse();
        }

        if self.split {
            let halves = outs
                .into_iter()
                .map(|q| {
                    let [b, w] = q.dims();
                    q.reshape([b, 2, w / 2])
                })
                .collect();
            Tensor::cat(halves, 2).reshape([batch, self.out_width()])
        } else {
            Tensor::cat(outs, 1)
        }
    }
}
