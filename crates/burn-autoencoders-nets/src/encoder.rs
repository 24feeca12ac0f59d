//! Encoder and decoder wrappers and their capability traits

use std::collections::BTreeMap;

use burn::module::Ignored;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_autoencoders_core::{Latent, Result};

use crate::dislib::{DislibDecoder, DislibDecoderConfig, DislibEncoder, DislibEncoderConfig};
use crate::head::{FixedStd, LatentHead};
use crate::ladder::{LadderEncoder, LadderEncoderConfig};

/// Something that maps images to latent codes
pub trait Encodable<B: Backend> {
    fn encode(&self, x: Tensor<B, 4>) -> Latent<B>;

    fn latent_dim(&self) -> usize;
}

/// Something that maps latent codes to images
pub trait Decodable<B: Backend> {
    fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 4>;

    /// `[channels, height, width]`
    fn out_shape(&self) -> [usize; 3];
}

/// Encoder architecture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "arch", rename_all = "kebab-case")]
pub enum EncoderArch {
    Dislib(DislibEncoderConfig),
    Ladder(LadderEncoderConfig),
}

/// Full encoder configuration: architecture plus latent head
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    #[serde(flatten)]
    pub arch: EncoderArch,
    #[serde(default)]
    pub head: LatentHead,
}

impl EncoderConfig {
    pub fn dislib(config: DislibEncoderConfig) -> Self {
        Self {
            arch: EncoderArch::Dislib(config),
            head: LatentHead::Point,
        }
    }

    pub fn ladder(config: LadderEncoderConfig) -> Self {
        Self {
            arch: EncoderArch::Ladder(config),
            head: LatentHead::Point,
        }
    }

    pub fn with_head(mut self, head: LatentHead) -> Self {
        self.head = head;
        self
    }

    pub fn latent_dim(&self) -> usize {
        match &self.arch {
            EncoderArch::Dislib(c) => c.latent_dim,
            EncoderArch::Ladder(c) => c.latent_dim(),
        }
    }

    pub fn in_shape(&self) -> [usize; 3] {
        match &self.arch {
            EncoderArch::Dislib(c) => c.in_shape,
            EncoderArch::Ladder(c) => c.in_shape,
        }
    }

    /// Architecture hyperparameters for run summaries
    pub fn hparams(&self) -> BTreeMap<String, String> {
        let mut h = BTreeMap::new();
        match &self.arch {
            EncoderArch::Dislib(c) => {
                h.insert("enc_arch".into(), "dislib".into());
                h.insert("enc_net".into(), c.net_type.name().into());
                h.insert("enc_nonlin".into(), c.nonlin.name().into());
            }
            EncoderArch::Ladder(c) => {
                h.insert("enc_arch".into(), "ladder".into());
                h.insert("enc_nonlin".into(), c.nonlin.name().into());
                h.insert("reverse_order".into(), c.reverse_order.to_string());
            }
        }
        h.insert("latent_dim".into(), self.latent_dim().to_string());
        h.insert("std_type".into(), self.head.std_type().into());
        h
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Encoder<B>> {
        Encoder::new(self, device)
    }
}

/// Encoder: one architecture plus a latent head
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    dislib: Option<DislibEncoder<B>>,
    ladder: Option<LadderEncoder<B>>,
    fixed_std: Option<FixedStd<B>>,
    head: Ignored<LatentHead>,
    latent_dim: usize,
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &EncoderConfig, device: &B::Device) -> Result<Self> {
        let latent_dim = config.latent_dim();
        let width = config.head.output_width(latent_dim);
        let split = matches!(config.head, LatentHead::Normal { .. });

        let (dislib, ladder) = match &config.arch {
            EncoderArch::Dislib(c) => (Some(DislibEncoder::new(c, width, device)?), None),
            EncoderArch::Ladder(c) => (None, Some(LadderEncoder::new(c, split, device)?)),
        };

        let fixed_std = match config.head {
            LatentHead::FixedStd { min_log_std } => {
                Some(FixedStd::new(latent_dim, min_log_std, device))
            }
            _ => None,
        };

        Ok(Self {
            dislib,
            ladder,
            fixed_std,
            head: Ignored(config.head),
            latent_dim,
        })
    }

    pub fn head(&self) -> LatentHead {
        self.head.0
    }

    /// Raw network output before the head is applied
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        match (&self.dislib, &self.ladder) {
            (Some(net), _) => net.forward(x),
            (None, Some(net)) => net.forward(x),
            (None, None) => unreachable!("encoder built without an architecture"),
        }
    }
}

impl<B: Backend> Encodable<B> for Encoder<B> {
    fn encode(&self, x: Tensor<B, 4>) -> Latent<B> {
        let out = self.forward(x);
        match self.head.0 {
            LatentHead::Point => Latent::Point(out),
            LatentHead::Normal { min_log_std } => Latent::from_split(out, min_log_std),
            LatentHead::FixedStd { .. } => match &self.fixed_std {
                Some(head) => head.forward(out),
                None => Latent::Point(out),
            },
        }
    }

    fn latent_dim(&self) -> usize {
        self.latent_dim
    }
}

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "arch", rename_all = "kebab-case")]
pub enum DecoderConfig {
    Dislib(DislibDecoderConfig),
}

impl DecoderConfig {
    pub fn latent_dim(&self) -> usize {
        match self {
            Self::Dislib(c) => c.latent_dim,
        }
    }

    pub fn out_shape(&self) -> [usize; 3] {
        match self {
            Self::Dislib(c) => c.out_shape,
        }
    }

    pub fn hparams(&self) -> BTreeMap<String, String> {
        let mut h = BTreeMap::new();
        match self {
            Self::Dislib(c) => {
                h.insert("dec_arch".into(), "dislib".into());
                h.insert("dec_net".into(), c.net_type.name().into());
                h.insert("dec_nonlin".into(), c.nonlin.name().into());
            }
        }
        h
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<Decoder<B>> {
        Decoder::new(self, device)
    }
}

/// Decoder
#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    dislib: DislibDecoder<B>,
    out_shape: Ignored<[usize; 3]>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(config: &DecoderConfig, device: &B::Device) -> Result<Self> {
        match config {
            DecoderConfig::Dislib(c) => Ok(Self {
                dislib: DislibDecoder::new(c, device)?,
                out_shape: Ignored(c.out_shape),
            }),
        }
    }
}

impl<B: Backend> Decodable<B> for Decoder<B> {
    fn decode(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.dislib.forward(z)
    }

    fn out_shape(&self) -> [usize; 3] {
        self.out_shape.0
    }
}
