//! Encoder and decoder networks for latent-variable autoencoders
//!
//! # Architectures
//!
//! - [`dislib`] - Disentanglement-lib conv/fc encoder and decoder (64x64, 128x128)
//! - [`ladder`] - Ladder encoder with one latent rung per conv layer
//!
//! # Building Blocks
//!
//! - [`mlp`] - Dense stacks
//! - [`conv`] - Strided conv / transposed-conv planning
//! - [`head`] - Point, normal and fixed-std latent heads
//! - [`nonlin`] - Configurable activations
//!
//! # Example
//!
//! ```ignore
//! use burn_autoencoders_nets::{EncoderConfig, DecoderConfig, LatentHead};
//! use burn_autoencoders_nets::dislib::{DislibEncoderConfig, DislibDecoderConfig};
//!
//! let encoder = EncoderConfig::dislib(DislibEncoderConfig::conv64(3, 10))
//!     .with_head(LatentHead::Normal { min_log_std: None })
//!     .init::<Backend>(&device)?;
//! let decoder = DecoderConfig::Dislib(DislibDecoderConfig::conv64(3, 10)).init(&device)?;
//! ```

pub mod conv;
pub mod dislib;
pub mod encoder;
pub mod head;
pub mod ladder;
pub mod mlp;
pub mod nonlin;

pub use encoder::{
    Decodable, Decoder, DecoderConfig, Encodable, Encoder, EncoderArch, EncoderConfig,
};
pub use head::LatentHead;
pub use nonlin::Nonlinearity;
