//! Disentanglement-lib encoder and decoder
//!
//! The standard architectures used for disentanglement benchmarks on 64x64
//! (dSprites, 3D Shapes, ...) and 128x128 images:
//!
//! - conv encoder: 4x4/2x2 strided convs, then a 256-unit dense layer
//! - fc encoder: two 1200-unit dense layers
//! - conv decoder: 256-unit dense layer, then 4x4 strided transposed convs
//! - fc decoder: three 1200-unit dense layers
//!
//! For 64x64 inputs the first encoder layer and the last decoder layer of the
//! 128x128 plan are dropped.

use burn::module::Ignored;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use burn_autoencoders_core::{Error, Result};

use crate::conv::{ConvStack, DeconvStack, plan_conv, plan_deconv};
use crate::mlp::Mlp;
use crate::nonlin::Nonlinearity;

const ENC_CHANNELS: [usize; 5] = [32, 32, 32, 64, 64];
const ENC_KERNELS: [usize; 5] = [4, 4, 4, 2, 2];
const DEC_CHANNELS: [usize; 5] = [64, 64, 32, 32, 32];
const DEC_KERNEL: usize = 4;
const STRIDE: usize = 2;

const CONV_HIDDEN: [usize; 1] = [256];
const FC_ENC_HIDDEN: [usize; 2] = [1200, 1200];
const FC_DEC_HIDDEN: [usize; 3] = [1200, 1200, 1200];

/// Network family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetType {
    #[default]
    Conv,
    Fc,
}

impl NetType {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Conv => "conv",
            Self::Fc => "fc",
        }
    }
}

fn check_size(shape: [usize; 3]) -> Result<()> {
    let [_, h, w] = shape;
    if (h, w) != (64, 64) && (h, w) != (128, 128) {
        return Err(Error::UnsupportedSize {
            height: h,
            width: w,
            expected: "64x64 or 128x128",
        });
    }
    Ok(())
}

/// Disentanglement-lib encoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DislibEncoderConfig {
    /// Input shape `[channels, height, width]`
    pub in_shape: [usize; 3],
    /// Width of the latent code (doubled internally for a normal head)
    pub latent_dim: usize,
    /// Hidden activation
    pub nonlin: Nonlinearity,
    /// Convolutional or fully connected
    pub net_type: NetType,
}

impl Default for DislibEncoderConfig {
    fn default() -> Self {
        Self {
            in_shape: [1, 64, 64],
            latent_dim: 10,
            nonlin: Nonlinearity::Relu,
            net_type: NetType::Conv,
        }
    }
}

impl DislibEncoderConfig {
    /// Conv encoder for 64x64 images
    pub fn conv64(channels: usize, latent_dim: usize) -> Self {
        Self {
            in_shape: [channels, 64, 64],
            latent_dim,
            ..Self::default()
        }
    }

    /// Fully-connected encoder for 64x64 images
    pub fn fc64(channels: usize, latent_dim: usize) -> Self {
        Self {
            net_type: NetType::Fc,
            ..Self::conv64(channels, latent_dim)
        }
    }
}

/// Disentanglement-lib encoder
#[derive(Module, Debug)]
pub struct DislibEncoder<B: Backend> {
    conv: Option<ConvStack<B>>,
    net: Mlp<B>,
}

impl<B: Backend> DislibEncoder<B> {
    /// Creates the encoder with `out_width` outputs (the latent width times the
    /// head's width factor)
    pub fn new(config: &DislibEncoderConfig, out_width: usize, device: &B::Device) -> Result<Self> {
        check_size(config.in_shape)?;
        let [c, h, w] = config.in_shape;

        match config.net_type {
            NetType::Conv => {
                let skip = usize::from(h == 64);
                let (shapes, settings) = plan_conv(
                    config.in_shape,
                    &ENC_CHANNELS[skip..],
                    &ENC_KERNELS[skip..],
                    &[STRIDE; 5][skip..],
                )?;
                let [oc, oh, ow] = shapes[shapes.len() - 1];

                Ok(Self {
                    conv: Some(ConvStack::new(&settings, config.nonlin, device)),
                    net: Mlp::new(oc * oh * ow, out_width, &CONV_HIDDEN, config.nonlin, None, device),
                })
            }
            NetType::Fc => Ok(Self {
                conv: None,
                net: Mlp::new(c * h * w, out_width, &FC_ENC_HIDDEN, config.nonlin, None, device),
            }),
        }
    }

    /// `[batch, c, h, w]` -> `[batch, out_width]`
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let c = match &self.conv {
            Some(conv) => conv.forward(x),
            None => x,
        };
        self.net.forward_flat(c)
    }
}

/// Disentanglement-lib decoder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DislibDecoderConfig {
    /// Width of the latent code
    pub latent_dim: usize,
    /// Output shape `[channels, height, width]`
    pub out_shape: [usize; 3],
    /// Hidden activation
    pub nonlin: Nonlinearity,
    /// Convolutional or fully connected
    pub net_type: NetType,
}

impl Default for DislibDecoderConfig {
    fn default() -> Self {
        Self {
            latent_dim: 10,
            out_shape: [1, 64, 64],
            nonlin: Nonlinearity::Relu,
            net_type: NetType::Conv,
        }
    }
}

impl DislibDecoderConfig {
    /// Conv decoder for 64x64 images
    pub fn conv64(channels: usize, latent_dim: usize) -> Self {
        Self {
            latent_dim,
            out_shape: [channels, 64, 64],
            ..Self::default()
        }
    }

    /// Fully-connected decoder for 64x64 images
    pub fn fc64(channels: usize, latent_dim: usize) -> Self {
        Self {
            net_type: NetType::Fc,
            ..Self::conv64(channels, latent_dim)
        }
    }
}

/// Disentanglement-lib decoder, producing images in (0, 1)
#[derive(Module, Debug)]
pub struct DislibDecoder<B: Backend> {
    net: Mlp<B>,
    deconv: Option<DeconvStack<B>>,
    /// Shape the dense output is reshaped to before the deconv stack (or the
    /// final output shape for fc decoders)
    grid: Ignored<[usize; 3]>,
}

impl<B: Backend> DislibDecoder<B> {
    pub fn new(config: &DislibDecoderConfig, device: &B::Device) -> Result<Self> {
        check_size(config.out_shape)?;
        let [c, h, w] = config.out_shape;

        match config.net_type {
            NetType::Conv => {
                let keep = if h == 64 { 4 } else { 5 };
                let (shapes, settings) = plan_deconv(
                    config.out_shape,
                    &DEC_CHANNELS[..keep],
                    &[DEC_KERNEL; 5][..keep],
                    &[STRIDE; 5][..keep],
                )?;
                let grid = shapes[0];
                let [gc, gh, gw] = grid;

                Ok(Self {
                    net: Mlp::new(
                        config.latent_dim,
                        gc * gh * gw,
                        &CONV_HIDDEN,
                        config.nonlin,
                        None,
                        device,
                    ),
                    deconv: Some(DeconvStack::new(
                        &settings,
                        config.nonlin,
                        Nonlinearity::Sigmoid,
                        device,
                    )),
                    grid: Ignored(grid),
                })
            }
            NetType::Fc => Ok(Self {
                net: Mlp::new(
                    config.latent_dim,
                    c * h * w,
                    &FC_DEC_HIDDEN,
                    config.nonlin,
                    Some(Nonlinearity::Sigmoid),
                    device,
                ),
                deconv: None,
                grid: Ignored(config.out_shape),
            }),
        }
    }

    /// `[batch, latent_dim]` -> `[batch, c, h, w]`
    pub fn forward(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = z.dims();
        let [c, h, w] = self.grid.0;
        let x = self.net.forward(z).reshape([batch, c, h, w]);

        match &self.deconv {
            Some(deconv) => deconv.forward(x),
            None => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_rejects_unsupported_sizes() {
        let device = Default::default();
        let config = DislibEncoderConfig {
            in_shape: [3, 32, 32],
            ..Default::default()
        };
        let err = DislibEncoder::<TestBackend>::new(&config, 10, &device).unwrap_err();
        assert!(matches!(err, Error::UnsupportedSize { height: 32, .. }));

        let config = DislibDecoderConfig {
            out_shape: [3, 64, 32],
            ..Default::default()
        };
        assert!(DislibDecoder::<TestBackend>::new(&config, &device).is_err());
    }

    #[test]
    fn test_conv64_round_trip_shapes() {
        let device = Default::default();
        let enc = DislibEncoder::<TestBackend>::new(&DislibEncoderConfig::conv64(1, 6), 6, &device)
            .unwrap();
        let dec = DislibDecoder::<TestBackend>::new(&DislibDecoderConfig::conv64(1, 6), &device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::zeros([2, 1, 64, 64], &device);
        let q = enc.forward(x);
        assert_eq!(q.dims(), [2, 6]);

        let rec = dec.forward(q);
        assert_eq!(rec.dims(), [2, 1, 64, 64]);
    }

    #[test]
    fn test_fc64_shapes() {
        let device = Default::default();
        let enc = DislibEncoder::<TestBackend>::new(&DislibEncoderConfig::fc64(3, 4), 8, &device)
            .unwrap();
        let dec = DislibDecoder::<TestBackend>::new(&DislibDecoderConfig::fc64(3, 4), &device)
            .unwrap();

        let x = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        assert_eq!(enc.forward(x).dims(), [1, 8]);

        let z = Tensor::<TestBackend, 2>::zeros([1, 4], &device);
        let rec: Vec<f32> = dec.forward(z).into_data().to_vec().unwrap();
        assert_eq!(rec.len(), 3 * 64 * 64);
        assert!(rec.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_config_from_json() {
        let config: DislibEncoderConfig =
            serde_json::from_str(r#"{"in_shape": [3, 128, 128], "net_type": "fc"}"#).unwrap();
        assert_eq!(config.net_type, NetType::Fc);
        assert_eq!(config.latent_dim, 10);
    }
}
