//! Convolution stack planning and construction
//!
//! Stacks are planned so that every layer changes the spatial size by exactly
//! its stride: downsampling convs divide it, transposed convs multiply it.
//! Padding is `(kernel - stride) / 2`, which requires `kernel - stride` to be even.

use burn::module::Ignored;
use burn::nn::{
    PaddingConfig2d,
    conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
};
use burn::prelude::*;

use burn_autoencoders_core::{Error, Result};

use crate::nonlin::Nonlinearity;

/// Settings of a single (transposed) convolution layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvSetting {
    /// Input channels
    pub in_channels: usize,
    /// Output channels
    pub out_channels: usize,
    /// Square kernel size
    pub kernel: usize,
    /// Spatial scale factor (divides for convs, multiplies for transposed convs)
    pub stride: usize,
    /// `(kernel - stride) / 2` on every side
    pub padding: usize,
}

fn padding_for(kernel: usize, stride: usize) -> Result<usize> {
    if kernel < stride || (kernel - stride) % 2 != 0 {
        return Err(Error::InvalidConfig(format!(
            "kernel {kernel} with stride {stride} cannot resize evenly"
        )));
    }
    Ok((kernel - stride) / 2)
}

fn check_lengths(channels: &[usize], kernels: &[usize], strides: &[usize]) -> Result<()> {
    if channels.len() != kernels.len() || channels.len() != strides.len() {
        return Err(Error::InvalidConfig(format!(
            "conv plan lengths differ: {} channels, {} kernels, {} strides",
            channels.len(),
            kernels.len(),
            strides.len()
        )));
    }
    if channels.is_empty() {
        return Err(Error::InvalidConfig("conv plan has no layers".into()));
    }
    Ok(())
}

/// Plans a downsampling conv stack
///
/// Returns the shape after every layer (starting with `in_shape`) and the
/// settings of each layer. `channels[i]` is the output width of layer `i`.
pub fn plan_conv(
    in_shape: [usize; 3],
    channels: &[usize],
    kernels: &[usize],
    strides: &[usize],
) -> Result<(Vec<[usize; 3]>, Vec<ConvSetting>)> {
    check_lengths(channels, kernels, strides)?;

    let mut shapes = vec![in_shape];
    let mut settings = Vec::with_capacity(channels.len());
    let [mut c, mut h, mut w] = in_shape;

    for ((&out, &k), &s) in channels.iter().zip(kernels).zip(strides) {
        if h % s != 0 || w % s != 0 {
            return Err(Error::InvalidConfig(format!(
                "{h}x{w} is not divisible by stride {s}"
            )));
        }
        settings.push(ConvSetting {
            in_channels: c,
            out_channels: out,
            kernel: k,
            stride: s,
            padding: padding_for(k, s)?,
        });
        c = out;
        h /= s;
        w /= s;
        shapes.push([c, h, w]);
    }

    Ok((shapes, settings))
}

/// Plans an upsampling transposed-conv stack ending at `out_shape`
///
/// `channels[i]` is the input width of layer `i`; the last layer outputs
/// `out_shape[0]` channels. Returns the shape before every layer followed by
/// `out_shape`, and the settings of each layer.
pub fn plan_deconv(
    out_shape: [usize; 3],
    channels: &[usize],
    kernels: &[usize],
    strides: &[usize],
) -> Result<(Vec<[usize; 3]>, Vec<ConvSetting>)> {
    check_lengths(channels, kernels, strides)?;

    let [out_c, out_h, out_w] = out_shape;
    let total: usize = strides.iter().product();
    if out_h % total != 0 || out_w % total != 0 {
        return Err(Error::InvalidConfig(format!(
            "{out_h}x{out_w} is not divisible by total stride {total}"
        )));
    }

    let (mut h, mut w) = (out_h / total, out_w / total);
    let mut shapes = Vec::with_capacity(channels.len() + 1);
    let mut settings = Vec::with_capacity(channels.len());

    for (i, ((&c, &k), &s)) in channels.iter().zip(kernels).zip(strides).enumerate() {
        let next = channels.get(i + 1).copied().unwrap_or(out_c);
        shapes.push([c, h, w]);
        settings.push(ConvSetting {
            in_channels: c,
            out_channels: next,
            kernel: k,
            stride: s,
            padding: padding_for(k, s)?,
        });
        h *= s;
        w *= s;
    }
    shapes.push(out_shape);

    Ok((shapes, settings))
}

/// Downsampling conv stack
#[derive(Module, Debug)]
pub struct ConvStack<B: Backend> {
    layers: Vec<Conv2d<B>>,
    nonlin: Ignored<Nonlinearity>,
}

impl<B: Backend> ConvStack<B> {
    pub fn new(settings: &[ConvSetting], nonlin: Nonlinearity, device: &B::Device) -> Self {
        let layers = settings
            .iter()
            .map(|s| {
                Conv2dConfig::new([s.in_channels, s.out_channels], [s.kernel, s.kernel])
                    .with_stride([s.stride, s.stride])
                    .with_padding(PaddingConfig2d::Explicit(s.padding, s.padding))
                    .init(device)
            })
            .collect();

        Self {
            layers,
            nonlin: Ignored(nonlin),
        }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Applies one layer followed by the nonlinearity
    pub fn forward_layer(&self, index: usize, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.nonlin.apply(self.layers[index].forward(x))
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        (0..self.layers.len()).fold(x, |h, i| self.forward_layer(i, h))
    }
}

/// Upsampling transposed-conv stack with a separate output nonlinearity
#[derive(Module, Debug)]
pub struct DeconvStack<B: Backend> {
    layers: Vec<ConvTranspose2d<B>>,
    nonlin: Ignored<Nonlinearity>,
    out_nonlin: Ignored<Nonlinearity>,
}

impl<B: Backend> DeconvStack<B> {
    pub fn new(
        settings: &[ConvSetting],
        nonlin: Nonlinearity,
        out_nonlin: Nonlinearity,
        device: &B::Device,
    ) -> Self {
        let layers = settings
            .iter()
            .map(|s| {
                ConvTranspose2dConfig::new([s.in_channels, s.out_channels], [s.kernel, s.kernel])
                    .with_stride([s.stride, s.stride])
                    .with_padding([s.padding, s.padding])
                    .init(device)
            })
            .collect();

        Self {
            layers,
            nonlin: Ignored(nonlin),
            out_nonlin: Ignored(out_nonlin),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let last = self.layers.len() - 1;
        let mut h = x;
        for (i, layer) in self.layers.iter().enumerate() {
            h = layer.forward(h);
            h = if i < last {
                self.nonlin.apply(h)
            } else {
                self.out_nonlin.apply(h)
            };
        }
        h
    }
}
