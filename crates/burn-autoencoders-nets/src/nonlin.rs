//! Activation selection

use burn::prelude::*;
use burn::tensor::activation;
use serde::{Deserialize, Serialize};

/// Elementwise nonlinearity, selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nonlinearity {
    #[default]
    Relu,
    #[serde(rename = "lrelu")]
    LeakyRelu,
    Elu,
    Tanh,
    Sigmoid,
    Silu,
}

const LEAKY_SLOPE: f64 = 0.01;

impl Nonlinearity {
    pub fn apply<B: Backend, const D: usize>(&self, x: Tensor<B, D>) -> Tensor<B, D> {
        match self {
            Self::Relu => activation::relu(x),
            Self::LeakyRelu => activation::leaky_relu(x, LEAKY_SLOPE),
            Self::Elu => {
                let neg = x.clone().clamp_max(0.0).exp().sub_scalar(1.0);
                x.clamp_min(0.0) + neg
            }
            Self::Tanh => activation::tanh(x),
            Self::Sigmoid => activation::sigmoid(x),
            Self::Silu => activation::silu(x),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Relu => "relu",
            Self::LeakyRelu => "lrelu",
            Self::Elu => "elu",
            Self::Tanh => "tanh",
            Self::Sigmoid => "sigmoid",
            Self::Silu => "silu",
        }
    }
}
