//! Per-step outputs

use std::collections::BTreeMap;

use burn::prelude::*;
use burn::tensor::ElementConversion;
use burn::tensor::backend::AutodiffBackend;

use crate::latent::Latent;

/// Everything a training or evaluation step produced
#[derive(Debug, Clone)]
pub struct StepOutput<B: Backend> {
    /// Input batch, `[batch, c, h, w]`
    pub original: Tensor<B, 4>,
    pub reconstruction: Option<Tensor<B, 4>>,
    pub latent: Option<Latent<B>>,
    pub rec_loss: Option<Tensor<B, 1>>,
    pub reg_loss: Option<Tensor<B, 1>>,
    /// Total objective
    pub loss: Option<Tensor<B, 1>>,
}

impl<B: Backend> StepOutput<B> {
    pub fn new(original: Tensor<B, 4>) -> Self {
        Self {
            original,
            reconstruction: None,
            latent: None,
            rec_loss: None,
            reg_loss: None,
            loss: None,
        }
    }

    /// Scalar entries as plain numbers
    pub fn scalars(&self) -> BTreeMap<&'static str, f64> {
        let mut out = BTreeMap::new();
        for (name, value) in [
            ("rec_loss", &self.rec_loss),
            ("reg_loss", &self.reg_loss),
            ("loss", &self.loss),
        ] {
            if let Some(v) = value {
                out.insert(name, to_f64(v.clone()));
            }
        }
        out
    }
}

impl<B: AutodiffBackend> StepOutput<B> {
    /// Drops the autograd graph and moves every tensor to the inner backend
    pub fn inner(self) -> StepOutput<B::InnerBackend> {
        StepOutput {
            original: self.original.inner(),
            reconstruction: self.reconstruction.map(Tensor::inner),
            latent: self.latent.map(Latent::inner),
            rec_loss: self.rec_loss.map(Tensor::inner),
            reg_loss: self.reg_loss.map(Tensor::inner),
            loss: self.loss.map(Tensor::inner),
        }
    }
}

/// Reads a single-element tensor
pub fn to_f64<B: Backend>(t: Tensor<B, 1>) -> f64 {
    t.into_scalar().elem::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_scalars_skip_missing() {
        let device = Default::default();
        let mut out = StepOutput::new(Tensor::<TestBackend, 4>::zeros([1, 1, 2, 2], &device));
        out.loss = Some(Tensor::from_floats([1.5], &device));

        let scalars = out.scalars();
        assert_eq!(scalars.len(), 1);
        assert_eq!(scalars["loss"], 1.5);
    }
}
