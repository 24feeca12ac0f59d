//! Reconstruction criteria (summed over every element)

use burn::prelude::*;
use serde::{Deserialize, Serialize};

const BCE_EPS: f64 = 1e-8;

/// Reconstruction loss
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    /// Binary cross-entropy on outputs in (0, 1)
    #[default]
    Bce,
    /// Squared error
    Mse,
    /// Absolute error
    L1,
}

impl Criterion {
    /// Summed loss between a reconstruction and its target
    pub fn loss<B: Backend, const D: usize>(
        &self,
        rec: Tensor<B, D>,
        target: Tensor<B, D>,
    ) -> Tensor<B, 1> {
        match self {
            Self::Bce => {
                let rec = rec.clamp(BCE_EPS, 1.0 - BCE_EPS);
                let pos = target.clone() * rec.clone().log();
                let neg = target.neg().add_scalar(1.0) * rec.neg().add_scalar(1.0).log();
                (pos + neg).sum().neg()
            }
            Self::Mse => (rec - target).powf_scalar(2.0).sum(),
            Self::L1 => (rec - target).abs().sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_mse_and_l1() {
        let device = Default::default();
        let rec = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0]], &device);
        let x = Tensor::<TestBackend, 2>::from_floats([[0.0, 4.0]], &device);

        let mse: f32 = Criterion::Mse.loss(rec.clone(), x.clone()).into_scalar().elem();
        let l1: f32 = Criterion::L1.loss(rec, x).into_scalar().elem();
        assert!((mse - 5.0).abs() < 1e-6);
        assert!((l1 - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_bce_half() {
        let device = Default::default();
        let rec = Tensor::<TestBackend, 2>::from_floats([[0.5, 0.5]], &device);
        let x = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0]], &device);

        let bce: f32 = Criterion::Bce.loss(rec, x).into_scalar().elem();
        assert!((bce - 2.0 * std::f32::consts::LN_2).abs() < 1e-5);
    }

    #[test]
    fn test_criterion_from_json() {
        let c: Criterion = serde_json::from_str("\"mse\"").unwrap();
        assert_eq!(c, Criterion::Mse);
    }
}
