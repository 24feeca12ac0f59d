//! Latent codes
//!
//! An encoder either produces a point estimate per sample or the parameters of
//! a diagonal Gaussian. Both are `[batch, latent_dim]`.

use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::backend::AutodiffBackend;

/// Latent code for a batch
#[derive(Debug, Clone)]
pub enum Latent<B: Backend> {
    /// Deterministic code
    Point(Tensor<B, 2>),
    /// Diagonal Gaussian posterior
    Normal {
        /// Mean, `[batch, latent_dim]`
        loc: Tensor<B, 2>,
        /// Standard deviation, `[batch, latent_dim]`
        scale: Tensor<B, 2>,
    },
}

impl<B: Backend> Latent<B> {
    /// Interprets `[batch, 2 * latent_dim]` as `[loc | log_std]`
    pub fn from_split(params: Tensor<B, 2>, min_log_std: Option<f64>) -> Self {
        let [batch, width] = params.dims();
        let dim = width / 2;

        let loc = params.clone().slice([0..batch, 0..dim]);
        let mut log_std = params.slice([0..batch, dim..2 * dim]);
        if let Some(min) = min_log_std {
            log_std = log_std.clamp_min(min);
        }

        Self::Normal {
            loc,
            scale: log_std.exp(),
        }
    }

    /// Mean of the code (the point itself for deterministic codes)
    pub fn loc(&self) -> Tensor<B, 2> {
        match self {
            Self::Point(q) => q.clone(),
            Self::Normal { loc, .. } => loc.clone(),
        }
    }

    /// Standard deviation, if the code is a distribution
    pub fn scale(&self) -> Option<Tensor<B, 2>> {
        match self {
            Self::Point(_) => None,
            Self::Normal { scale, .. } => Some(scale.clone()),
        }
    }

    pub fn is_distribution(&self) -> bool {
        matches!(self, Self::Normal { .. })
    }

    /// `[batch, latent_dim]`
    pub fn dims(&self) -> [usize; 2] {
        match self {
            Self::Point(q) => q.dims(),
            Self::Normal { loc, .. } => loc.dims(),
        }
    }

    /// Reparameterized sample: `loc + scale * eps`
    pub fn sample(&self) -> Tensor<B, 2> {
        match self {
            Self::Point(q) => q.clone(),
            Self::Normal { loc, scale } => {
                let eps = Tensor::random(
                    loc.shape(),
                    Distribution::Normal(0.0, 1.0),
                    &loc.device(),
                );
                loc.clone() + scale.clone() * eps
            }
        }
    }

    pub fn detach(self) -> Self {
        match self {
            Self::Point(q) => Self::Point(q.detach()),
            Self::Normal { loc, scale } => Self::Normal {
                loc: loc.detach(),
                scale: scale.detach(),
            },
        }
    }
}

impl<B: AutodiffBackend> Latent<B> {
    /// Same code on the inner (non-autodiff) backend
    pub fn inner(self) -> Latent<B::InnerBackend> {
        match self {
            Self::Point(q) => Latent::Point(q.inner()),
            Self::Normal { loc, scale } => Latent::Normal {
                loc: loc.inner(),
                scale: scale.inner(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_from_split_layout() {
        let device = Default::default();
        let params = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 0.0, 0.0]], &device);

        let latent = Latent::from_split(params, None);
        assert!(latent.is_distribution());
        assert_eq!(latent.dims(), [1, 2]);

        let loc: Vec<f32> = latent.loc().into_data().to_vec().unwrap();
        assert_eq!(loc, vec![1.0, 2.0]);

        let scale: Vec<f32> = latent.scale().unwrap().into_data().to_vec().unwrap();
        assert!(scale.iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_from_split_clamps_log_std() {
        let device = Default::default();
        let params = Tensor::<TestBackend, 2>::from_floats([[0.0, -10.0]], &device);

        let latent = Latent::from_split(params, Some(-1.0));
        let scale: Vec<f32> = latent.scale().unwrap().into_data().to_vec().unwrap();
        assert!((scale[0] - (-1.0f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn test_point_sample_is_identity() {
        let device = Default::default();
        let q = Tensor::<TestBackend, 2>::from_floats([[0.5, -0.5]], &device);
        let latent = Latent::Point(q);

        let z: Vec<f32> = latent.sample().into_data().to_vec().unwrap();
        assert_eq!(z, vec![0.5, -0.5]);
        assert!(latent.scale().is_none());
    }

    #[test]
    fn test_zero_scale_sample_is_loc() {
        let device = Default::default();
        let loc = Tensor::<TestBackend, 2>::from_floats([[3.0, 4.0]], &device);
        let latent = Latent::Normal {
            loc: loc.clone(),
            scale: loc.zeros_like(),
        };

        let z: Vec<f32> = latent.sample().into_data().to_vec().unwrap();
        assert_eq!(z, vec![3.0, 4.0]);
    }
}
