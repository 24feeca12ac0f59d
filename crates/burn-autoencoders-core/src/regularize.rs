//! Latent regularizers
//!
//! Penalties that pull the aggregate posterior towards a standard normal prior.
//! All functions return a single-element tensor so they can be added to the
//! reconstruction loss and backpropagated.
//!
//! - [`standard_kl`] - closed-form KL against N(0, I) (VAE)
//! - [`mmd`] - maximum mean discrepancy with an inverse multiquadratic kernel (WAE)
//! - [`sliced_wasserstein`] - sliced Wasserstein distance over random 1D projections (SWAE)
//! - [`norm_penalty`] - plain L1/L2 magnitude penalty (AE)

use burn::prelude::*;
use burn::tensor::Distribution;
use serde::{Deserialize, Serialize};

/// Magnitude penalty used by plain autoencoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormKind {
    L1,
    #[default]
    L2,
}

impl NormKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::L1 => "L1",
            Self::L2 => "L2",
        }
    }
}

/// Draws `n` samples from the standard normal prior
pub fn sample_prior<B: Backend>(n: usize, dim: usize, device: &B::Device) -> Tensor<B, 2> {
    Tensor::random([n, dim], Distribution::Normal(0.0, 1.0), device)
}

/// Elementwise KL(N(loc, scale) || N(0, 1))
///
/// ```text
/// KL = 0.5 * (loc^2 + scale^2 - 1) - ln(scale)
/// ```
pub fn standard_kl<B: Backend>(loc: Tensor<B, 2>, scale: Tensor<B, 2>) -> Tensor<B, 2> {
    let var = scale.clone().powf_scalar(2.0);
    (loc.powf_scalar(2.0) + var).sub_scalar(1.0).mul_scalar(0.5) - scale.log()
}

/// KL summed over dimensions and averaged over the batch
pub fn kl_divergence<B: Backend>(loc: Tensor<B, 2>, scale: Tensor<B, 2>) -> Tensor<B, 1> {
    let [batch, _] = loc.dims();
    standard_kl(loc, scale).sum().div_scalar(batch as f64)
}

/// Summed L1/L2 magnitude of the codes divided by the batch size
pub fn norm_penalty<B: Backend>(q: Tensor<B, 2>, kind: NormKind) -> Tensor<B, 1> {
    let [batch, _] = q.dims();
    let mag = match kind {
        NormKind::L1 => q.abs().sum(),
        NormKind::L2 => q.powf_scalar(2.0).sum(),
    };
    mag.div_scalar(batch as f64)
}

/// Squared euclidean distances between every row of `a` and every row of `b`
pub fn pairwise_sq_dists<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>) -> Tensor<B, 2> {
    let aa = a.clone().powf_scalar(2.0).sum_dim(1);
    let bb = b.clone().powf_scalar(2.0).sum_dim(1).transpose();
    let ab = a.matmul(b.transpose());

    (aa + bb - ab.mul_scalar(2.0)).clamp_min(0.0)
}

/// Inverse multiquadratic kernel `C / (C + |x - y|^2)`
fn imq_kernel<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>, c: f64) -> Tensor<B, 2> {
    pairwise_sq_dists(a, b).add_scalar(c).recip().mul_scalar(c)
}

/// Maximum mean discrepancy between prior samples `p` and codes `q`
///
/// Uses the inverse multiquadratic kernel with `C = 2 * latent_dim`, the
/// expected squared distance between two standard normal samples. The
/// within-sample terms drop the diagonal (unbiased estimate) whenever the
/// batch has at least two samples.
pub fn mmd<B: Backend>(p: Tensor<B, 2>, q: Tensor<B, 2>) -> Tensor<B, 1> {
    let [n, dim] = q.dims();
    let [m, _] = p.dims();
    let c = 2.0 * dim as f64;

    let kpp = imq_kernel(p.clone(), p.clone(), c).sum();
    let kqq = imq_kernel(q.clone(), q.clone(), c).sum();
    let kpq = imq_kernel(p, q, c).sum();

    // k(x, x) = 1 for the IMQ kernel, so the diagonal sums to the sample count
    let within_p = if m > 1 {
        kpp.sub_scalar(m as f64).div_scalar((m * (m - 1)) as f64)
    } else {
        kpp.div_scalar((m * m) as f64)
    };
    let within_q = if n > 1 {
        kqq.sub_scalar(n as f64).div_scalar((n * (n - 1)) as f64)
    } else {
        kqq.div_scalar((n * n) as f64)
    };

    within_p + within_q - kpq.mul_scalar(2.0 / (n * m) as f64)
}

/// Random projection directions: `[dim, slices]` with unit-norm columns
pub fn sample_slices<B: Backend>(dim: usize, slices: usize, device: &B::Device) -> Tensor<B, 2> {
    let s = Tensor::<B, 2>::random([dim, slices], Distribution::Normal(0.0, 1.0), device);
    let norms = s.clone().powf_scalar(2.0).sum_dim(0).sqrt().clamp_min(1e-12);
    s / norms
}

/// Sliced Wasserstein distance between codes `q` and prior samples `p`
///
/// Both batches are projected onto the columns of `slices`, each projection is
/// sorted along the batch, and the mean absolute difference of the sorted
/// projections is returned.
pub fn sliced_wasserstein<B: Backend>(
    q: Tensor<B, 2>,
    p: Tensor<B, 2>,
    slices: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let qd = q.matmul(slices.clone()).sort(0);
    let pd = p.matmul(slices).sort(0);

    (qd - pd).abs().mean()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn test_kl_zero_at_prior() {
        let device = Default::default();
        let loc = Tensor::<TestBackend, 2>::zeros([4, 3], &device);
        let scale = Tensor::<TestBackend, 2>::ones([4, 3], &device);

        assert!(scalar(kl_divergence(loc, scale)).abs() < 1e-6);
    }

    #[test]
    fn test_kl_closed_form() {
        let device = Default::default();
        // loc = 1, scale = e: 0.5 * (1 + e^2 - 1) - 1 = 0.5 * e^2 - 1
        let loc = Tensor::<TestBackend, 2>::ones([2, 1], &device);
        let scale = Tensor::<TestBackend, 2>::ones([2, 1], &device).mul_scalar(std::f32::consts::E);

        let expected = 0.5 * std::f32::consts::E.powi(2) - 1.0;
        let kl = scalar(kl_divergence(loc, scale));
        assert!((kl - expected).abs() < 1e-4, "kl = {kl}, expected {expected}");
    }

    #[test]
    fn test_norm_penalty() {
        let device = Default::default();
        let q = Tensor::<TestBackend, 2>::from_floats([[1.0, -2.0], [3.0, 0.0]], &device);

        assert!((scalar(norm_penalty(q.clone(), NormKind::L1)) - 3.0).abs() < 1e-6);
        assert!((scalar(norm_penalty(q, NormKind::L2)) - 7.0).abs() < 1e-6);
    }

    #[test]
    fn test_pairwise_sq_dists() {
        let device = Default::default();
        let a = Tensor::<TestBackend, 2>::from_floats([[0.0, 0.0], [1.0, 1.0]], &device);
        let b = Tensor::<TestBackend, 2>::from_floats([[3.0, 4.0]], &device);

        let d: Vec<f32> = pairwise_sq_dists(a, b).into_data().to_vec().unwrap();
        assert!((d[0] - 25.0).abs() < 1e-5);
        assert!((d[1] - 13.0).abs() < 1e-5);
    }

    #[test]
    fn test_mmd_separates_distributions() {
        let device = Default::default();
        let p = sample_prior::<TestBackend>(64, 4, &device);
        let same = sample_prior::<TestBackend>(64, 4, &device);
        let shifted = sample_prior::<TestBackend>(64, 4, &device).add_scalar(5.0);

        let close = scalar(mmd(p.clone(), same));
        let far = scalar(mmd(p, shifted));
        assert!(far > close, "far = {far}, close = {close}");
        assert!(far > 0.1);
    }

    #[test]
    fn test_slices_are_unit_columns() {
        let device = Default::default();
        let s = sample_slices::<TestBackend>(5, 7, &device);
        assert_eq!(s.dims(), [5, 7]);

        let norms: Vec<f32> = s.powf_scalar(2.0).sum_dim(0).into_data().to_vec().unwrap();
        assert!(norms.iter().all(|n| (n - 1.0).abs() < 1e-4));
    }

    #[test]
    fn test_sliced_wasserstein_permutation_invariant() {
        let device = Default::default();
        let q = Tensor::<TestBackend, 2>::from_floats([[1.0, 0.0], [0.0, 1.0], [2.0, 2.0]], &device);
        let p = Tensor::<TestBackend, 2>::from_floats([[2.0, 2.0], [1.0, 0.0], [0.0, 1.0]], &device);
        let s = sample_slices::<TestBackend>(2, 8, &device);

        assert!(scalar(sliced_wasserstein(q, p, s)) < 1e-5);
    }

    #[test]
    fn test_sliced_wasserstein_shift() {
        let device = Default::default();
        let q = Tensor::<TestBackend, 2>::from_floats([[1.0], [2.0]], &device);
        let p = Tensor::<TestBackend, 2>::from_floats([[4.0], [3.0]], &device);
        let s = Tensor::<TestBackend, 2>::ones([1, 1], &device);

        // sorted: [1, 2] vs [3, 4]
        assert!((scalar(sliced_wasserstein(q, p, s)) - 2.0).abs() < 1e-6);
    }
}
