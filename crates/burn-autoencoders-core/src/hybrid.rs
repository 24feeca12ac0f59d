//! Hybrid sampling
//!
//! Hybrid samples recombine latent dimensions of different encoded inputs:
//! every dimension is shuffled independently across the batch, so each column
//! keeps its marginal while the joint structure is broken up.

use burn::prelude::*;
use burn::tensor::Distribution;

/// Independently permutes the batch for every latent dimension
pub fn shuffle_dim<B: Backend>(q: Tensor<B, 2>) -> Tensor<B, 2> {
    let keys = Tensor::<B, 2>::random(q.shape(), Distribution::Uniform(0.0, 1.0), &q.device());
    let perm = keys.argsort(0);
    q.gather(0, perm)
}

/// Repeats `q` along the batch until it has at least `n` rows
pub fn cycle_to<B: Backend>(q: Tensor<B, 2>, n: usize) -> Tensor<B, 2> {
    let [len, _] = q.dims();
    let copies = n / len.max(1) + 1;
    Tensor::cat(vec![q; copies], 0)
}
