//! Latent traversal and image tiling utilities
//!
//! A traversal takes a set of codes and, for every latent dimension, sweeps
//! that single coordinate between a lower and an upper bound while keeping the
//! others fixed. Decoding the sweep shows what each dimension controls.

use burn::prelude::*;
use burn::tensor::TensorData;
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};

/// Images with at least this many pixels are downscaled before logging
pub const MAX_LOGGED_PIXELS: usize = 20_000;
/// Side length of downscaled logged images
pub const LOGGED_SIZE: usize = 128;

/// Builds traversal vectors
///
/// # Arguments
///
/// * `q` - Codes, `[n, dim]`
/// * `steps` - Number of values per sweep
/// * `min`, `max` - Per-dimension sweep bounds, `[dim]`
///
/// # Returns
///
/// `[n, dim, steps, dim]`, where entry `(i, d, s)` is `q[i]` with coordinate `d`
/// set to `min[d] + (max[d] - min[d]) * s / (steps - 1)`.
pub fn traversal_vecs<B: Backend>(
    q: Tensor<B, 2>,
    steps: usize,
    min: Tensor<B, 1>,
    max: Tensor<B, 1>,
) -> Tensor<B, 4> {
    let [n, dim] = q.dims();
    let device = q.device();

    let denom = steps.saturating_sub(1).max(1) as f64;
    let t = Tensor::<B, 1, Int>::arange(0..steps as i64, &device)
        .float()
        .div_scalar(denom)
        .reshape([1, steps]);

    let lo = min.reshape([dim, 1]);
    let span = max.reshape([dim, 1]) - lo.clone();
    let values = (lo + span * t).reshape([1, dim, steps, 1]);

    let mut eye = vec![0.0f32; dim * dim];
    for d in 0..dim {
        eye[d * dim + d] = 1.0;
    }
    let mask = Tensor::<B, 2>::from_data(TensorData::new(eye, [dim, dim]), &device)
        .reshape([1, dim, 1, dim]);
    let keep = mask.clone().neg().add_scalar(1.0);

    let base = q.reshape([n, 1, 1, dim]).expand([n, dim, steps, dim]);
    base * keep + values * mask
}

/// Mean absolute change between consecutive frames of each sweep
///
/// `walks` is `[n, dim, steps, pixels]`; the result is `[n, dim]`.
pub fn compute_diffs<B: Backend>(walks: Tensor<B, 4>) -> Tensor<B, 2> {
    let [n, dim, steps, pixels] = walks.dims();
    if steps < 2 {
        return Tensor::zeros([n, dim], &walks.device());
    }

    let next = walks.clone().slice([0..n, 0..dim, 1..steps, 0..pixels]);
    let prev = walks.slice([0..n, 0..dim, 0..steps - 1, 0..pixels]);

    (next - prev)
        .abs()
        .mean_dim(3)
        .mean_dim(2)
        .reshape([n, dim])
}

/// Factors `n` into `(rows, cols)` as close to square as possible
///
/// With `prefer_tall` the larger factor goes to the rows.
pub fn calc_tiling(n: usize, prefer_tall: bool) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }

    let mut small = (n as f64).sqrt() as usize;
    while small > 1 && n % small != 0 {
        small -= 1;
    }
    let small = small.max(1);
    let large = n / small;

    if prefer_tall {
        (large, small)
    } else {
        (small, large)
    }
}

/// Downscales large image batches to `LOGGED_SIZE` x `LOGGED_SIZE`
pub fn limit_image_size<B: Backend>(imgs: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, h, w] = imgs.dims();
    if h * w < MAX_LOGGED_PIXELS {
        return imgs;
    }

    interpolate(
        imgs,
        [LOGGED_SIZE, LOGGED_SIZE],
        InterpolateOptions::new(InterpolateMode::Nearest),
    )
}

/// Tiles one traversal into video frames
///
/// `walk` holds `rows * cols` sweeps of `steps` images each, laid out as
/// `[rows * cols * steps, c, h, w]`. Returns `steps` frames of
/// `[c, rows * h, cols * w]`.
pub fn tile_frames<B: Backend>(
    walk: Tensor<B, 4>,
    steps: usize,
    rows: usize,
    cols: usize,
) -> Tensor<B, 4> {
    let [_, c, h, w] = walk.dims();

    walk.reshape([rows, cols, steps, c, h, w])
        .permute([2, 3, 0, 4, 1, 5])
        .reshape([steps, c, rows * h, cols * w])
}
