//! Model visualization
//!
//! Turns a step output into logger entries: latent histograms, reconstruction
//! grids, generated samples and, outside of training, latent traversals.

use burn::prelude::*;

use burn_autoencoders_core::StepOutput;
use burn_autoencoders_core::traversal::{
    calc_tiling, compute_diffs, limit_image_size, tile_frames, traversal_vecs,
};

use crate::error::{Error, Result};
use crate::logger::{ImageBatch, Logger};
use crate::model::{AutoEncoder, LatentCache};

/// Images shown per row in reconstruction and sample grids
pub const MAX_VIZ_IMAGES: usize = 8;
/// Codes traversed during evaluation
pub const TRAVERSAL_CODES: usize = 16;
pub const TRAVERSAL_STEPS: usize = 20;
pub const TRAVERSAL_FPS: u32 = 12;
/// Importance logits are clamped to this magnitude in histograms
const IMP_HIST_LIMIT: f64 = 5.0;

/// When the visualization happens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VizContext {
    pub training: bool,
    /// Number of visualizations so far
    pub counter: usize,
}

impl VizContext {
    pub fn training(counter: usize) -> Self {
        Self {
            training: true,
            counter,
        }
    }

    pub fn eval() -> Self {
        Self {
            training: false,
            counter: 0,
        }
    }

    /// Every other call while training, always when evaluating
    fn periodic(&self) -> bool {
        self.counter % 2 == 0 || !self.training
    }
}

pub(crate) fn to_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Result<Vec<f64>> {
    t.into_data()
        .convert::<f64>()
        .to_vec()
        .map_err(|e| Error::TensorData(format!("{e:?}")))
}

fn log_images<B: Backend, L: Logger + ?Sized>(
    logger: &mut L,
    name: &str,
    imgs: Tensor<B, 4>,
    cols: usize,
) -> Result<()> {
    let batch = ImageBatch::from_tensor(limit_image_size(imgs))?;
    logger.add_images(name, &batch, cols)
}

/// Logs everything worth seeing about a step
///
/// Hybrid samples come from `cache`; when it is empty the step's own codes
/// are used instead.
pub fn visualize<B: Backend, L: Logger + ?Sized>(
    model: &AutoEncoder<B>,
    out: &StepOutput<B>,
    cache: &LatentCache<B>,
    logger: &mut L,
    ctx: VizContext,
) -> Result<()> {
    let show_gen = model.config().viz_gen || !ctx.training;

    if let Some(logits) = model.importance.as_ref().filter(|_| ctx.periodic()) {
        let logits = to_vec(logits.val())?;
        let clamped: Vec<f64> = logits
            .iter()
            .map(|v| v.clamp(-IMP_HIST_LIMIT, IMP_HIST_LIMIT))
            .collect();
        logger.add_histogram("imp_hist", &clamped)?;

        let text = logits
            .iter()
            .map(|v| format!("{v:.3}"))
            .collect::<Vec<_>>()
            .join(", ");
        logger.add_text("imp_str", &format!("[{text}]"))?;
    }

    let q = out.latent.as_ref().map(|latent| latent.loc());

    if let (Some(latent), Some(q)) = (&out.latent, &q) {
        let [batch, dim] = q.dims();
        if batch > 0 && dim > 0 {
            let norms = q.clone().powf_scalar(2.0).sum_dim(1).sqrt();
            logger.add_histogram("latent-norm", &to_vec(norms)?)?;
            if batch > 1 {
                logger.add_histogram("latent-std", &to_vec(q.clone().var(0).sqrt())?)?;
            }
            if let Some(scale) = latent.scale() {
                let log_std = scale.add_scalar(1e-5).log().mean_dim(0);
                logger.add_histogram("logstd-hist", &to_vec(log_std)?)?;
            }
        }
    }

    let [batch, c, h, w] = out.original.dims();
    let n = batch.min(MAX_VIZ_IMAGES);

    if let Some(rec) = &out.reconstruction {
        let originals = out.original.clone().slice([0..n, 0..c, 0..h, 0..w]);
        let recs = rec.clone().slice([0..n, 0..c, 0..h, 0..w]);
        log_images(logger, "rec", Tensor::cat(vec![originals, recs], 0), n)?;
    }

    if show_gen && n > 0 {
        let hybrids = match (cache.is_empty(), &q) {
            (false, _) => Some(model.generate_hybrid(cache, 2 * n)?),
            (true, Some(q)) => {
                let mut local = LatentCache::new();
                local.store_codes(q.clone());
                Some(model.generate_hybrid(&local, 2 * n)?)
            }
            (true, None) => None,
        };
        if let Some(hybrids) = hybrids {
            log_images(logger, "gen-hyb", hybrids, n)?;
        }
    }

    if !ctx.training {
        match &q {
            Some(q) if q.dims()[0] >= TRAVERSAL_CODES => log_traversals(model, q.clone(), logger)?,
            _ => tracing::warn!("visualizing traversals failed: fewer than {TRAVERSAL_CODES} codes"),
        }
        logger.flush()?;
    }

    if model.kind().has_prior() && ctx.periodic() && show_gen && n > 0 {
        let device = out.original.device();
        log_images(logger, "gen-prior", model.generate_prior(2 * n, &device), n)?;
    }

    Ok(())
}

/// Decodes traversals of the first codes, logging their per-dimension
/// effect and a video of the second code's sweep
fn log_traversals<B: Backend, L: Logger + ?Sized>(
    model: &AutoEncoder<B>,
    q: Tensor<B, 2>,
    logger: &mut L,
) -> Result<()> {
    let [_, dim] = q.dims();
    let steps = TRAVERSAL_STEPS;
    let q = q.slice([0..TRAVERSAL_CODES, 0..dim]);

    let min = q.clone().min_dim(0).reshape([dim]);
    let max = q.clone().max_dim(0).reshape([dim]);
    let vecs = traversal_vecs(q, steps, min, max);

    let mut walks = Vec::with_capacity(TRAVERSAL_CODES);
    let mut video = None;
    for i in 0..TRAVERSAL_CODES {
        let codes = vecs
            .clone()
            .slice([i..i + 1, 0..dim, 0..steps, 0..dim])
            .reshape([dim * steps, dim]);
        let imgs = model.decode_point(codes);
        let [_, c, h, w] = imgs.dims();
        if i == 1 {
            video = Some(imgs.clone());
        }
        walks.push(imgs.reshape([1, dim, steps, c * h * w]));
    }

    let diffs = compute_diffs(Tensor::cat(walks, 0));
    logger.add_histogram("interventions", &to_vec(diffs)?)?;

    if let Some(walk) = video {
        let (rows, cols) = calc_tiling(dim, true);
        let frames = tile_frames(walk, steps, rows, cols);
        logger.add_video("traversals", &ImageBatch::from_tensor(frames)?, TRAVERSAL_FPS)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelConfig, ModelKind};
    use crate::logger::{LogValue, MemoryLogger};
    use burn::tensor::Distribution;
    use burn_autoencoders_core::StatsMeter;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn step(
        kind: ModelKind,
        batch: usize,
    ) -> (AutoEncoder<TestBackend>, StepOutput<TestBackend>) {
        let device = Default::default();
        let model = ModelConfig::dislib64(kind, 1, 3)
            .with_reg_wt(1.0)
            .init::<TestBackend>(&device)
            .unwrap();
        let mut stats = StatsMeter::new();
        model.register_stats(&mut stats);
        let x = Tensor::random([batch, 1, 64, 64], Distribution::Uniform(0.0, 1.0), &device);
        let out = model.objective(x, &mut stats).unwrap();
        (model, out)
    }

    #[test]
    fn test_training_viz_without_gen() {
        let (model, out) = step(ModelKind::Ae, 4);
        let mut logger = MemoryLogger::new();

        visualize(&model, &out, &LatentCache::new(), &mut logger, VizContext::training(1)).unwrap();

        assert!(logger.contains("latent-norm"));
        assert!(logger.contains("latent-std"));
        assert_eq!(
            logger.get("rec"),
            Some(&LogValue::Images {
                shape: [8, 1, 64, 64],
                cols: 4
            })
        );
        assert!(!logger.contains("gen-hyb"));
        assert!(!logger.contains("traversals"));
    }

    #[test]
    fn test_eval_viz_with_traversals() {
        let (model, out) = step(ModelKind::Vae, 16);
        let mut logger = MemoryLogger::new();

        visualize(&model, &out, &LatentCache::new(), &mut logger, VizContext::eval()).unwrap();

        assert!(logger.contains("logstd-hist"));
        assert!(logger.contains("gen-hyb"));
        assert!(logger.contains("gen-prior"));
        match logger.get("interventions") {
            Some(LogValue::Histogram(values)) => assert_eq!(values.len(), 16 * 3),
            other => panic!("unexpected {other:?}"),
        }
        // 3 dims tile as 3x1, 20 frames
        assert_eq!(
            logger.get("traversals"),
            Some(&LogValue::Video {
                shape: [20, 1, 192, 64],
                fps: 12
            })
        );
        assert_eq!(logger.flushes, 1);
    }

    #[test]
    fn test_cost_aware_importance_cadence() {
        let (model, out) = step(ModelKind::Cwae, 2);
        let cache = LatentCache::new();

        let mut logger = MemoryLogger::new();
        visualize(&model, &out, &cache, &mut logger, VizContext::training(1)).unwrap();
        assert!(!logger.contains("imp_hist"));

        visualize(&model, &out, &cache, &mut logger, VizContext::training(2)).unwrap();
        match logger.get("imp_str") {
            Some(LogValue::Text(text)) => {
                assert!(text.starts_with('[') && text.ends_with(']'));
                assert_eq!(text.split(", ").count(), 3);
            }
            other => panic!("unexpected {other:?}"),
        }
        // few codes: traversals are skipped, not an error
        visualize(&model, &out, &cache, &mut logger, VizContext::eval()).unwrap();
        assert!(!logger.contains("traversals"));
    }
}
