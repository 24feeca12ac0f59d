//! Training and evaluation loop
//!
//! The [`Trainer`] owns an autodiff model, its optimizer, the training
//! statistics and the latent cache used for hybrid samples. Evaluation and
//! visualization run on the inner backend without building a graph.
//!
//! A checkpoint at `path` is the model record `path.mpk` plus, when codes
//! were cached, the latent cache `path-latents.mpk`.

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::Serialize;

use burn_autoencoders_core::{StatsMeter, StepOutput};

use crate::config::{ModelConfig, TrainConfig};
use crate::data::ImageFolder;
use crate::error::Result;
use crate::logger::Logger;
use crate::model::{AutoEncoder, LatentCache};
use crate::visualize::{VizContext, visualize};

/// Extension `CompactRecorder` gives its files
pub const CHECKPOINT_EXTENSION: &str = "mpk";

/// Averaged statistics of an evaluation pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalReport {
    pub stats: std::collections::BTreeMap<String, f64>,
    /// Number of samples seen
    pub count: usize,
}

/// Saves the model record with burn's `CompactRecorder`
///
/// The recorder picks the file extension.
pub fn save_checkpoint<B: Backend, P: AsRef<Path>>(model: &AutoEncoder<B>, path: P) -> Result<()> {
    Recorder::<B>::record(
        &CompactRecorder::new(),
        model.clone().into_record(),
        path.as_ref().to_path_buf(),
    )?;
    tracing::info!(path = %path.as_ref().display(), "saved checkpoint");
    Ok(())
}

/// Builds a model from `config` and loads weights from `path`
pub fn load_checkpoint<B: Backend, P: AsRef<Path>>(
    config: &ModelConfig,
    path: P,
    device: &B::Device,
) -> Result<AutoEncoder<B>> {
    let record = Recorder::<B>::load(&CompactRecorder::new(), path.as_ref().to_path_buf(), device)?;
    Ok(config.init::<B>(device)?.load_record(record))
}

fn latents_path(checkpoint: &Path) -> PathBuf {
    let base = checkpoint.with_extension("");
    let mut name = base.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push("-latents");
    base.with_file_name(name)
}

/// Saves the cached codes next to the checkpoint at `path`
///
/// An empty cache removes a stale cache file instead.
pub fn save_latent_cache<B: Backend, P: AsRef<Path>>(cache: &LatentCache<B>, path: P) -> Result<()> {
    let file = latents_path(path.as_ref());
    match cache.codes() {
        Some(codes) => Recorder::<B>::record(&CompactRecorder::new(), codes.clone(), file)?,
        None => {
            let stale = file.with_extension(CHECKPOINT_EXTENSION);
            if stale.exists() {
                std::fs::remove_file(stale)?;
            }
        }
    }
    Ok(())
}

/// Restores the codes saved with the checkpoint at `path`
///
/// Returns an empty cache when none were saved.
pub fn load_latent_cache<B: Backend, P: AsRef<Path>>(
    path: P,
    device: &B::Device,
) -> Result<LatentCache<B>> {
    let file = latents_path(path.as_ref());
    let mut cache = LatentCache::new();
    if file.with_extension(CHECKPOINT_EXTENSION).exists() {
        let codes: Tensor<B, 2> = Recorder::<B>::load(&CompactRecorder::new(), file, device)?;
        cache.store_codes(codes);
    } else {
        tracing::debug!(path = %path.as_ref().display(), "checkpoint has no latent cache");
    }
    Ok(cache)
}

/// Runs a full evaluation pass
///
/// The first batch is visualized; averaged statistics are logged as
/// `eval/<name>` scalars and returned.
pub fn evaluate<B, I, L>(
    model: &AutoEncoder<B>,
    cache: &LatentCache<B>,
    batches: I,
    logger: &mut L,
) -> Result<EvalReport>
where
    B: Backend,
    I: IntoIterator<Item = Tensor<B, 4>>,
    L: Logger + ?Sized,
{
    let mut stats = StatsMeter::new();
    model.register_stats(&mut stats);

    let mut count = 0;
    for (i, x) in batches.into_iter().enumerate() {
        count += x.dims()[0];
        let out = model.objective(x, &mut stats)?;
        if i == 0 {
            visualize(model, &out, cache, logger, VizContext::eval())?;
        }
    }

    let stats = stats.avgs();
    for (name, value) in &stats {
        logger.add_scalar(&format!("eval/{name}"), *value)?;
    }
    logger.flush()?;

    tracing::info!(count, ?stats, "evaluation finished");
    Ok(EvalReport { stats, count })
}

pub struct Trainer<B: AutodiffBackend, O> {
    model: AutoEncoder<B>,
    device: B::Device,
    optim: O,
    config: TrainConfig,
    stats: StatsMeter,
    cache: LatentCache<B::InnerBackend>,
    iteration: usize,
    viz_counter: usize,
}

impl<B, O> Trainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<AutoEncoder<B>, B>,
{
    pub fn new(model: AutoEncoder<B>, optim: O, config: TrainConfig) -> Self {
        let mut stats = StatsMeter::new();
        model.register_stats(&mut stats);
        let device = model.devices().into_iter().next().unwrap_or_default();
        Self {
            model,
            device,
            optim,
            config,
            stats,
            cache: LatentCache::new(),
            iteration: 0,
            viz_counter: 0,
        }
    }

    pub fn model(&self) -> &AutoEncoder<B> {
        &self.model
    }

    pub fn into_model(self) -> AutoEncoder<B> {
        self.model
    }

    pub fn stats(&self) -> &StatsMeter {
        &self.stats
    }

    pub fn cache(&self) -> &LatentCache<B::InnerBackend> {
        &self.cache
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// One optimization step on a batch
    ///
    /// Returns the step output on the inner backend.
    pub fn train_step(&mut self, x: Tensor<B, 4>) -> Result<StepOutput<B::InnerBackend>> {
        let out = self.model.objective(x, &mut self.stats)?;

        if let Some(loss) = out.loss.clone() {
            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = self
                .optim
                .step(self.config.learning_rate, self.model.clone(), grads);
        }

        let out = out.inner();
        if let Some(latent) = &out.latent {
            self.cache.store(latent);
        }
        self.iteration += 1;
        Ok(out)
    }

    /// Computes the objective on a batch without updating anything but `stats`
    pub fn eval_step(
        &self,
        x: Tensor<B::InnerBackend, 4>,
        stats: &mut StatsMeter,
    ) -> Result<StepOutput<B::InnerBackend>> {
        self.model.valid().objective(x, stats)
    }

    /// Visualizes a training output and logs the smoothed statistics
    pub fn log_training<L: Logger + ?Sized>(
        &mut self,
        out: &StepOutput<B::InnerBackend>,
        logger: &mut L,
    ) -> Result<()> {
        logger.set_step(self.iteration);
        for (name, value) in self.stats.smooths() {
            logger.add_scalar(&format!("train/{name}"), value)?;
        }

        let model = self.model.valid();
        visualize(
            &model,
            out,
            &self.cache,
            logger,
            VizContext::training(self.viz_counter),
        )?;
        self.viz_counter += 1;
        logger.flush()
    }

    /// Runs [`evaluate`] on the current weights
    pub fn evaluate<I, L>(&self, batches: I, logger: &mut L) -> Result<EvalReport>
    where
        I: IntoIterator<Item = Tensor<B::InnerBackend, 4>>,
        L: Logger + ?Sized,
    {
        logger.set_step(self.iteration);
        evaluate(&self.model.valid(), &self.cache, batches, logger)
    }

    /// Trains for the configured number of iterations
    ///
    /// Visualizes every `viz_every` and checkpoints into `checkpoint_dir`
    /// every `save_every` iterations (and once at the end). `on_step` is
    /// called after each iteration.
    pub fn fit<L, F>(
        &mut self,
        data: &ImageFolder,
        logger: &mut L,
        checkpoint_dir: Option<&Path>,
        mut on_step: F,
    ) -> Result<()>
    where
        L: Logger + ?Sized,
        F: FnMut(usize, &StatsMeter),
    {
        let device = self.device.clone();
        let config = self.config.clone();
        let mut epoch = 0;

        while self.iteration < config.iterations {
            for indices in data.batches(config.batch_size, true) {
                if self.iteration >= config.iterations {
                    break;
                }
                let x = data.batch::<B>(&indices, &device)?;
                let out = self.train_step(x)?;

                if config.viz_every > 0 && self.iteration % config.viz_every == 0 {
                    self.log_training(&out, logger)?;
                }
                if let Some(dir) = checkpoint_dir
                    .filter(|_| config.save_every > 0 && self.iteration % config.save_every == 0)
                {
                    self.save(self.checkpoint_path(dir))?;
                }
                on_step(self.iteration, &self.stats);
            }
            epoch += 1;
            tracing::info!(epoch, iteration = self.iteration, "epoch finished");
        }

        if let Some(dir) = checkpoint_dir {
            self.save(dir.join("model"))?;
        }
        Ok(())
    }

    /// Saves the model and the latent cache as one checkpoint
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        save_checkpoint(&self.model, path.as_ref())?;
        save_latent_cache(&self.cache, path)
    }

    fn checkpoint_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("checkpoint-{:06}", self.iteration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelKind;
    use crate::logger::MemoryLogger;
    use burn::backend::Autodiff;
    use burn::optim::AdamConfig;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn batch<B: Backend>(n: usize) -> Tensor<B, 4> {
        Tensor::random([n, 1, 64, 64], Distribution::Uniform(0.0, 1.0), &Default::default())
    }

    #[test]
    fn test_train_step_updates_and_caches() {
        let device = Default::default();
        let model = ModelConfig::dislib64(ModelKind::Ae, 1, 3)
            .init::<TestBackend>(&device)
            .unwrap();
        let mut trainer = Trainer::new(model, AdamConfig::new().init(), TrainConfig::default());
        assert!(trainer.cache().is_empty());

        let out = trainer.train_step(batch(4)).unwrap();
        assert!(out.loss.is_some());
        assert_eq!(trainer.iteration(), 1);
        assert!(!trainer.cache().is_empty());
        assert!(trainer.stats().get("rec_loss").is_some());

        let mut logger = MemoryLogger::new();
        trainer.log_training(&out, &mut logger).unwrap();
        assert!(logger.contains("train/rec_loss"));
        assert!(logger.contains("rec"));
    }

    #[test]
    fn test_evaluate_reports_averages() {
        let device = Default::default();
        let model = ModelConfig::dislib64(ModelKind::Wae, 1, 3)
            .with_reg_wt(1.0)
            .init::<TestBackend>(&device)
            .unwrap();
        let trainer = Trainer::new(model, AdamConfig::new().init(), TrainConfig::default());

        let mut logger = MemoryLogger::new();
        let report = trainer
            .evaluate(vec![batch(2), batch(3)], &mut logger)
            .unwrap();

        assert_eq!(report.count, 5);
        assert!(report.stats.contains_key("rec_loss"));
        assert!(report.stats.contains_key("reg"));
        assert!(logger.contains("eval/reg"));
        assert!(logger.contains("gen-prior"));
    }

    #[test]
    fn test_eval_step_leaves_training_state() {
        let device = Default::default();
        let model = ModelConfig::dislib64(ModelKind::Swae, 1, 3)
            .with_reg_wt(1.0)
            .init::<TestBackend>(&device)
            .unwrap();
        let trainer = Trainer::new(model, AdamConfig::new().init(), TrainConfig::default());

        let mut stats = StatsMeter::new();
        trainer.model().register_stats(&mut stats);
        let out = trainer.eval_step(batch(2), &mut stats).unwrap();

        assert_eq!(out.reconstruction.unwrap().dims(), [2, 1, 64, 64]);
        assert!(stats.avgs().contains_key("reg"));
        assert_eq!(trainer.iteration(), 0);
        assert!(trainer.cache().is_empty());
        assert!(trainer.stats().avgs().is_empty());
    }

    #[test]
    fn test_latent_cache_saved_with_checkpoint() {
        let device = Default::default();
        let model = ModelConfig::dislib64(ModelKind::Ae, 1, 3)
            .init::<TestBackend>(&device)
            .unwrap();
        let mut trainer = Trainer::new(model, AdamConfig::new().init(), TrainConfig::default());
        let path = std::env::temp_dir().join(format!("bae-trainer-ckpt-{}", std::process::id()));

        // nothing cached yet: no cache file
        trainer.save(&path).unwrap();
        let empty = load_latent_cache::<NdArray<f32>, _>(&path, &device).unwrap();
        assert!(empty.is_empty());

        trainer.train_step(batch(5)).unwrap();
        trainer.save(&path).unwrap();

        let cache = load_latent_cache::<NdArray<f32>, _>(&path, &device).unwrap();
        let saved: Vec<f32> = trainer.cache().codes().unwrap().clone().into_data().to_vec().unwrap();
        let loaded: Vec<f32> = cache.codes().unwrap().clone().into_data().to_vec().unwrap();
        assert_eq!(cache.codes().unwrap().dims(), [5, 3]);
        for (a, b) in saved.iter().zip(&loaded) {
            assert!((a - b).abs() < 1e-2 * a.abs().max(1.0));
        }

        let model = load_checkpoint::<NdArray<f32>, _>(trainer.model().config(), &path, &device).unwrap();
        assert_eq!(model.generate_hybrid(&cache, 4).unwrap().dims(), [4, 1, 64, 64]);

        std::fs::remove_file(path.with_extension(CHECKPOINT_EXTENSION)).ok();
        std::fs::remove_file(latents_path(&path).with_extension(CHECKPOINT_EXTENSION)).ok();
    }

    #[test]
    fn test_checkpoint_roundtrip() {
        let device = Default::default();
        let config = ModelConfig::dislib64(ModelKind::Cae, 1, 3).with_reg_wt(1.0);
        let model = config.init::<NdArray<f32>>(&device).unwrap();

        let path = std::env::temp_dir().join(format!("bae-ckpt-{}", std::process::id()));
        save_checkpoint(&model, &path).unwrap();
        let loaded = load_checkpoint::<NdArray<f32>, _>(&config, &path, &device).unwrap();

        let a: Vec<f32> = model.importance.unwrap().val().into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.importance.unwrap().val().into_data().to_vec().unwrap();
        // stored at half precision
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-2);
        }

        std::fs::remove_file(path.with_extension("mpk")).ok();
    }
}
