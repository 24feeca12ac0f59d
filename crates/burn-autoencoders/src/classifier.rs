//! Supervised baseline
//!
//! A dense classifier on flattened images, trained with cross-entropy. It
//! shares the statistics and step-output conventions of the autoencoders so
//! the same harness can report on it.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::softmax;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use burn_autoencoders_core::StatsMeter;
use burn_autoencoders_core::output::to_f64;
use burn_autoencoders_nets::Nonlinearity;
use burn_autoencoders_nets::mlp::Mlp;

use crate::config::TrainConfig;
use crate::data::ImageFolder;
use crate::error::Result;
use crate::logger::Logger;
use crate::trainer::EvalReport;

/// Classifier configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// `[channels, height, width]`
    pub in_shape: [usize; 3],
    pub classes: usize,
    #[serde(default = "default_hidden")]
    pub hidden: Vec<usize>,
    #[serde(default)]
    pub nonlin: Nonlinearity,
}

fn default_hidden() -> Vec<usize> {
    vec![256]
}

impl ClassifierConfig {
    pub fn new(in_shape: [usize; 3], classes: usize) -> Self {
        Self {
            in_shape,
            classes,
            hidden: default_hidden(),
            nonlin: Nonlinearity::default(),
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        let din = self.in_shape.iter().product();
        Classifier {
            net: Mlp::new(din, self.classes, &self.hidden, self.nonlin, None, device),
        }
    }
}

/// Output of a classifier step
#[derive(Debug, Clone)]
pub struct ClassifierOutput<B: Backend> {
    /// Logits, `[batch, classes]`
    pub pred: Tensor<B, 2>,
    pub targets: Tensor<B, 1, Int>,
    pub loss: Tensor<B, 1>,
}

#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    net: Mlp<B>,
}

impl<B: Backend> Classifier<B> {
    pub fn stat_names() -> [&'static str; 4] {
        ["loss", "confidence", "error", "error0"]
    }

    pub fn register_stats(stats: &mut StatsMeter) {
        stats.new_meter(Self::stat_names());
    }

    /// Logits for a batch of images
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        self.net.forward_flat(x)
    }

    /// Most likely class per sample
    pub fn classify(&self, x: Tensor<B, 4>) -> Tensor<B, 1, Int> {
        let pred = self.forward(x);
        let [batch, _] = pred.dims();
        pred.argmax(1).reshape([batch])
    }

    /// Cross-entropy of a labelled batch; updates `loss`
    pub fn objective(
        &self,
        x: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
        stats: &mut StatsMeter,
    ) -> Result<ClassifierOutput<B>> {
        let pred = self.forward(x);
        let loss = CrossEntropyLossConfig::new()
            .init(&pred.device())
            .forward(pred.clone(), targets.clone());
        stats.update("loss", to_f64(loss.clone()))?;
        Ok(ClassifierOutput {
            pred,
            targets,
            loss,
        })
    }

    /// Updates `confidence` (mean top probability) and the error rates
    pub fn record_accuracy(out: &ClassifierOutput<B>, stats: &mut StatsMeter) -> Result<()> {
        let [batch, _] = out.pred.dims();
        let probs = softmax(out.pred.clone().detach(), 1);
        let confidence = probs.clone().max_dim(1).mean();
        let pick = probs.argmax(1).reshape([batch]);
        let correct = pick.equal(out.targets.clone()).float().mean();

        let error = 1.0 - to_f64(correct);
        stats.update("confidence", to_f64(confidence))?;
        // a single head: its error is the joint error
        stats.update("error0", error)?;
        stats.update("error", error)?;
        Ok(())
    }
}

impl<B: AutodiffBackend> Classifier<B> {
    /// One optimization step; returns the updated model
    pub fn train_step<O: Optimizer<Self, B>>(
        self,
        optim: &mut O,
        learning_rate: f64,
        x: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
        stats: &mut StatsMeter,
    ) -> Result<(Self, ClassifierOutput<B>)> {
        let out = self.objective(x, targets, stats)?;
        Self::record_accuracy(&out, stats)?;

        let grads = GradientsParams::from_grads(out.loss.clone().backward(), &self);
        Ok((optim.step(learning_rate, self, grads), out))
    }
}

/// Trains on the labelled images of `data` for `config.iterations` steps
///
/// Smoothed statistics are logged as `train/<name>` every `viz_every`
/// iterations. `on_step` is called after each one.
pub fn fit_classifier<B, O, L, F>(
    mut model: Classifier<B>,
    optim: &mut O,
    data: &ImageFolder,
    config: &TrainConfig,
    logger: &mut L,
    mut on_step: F,
) -> Result<Classifier<B>>
where
    B: AutodiffBackend,
    O: Optimizer<Classifier<B>, B>,
    L: Logger + ?Sized,
    F: FnMut(usize, &StatsMeter),
{
    let device = model.devices().into_iter().next().unwrap_or_default();
    let mut stats = StatsMeter::new();
    Classifier::<B>::register_stats(&mut stats);

    let mut iteration = 0;
    while iteration < config.iterations {
        for indices in data.batches(config.batch_size, true) {
            if iteration >= config.iterations {
                break;
            }
            let x = data.batch::<B>(&indices, &device)?;
            let y = data.labels::<B>(&indices, &device);
            let (next, _) = model.train_step(optim, config.learning_rate, x, y, &mut stats)?;
            model = next;
            iteration += 1;

            if config.viz_every > 0 && iteration % config.viz_every == 0 {
                logger.set_step(iteration);
                for (name, value) in stats.smooths() {
                    logger.add_scalar(&format!("train/{name}"), value)?;
                }
                logger.flush()?;
            }
            on_step(iteration, &stats);
        }
    }
    Ok(model)
}

/// Classifies every image of `data` in order
///
/// Averaged statistics are logged as `eval/<name>` scalars and returned.
pub fn evaluate_classifier<B: Backend, L: Logger + ?Sized>(
    model: &Classifier<B>,
    data: &ImageFolder,
    batch_size: usize,
    logger: &mut L,
) -> Result<EvalReport> {
    let device = model.devices().into_iter().next().unwrap_or_default();
    let mut stats = StatsMeter::new();
    Classifier::<B>::register_stats(&mut stats);

    let mut count = 0;
    for indices in data.batches(batch_size, false) {
        let x = data.batch::<B>(&indices, &device)?;
        let y = data.labels::<B>(&indices, &device);
        let out = model.objective(x, y, &mut stats)?;
        Classifier::record_accuracy(&out, &mut stats)?;
        count += indices.len();
    }

    let stats = stats.avgs();
    for (name, value) in &stats {
        logger.add_scalar(&format!("eval/{name}"), *value)?;
    }
    logger.flush()?;
    Ok(EvalReport { stats, count })
}
