//! Autoencoder variants
//!
//! A single [`AutoEncoder`] module covers every variant. The [`ModelKind`]
//! selects the prior regularizer, the default generation mode and whether a
//! learned per-dimension importance gates the latent code:
//!
//! | kind    | regularizer   | generates from | importance    |
//! |---------|---------------|----------------|---------------|
//! | `ae`    | L1/L2 norm    | hybrids        | -             |
//! | `vae`   | KL            | prior          | -             |
//! | `wae`   | MMD           | prior          | -             |
//! | `swae`  | sliced W      | prior          | -             |
//! | `cae`   | L1/L2 norm    | prior          | deterministic |
//! | `cwae`  | MMD           | prior          | deterministic |
//! | `cswae` | sliced W      | prior          | deterministic |
//! | `cvae`  | KL            | prior          | stochastic    |
//!
//! Cost-aware models learn `v = sigmoid(importance)` per latent dimension and
//! pay `reg_imp_wt * sum(v^p)` for it. Deterministic models replace the code
//! with `v * q + (1 - v) * p` for prior noise `p`, so an unimportant dimension
//! carries no information. Stochastic models use `v` as the posterior scale.

use std::collections::BTreeMap;

use burn::module::{Ignored, Param};
use burn::prelude::*;
use burn::tensor::{Distribution, activation};

use burn_autoencoders_core::hybrid::{cycle_to, shuffle_dim};
use burn_autoencoders_core::output::to_f64;
use burn_autoencoders_core::regularize::{
    kl_divergence, mmd, norm_penalty, sample_prior, sample_slices, sliced_wasserstein,
};
use burn_autoencoders_core::{Latent, StatsMeter, StepOutput};
use burn_autoencoders_nets::{Decodable, Decoder, Encodable, Encoder, LatentHead};

use crate::config::{ImportanceMode, ModelConfig, ModelKind, PriorReg};
use crate::error::{Error, Result};

/// Result of encoding a batch
#[derive(Debug, Clone)]
pub struct Encoded<B: Backend> {
    /// Code passed to the decoder
    pub latent: Latent<B>,
    /// Encoder output before importance mixing (deterministic cost-aware only)
    pub raw: Option<Tensor<B, 2>>,
}

/// Latent codes kept from the last training step, used for hybrid samples
#[derive(Debug, Clone)]
pub struct LatentCache<B: Backend> {
    codes: Option<Tensor<B, 2>>,
}

impl<B: Backend> Default for LatentCache<B> {
    fn default() -> Self {
        Self { codes: None }
    }
}

impl<B: Backend> LatentCache<B> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the (detached) latent means
    pub fn store(&mut self, latent: &Latent<B>) {
        self.codes = Some(latent.clone().detach().loc());
    }

    pub fn store_codes(&mut self, codes: Tensor<B, 2>) {
        self.codes = Some(codes.detach());
    }

    pub fn codes(&self) -> Option<&Tensor<B, 2>> {
        self.codes.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_none()
    }

    /// `n` hybrid codes built from the cache
    pub fn hybrids(&self, n: usize) -> Result<Tensor<B, 2>> {
        let codes = self
            .codes
            .clone()
            .ok_or(burn_autoencoders_core::Error::NoCachedLatent)?;
        let [_, dim] = codes.dims();
        let hyb = shuffle_dim(cycle_to(codes, n));
        Ok(hyb.slice([0..n, 0..dim]))
    }
}

/// Autoencoder module
#[derive(Module, Debug)]
pub struct AutoEncoder<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
    /// Importance logits, one per latent dimension (cost-aware kinds)
    pub importance: Option<Param<Tensor<B, 1>>>,
    config: Ignored<ModelConfig>,
}

impl ModelConfig {
    /// Builds the model after validating the configuration
    pub fn init<B: Backend>(&self, device: &B::Device) -> Result<AutoEncoder<B>> {
        AutoEncoder::new(self, device)
    }
}

impl<B: Backend> AutoEncoder<B> {
    pub fn new(config: &ModelConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        if matches!(config.kind, ModelKind::Vae) && !config.encoder.head.is_distribution() {
            tracing::warn!("encoder apparently does not output a normal distribution");
        }

        let encoder = config.encoder.init(device)?;
        let decoder = config.decoder.init(device)?;

        let importance = config.kind.importance().map(|_| {
            let ca = &config.cost_aware;
            let init = Tensor::<B, 1>::random(
                [config.latent_dim()],
                Distribution::Normal(0.0, 1.0),
                device,
            )
            .mul_scalar(ca.init_imp_std)
            .add_scalar(ca.init_imp_mu);
            Param::from_tensor(init)
        });

        Ok(Self {
            encoder,
            decoder,
            importance,
            config: Ignored(config.clone()),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn kind(&self) -> ModelKind {
        self.config.kind
    }

    pub fn latent_dim(&self) -> usize {
        self.encoder.latent_dim()
    }

    /// Names of the statistics this model reports
    pub fn stat_names(&self) -> Vec<&'static str> {
        let mut names = vec!["rec_loss"];
        if self.config.reg_wt > 0.0 {
            names.push("reg");
        }
        if self.config.kind.is_cost_aware() {
            names.extend(["imp", "reg_imp", "reg_prior"]);
        }
        names
    }

    /// Registers [`Self::stat_names`] on a stats meter
    pub fn register_stats(&self, stats: &mut StatsMeter) {
        stats.new_meter(self.stat_names());
    }

    /// `sigmoid(importance)`, optionally with logit noise
    pub fn importance(&self, noisy: bool) -> Option<Tensor<B, 1>> {
        let logits = self.importance.as_ref()?.val();
        let noise = self.config.cost_aware.imp_noise;
        let logits = if noisy && noise > 0.0 {
            let eps = Tensor::random(logits.shape(), Distribution::Normal(0.0, 1.0), &logits.device());
            logits + eps.mul_scalar(noise)
        } else {
            logits
        };
        Some(activation::sigmoid(logits))
    }

    /// Encodes a batch, applying importance gating for cost-aware kinds
    pub fn encode_full(&self, x: Tensor<B, 4>) -> Encoded<B> {
        let latent = self.encoder.encode(x);

        let (Some(mode), Some(v)) = (self.config.kind.importance(), self.importance(true)) else {
            return Encoded { latent, raw: None };
        };

        match mode {
            ImportanceMode::Deterministic => {
                let q = latent.sample();
                let [batch, dim] = q.dims();
                let v = v.unsqueeze::<2>().expand([batch, dim]);
                let p = sample_prior::<B>(batch, dim, &q.device());
                let mixed = v.clone() * q.clone() + v.neg().add_scalar(1.0) * p;
                Encoded {
                    latent: Latent::Point(mixed),
                    raw: Some(q),
                }
            }
            ImportanceMode::Stochastic => {
                let loc = latent.loc();
                let scale = v.unsqueeze::<2>().expand(loc.dims());
                Encoded {
                    latent: Latent::Normal { loc, scale },
                    raw: None,
                }
            }
        }
    }

    pub fn encode(&self, x: Tensor<B, 4>) -> Latent<B> {
        self.encode_full(x).latent
    }

    /// Decodes a latent, sampling first when it is a distribution
    pub fn decode(&self, latent: &Latent<B>) -> Tensor<B, 4> {
        self.decoder.decode(latent.sample())
    }

    /// Decodes point codes
    pub fn decode_point(&self, z: Tensor<B, 2>) -> Tensor<B, 4> {
        self.decoder.decode(z)
    }

    /// Reconstruction and encoding of a batch
    pub fn forward(&self, x: Tensor<B, 4>) -> (Tensor<B, 4>, Encoded<B>) {
        let encoded = self.encode_full(x);
        let rec = self.decode(&encoded.latent);
        (rec, encoded)
    }

    /// Prior part of the regularizer
    ///
    /// `p` are prior samples matching `q`; they are drawn when not given.
    pub fn prior_regularize(&self, q: &Latent<B>, p: Option<Tensor<B, 2>>) -> Result<Tensor<B, 1>> {
        let [batch, dim] = q.dims();
        let device = q.loc().device();
        let prior = || p.clone().unwrap_or_else(|| sample_prior(batch, dim, &device));

        match self.config.prior_reg() {
            PriorReg::Norm(kind) => Ok(norm_penalty(q.loc(), kind)),
            PriorReg::Kl => match q {
                Latent::Normal { loc, scale } => Ok(kl_divergence(loc.clone(), scale.clone())),
                Latent::Point(_) => Err(Error::PointLatentKl),
            },
            PriorReg::Mmd => Ok(mmd(prior(), q.sample())),
            PriorReg::Sliced => {
                let slices = sample_slices::<B>(dim, self.config.slices(), &device);
                Ok(sliced_wasserstein(q.sample(), prior(), slices))
            }
        }
    }

    /// Full regularizer, updating the cost-aware statistics
    pub fn regularize(&self, encoded: &Encoded<B>, stats: &mut StatsMeter) -> Result<Tensor<B, 1>> {
        let Some(v) = self.importance(false) else {
            return self.prior_regularize(&encoded.latent, None);
        };
        let ca = &self.config.cost_aware;

        stats.update("imp", to_f64(v.clone().sum()))?;
        let reg_imp = v.clone().powf_scalar(ca.reg_imp_p).sum();
        stats.update("reg_imp", to_f64(reg_imp.clone()))?;

        let q = match &encoded.raw {
            Some(raw) => Latent::Point(raw.clone()),
            None => encoded.latent.clone(),
        };
        let [batch, dim] = q.dims();
        let p = sample_prior::<B>(batch, dim, &q.loc().device());

        // only point codes are weighted; a scaled distribution would change the KL target
        let (q, p) = match q {
            Latent::Point(points) if ca.weigh_distances => {
                let w = v.detach().unsqueeze::<2>().expand([batch, dim]);
                (Latent::Point(points * w.clone()), p * w)
            }
            q => (q, p),
        };

        let reg_prior = self.prior_regularize(&q, Some(p))?;
        stats.update("reg_prior", to_f64(reg_prior.clone()))?;

        Ok(reg_imp.mul_scalar(ca.reg_imp_wt) + reg_prior.mul_scalar(ca.reg_prior_wt))
    }

    /// Computes every loss term for a batch
    ///
    /// Updates `rec_loss` (and `reg` when the regularizer is enabled) on
    /// `stats`. No gradients are applied here.
    pub fn objective(&self, x: Tensor<B, 4>, stats: &mut StatsMeter) -> Result<StepOutput<B>> {
        let [batch, ..] = x.dims();
        let mut out = StepOutput::new(x.clone());

        let (rec, encoded) = self.forward(x.clone());

        let rec_loss = self.config.criterion.loss(rec.clone(), x).div_scalar(batch as f64);
        stats.update("rec_loss", to_f64(rec_loss.clone()))?;
        let mut loss = rec_loss.clone();

        if self.config.reg_wt > 0.0 {
            let reg_loss = self.regularize(&encoded, stats)?;
            stats.update("reg", to_f64(reg_loss.clone()))?;
            loss = loss + reg_loss.clone().mul_scalar(self.config.reg_wt);
            out.reg_loss = Some(reg_loss);
        }

        out.reconstruction = Some(rec);
        out.latent = Some(encoded.latent);
        out.rec_loss = Some(rec_loss);
        out.loss = Some(loss);
        Ok(out)
    }

    pub fn sample_prior(&self, n: usize, device: &B::Device) -> Tensor<B, 2> {
        sample_prior(n, self.latent_dim(), device)
    }

    pub fn generate_prior(&self, n: usize, device: &B::Device) -> Tensor<B, 4> {
        self.decode_point(self.sample_prior(n, device))
    }

    pub fn generate_hybrid(&self, cache: &LatentCache<B>, n: usize) -> Result<Tensor<B, 4>> {
        Ok(self.decode_point(cache.hybrids(n)?))
    }

    /// Samples with the kind's default generator
    pub fn generate(
        &self,
        cache: &LatentCache<B>,
        n: usize,
        device: &B::Device,
    ) -> Result<Tensor<B, 4>> {
        if self.config.kind.has_prior() {
            Ok(self.generate_prior(n, device))
        } else {
            self.generate_hybrid(cache, n)
        }
    }

    /// Hyperparameters for run summaries
    pub fn hparams(&self) -> BTreeMap<String, String> {
        let config = &*self.config;
        let mut h = config.encoder.hparams();
        h.extend(config.decoder.hparams());

        h.insert("reg_wt".into(), config.reg_wt.to_string());
        h.insert("reg_type".into(), config.prior_reg().name().into());
        if matches!(config.kind, ModelKind::Vae | ModelKind::Cvae) {
            h.insert("enc_type".into(), "VAE".into());
        }
        if matches!(config.prior_reg(), PriorReg::Sliced) {
            h.insert("slices".into(), config.slices().to_string());
        }
        if matches!(config.encoder.head, LatentHead::FixedStd { .. }) {
            h.insert("std_type".into(), "fixed".into());
        }
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CostAwareConfig;
    use burn_autoencoders_core::Criterion;
    use burn_autoencoders_nets::EncoderConfig;
    use burn_autoencoders_nets::dislib::DislibEncoderConfig;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn batch(n: usize) -> Tensor<TestBackend, 4> {
        Tensor::random([n, 1, 64, 64], Distribution::Uniform(0.0, 1.0), &Default::default())
    }

    fn model(config: ModelConfig) -> (AutoEncoder<TestBackend>, StatsMeter) {
        let model = config.init::<TestBackend>(&Default::default()).unwrap();
        let mut stats = StatsMeter::new();
        model.register_stats(&mut stats);
        (model, stats)
    }

    #[test]
    fn test_ae_objective() {
        let (model, mut stats) = model(ModelConfig::dislib64(ModelKind::Ae, 1, 4));
        assert_eq!(stats.names().collect::<Vec<_>>(), vec!["rec_loss"]);

        let out = model.objective(batch(3), &mut stats).unwrap();
        assert_eq!(out.reconstruction.unwrap().dims(), [3, 1, 64, 64]);
        assert!(out.reg_loss.is_none());
        assert!(stats.avgs()["rec_loss"] > 0.0);
    }

    #[test]
    fn test_vae_regularizes_with_kl() {
        let (model, mut stats) =
            model(ModelConfig::dislib64(ModelKind::Vae, 1, 4).with_reg_wt(1.0));

        let out = model.objective(batch(2), &mut stats).unwrap();
        assert!(out.latent.unwrap().is_distribution());
        assert!(out.reg_loss.is_some());
        assert!(stats.avgs()["reg"] >= 0.0);
        assert_eq!(model.hparams()["reg_type"], "KL");
        assert_eq!(model.hparams()["enc_type"], "VAE");
    }

    #[test]
    fn test_vae_without_regularization_fails() {
        let config = ModelConfig::dislib64(ModelKind::Vae, 1, 4);
        assert!(matches!(
            AutoEncoder::<TestBackend>::new(&config, &Default::default()),
            Err(Error::MissingRegularization(_))
        ));
    }

    #[test]
    fn test_kl_needs_distribution() {
        let mut config = ModelConfig::dislib64(ModelKind::Vae, 1, 4).with_reg_wt(1.0);
        config.encoder = EncoderConfig::dislib(DislibEncoderConfig::conv64(1, 4));
        let (model, mut stats) = model(config);

        assert!(matches!(
            model.objective(batch(2), &mut stats),
            Err(Error::PointLatentKl)
        ));
    }

    #[test]
    fn test_wae_and_swae() {
        for kind in [ModelKind::Wae, ModelKind::Swae] {
            let (model, mut stats) = model(
                ModelConfig::dislib64(kind, 1, 4)
                    .with_reg_wt(10.0)
                    .with_criterion(Criterion::Mse),
            );
            let out = model.objective(batch(4), &mut stats).unwrap();
            assert!(out.reg_loss.is_some(), "{kind:?}");
        }
    }

    #[test]
    fn test_deterministic_cost_aware_gates() {
        // huge importance logits: v = 1, the code passes through untouched
        let ca = CostAwareConfig {
            init_imp_mu: 50.0,
            init_imp_std: 0.0,
            ..Default::default()
        };
        let (model, _) = model(
            ModelConfig::dislib64(ModelKind::Cwae, 1, 4)
                .with_reg_wt(1.0)
                .with_cost_aware(ca),
        );

        let encoded = model.encode_full(batch(2));
        let raw: Vec<f32> = encoded.raw.unwrap().into_data().to_vec().unwrap();
        let mixed: Vec<f32> = encoded.latent.loc().into_data().to_vec().unwrap();
        for (a, b) in raw.iter().zip(&mixed) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_cost_aware_stats() {
        let ca = CostAwareConfig {
            weigh_distances: true,
            ..Default::default()
        };
        let (model, mut stats) = model(
            ModelConfig::dislib64(ModelKind::Cswae, 1, 4)
                .with_reg_wt(1.0)
                .with_slices(8)
                .with_cost_aware(ca),
        );

        model.objective(batch(3), &mut stats).unwrap();
        let avgs = stats.avgs();
        for name in ["imp", "reg_imp", "reg_prior", "reg", "rec_loss"] {
            assert!(avgs.contains_key(name), "missing {name}");
        }
        // v in (0, 1) for each of the 4 dims
        assert!(avgs["imp"] > 0.0 && avgs["imp"] < 4.0);
        assert_eq!(model.hparams()["slices"], "8");
    }

    #[test]
    fn test_stochastic_cost_aware_scale() {
        let (model, mut stats) = model(ModelConfig::dislib64(ModelKind::Cvae, 1, 4).with_reg_wt(1.0));

        let encoded = model.encode_full(batch(2));
        let scale: Vec<f32> = encoded.latent.scale().unwrap().into_data().to_vec().unwrap();
        let v: Vec<f32> = model.importance(false).unwrap().into_data().to_vec().unwrap();
        assert_eq!(&scale[0..4], v.as_slice());

        assert!(model.objective(batch(2), &mut stats).is_ok());
    }

    #[test]
    fn test_importance_noise_perturbs_scale() {
        let ca = CostAwareConfig {
            imp_noise: 1.0,
            ..Default::default()
        };
        let (model, _) = model(
            ModelConfig::dislib64(ModelKind::Cvae, 1, 4)
                .with_reg_wt(1.0)
                .with_cost_aware(ca),
        );
        let v: Vec<f32> = model.importance(false).unwrap().into_data().to_vec().unwrap();

        let x = batch(1);
        let scale = |encoded: Encoded<TestBackend>| -> Vec<f32> {
            encoded.latent.scale().unwrap().into_data().to_vec().unwrap()
        };
        let first = scale(model.encode_full(x.clone()));
        let second = scale(model.encode_full(x));

        assert!(first.iter().zip(&v).any(|(a, b)| (a - b).abs() > 1e-4));
        assert!(first.iter().zip(&second).any(|(a, b)| (a - b).abs() > 1e-4));
        assert!(first.iter().all(|s| *s > 0.0 && *s < 1.0));
    }

    #[test]
    fn test_weigh_distances_scales_prior_term() {
        let reg_prior = |weigh_distances: bool| {
            // v = sigmoid(-50): no dimension is important
            let ca = CostAwareConfig {
                init_imp_mu: -50.0,
                init_imp_std: 0.0,
                weigh_distances,
                ..Default::default()
            };
            let (model, mut stats) = model(
                ModelConfig::dislib64(ModelKind::Cae, 1, 4)
                    .with_reg_wt(1.0)
                    .with_cost_aware(ca),
            );
            model.objective(batch(3), &mut stats).unwrap();
            stats.avgs()["reg_prior"]
        };

        assert!(reg_prior(true).abs() < 1e-6);
        assert!(reg_prior(false) > 1e-4);
    }

    #[test]
    fn test_generation() {
        let device = Default::default();
        let (model, _) = model(ModelConfig::dislib64(ModelKind::Ae, 1, 4));
        let mut cache = LatentCache::new();

        assert!(matches!(
            model.generate_hybrid(&cache, 2),
            Err(Error::Core(burn_autoencoders_core::Error::NoCachedLatent))
        ));

        cache.store(&model.encode(batch(3)));
        assert_eq!(model.generate(&cache, 5, &device).unwrap().dims(), [5, 1, 64, 64]);
        assert_eq!(model.generate_prior(2, &device).dims(), [2, 1, 64, 64]);
    }
}
