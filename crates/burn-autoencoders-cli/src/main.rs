//! burn-autoencoders CLI
//!
//! Command-line interface for training and sampling autoencoders.
//!
//! Supports:
//! - Training any model kind on an image folder
//! - Evaluating a checkpoint (statistics, samples, traversals)
//! - Generating sample grids from the prior or from hybrids
//! - Training the supervised baseline classifier on class folders

use anyhow::{Context, Result};
use burn::module::{AutodiffModule, Module};
use burn::optim::AdamConfig;
use burn::record::{CompactRecorder, Recorder};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use burn_autoencoders::backends::{DefaultBackend, TrainBackend, backend_name, default_device};
use burn_autoencoders::{
    ClassifierConfig, DirLogger, ImageBatch, ImageFolder, RunConfig, TrainConfig, Trainer,
    evaluate, evaluate_classifier, fit_classifier, load_checkpoint, load_latent_cache,
};

/// Where generated samples come from
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum GenMode {
    /// The model's default (prior, or hybrids for plain autoencoders)
    #[default]
    Auto,
    /// Decode standard normal samples
    Prior,
    /// Decode dimension-shuffled codes of real images
    Hybrid,
}

#[derive(Parser)]
#[command(name = "burn-autoencoders")]
#[command(about = "Generative autoencoders in pure Rust (AE, VAE, WAE, SWAE, cost-aware)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model on a folder of images
    Train {
        /// Run configuration (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Image folder
        #[arg(short, long)]
        data: PathBuf,

        /// Output directory; the run gets a subdirectory named after it
        #[arg(short, long, default_value = "runs")]
        out: PathBuf,

        /// Override the number of iterations
        #[arg(long)]
        iterations: Option<usize>,

        /// Override the batch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override the learning rate
        #[arg(long)]
        lr: Option<f64>,

        /// Override the visualization interval (0 disables)
        #[arg(long)]
        viz_every: Option<usize>,

        /// Override the checkpoint interval (0 disables)
        #[arg(long)]
        save_every: Option<usize>,
    },

    /// Evaluate a checkpoint
    Eval {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(short, long)]
        data: PathBuf,

        /// Checkpoint saved by `train`
        #[arg(long)]
        checkpoint: PathBuf,

        /// Directory for logs, images and videos
        #[arg(short, long)]
        out: PathBuf,

        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Stop after this many batches
        #[arg(long)]
        max_batches: Option<usize>,
    },

    /// Generate a grid of samples
    Generate {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long)]
        checkpoint: PathBuf,

        /// Output image path
        #[arg(short, long, default_value = "samples.png")]
        out: PathBuf,

        /// Number of samples
        #[arg(short, default_value = "64")]
        n: usize,

        #[arg(long, value_enum, default_value_t = GenMode::Auto)]
        mode: GenMode,

        /// Image folder used to prime hybrid samples when the checkpoint
        /// has no saved codes
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Train the supervised baseline classifier on class folders
    Classify {
        /// Image folder with one subdirectory per class
        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long, default_value = "runs/classifier")]
        out: PathBuf,

        /// Image shape as channels,height,width
        #[arg(long, value_delimiter = ',', default_values_t = [1, 64, 64])]
        shape: Vec<usize>,

        /// Hidden layer widths
        #[arg(long, value_delimiter = ',', default_values_t = [256])]
        hidden: Vec<usize>,

        #[arg(long, default_value = "1000")]
        iterations: usize,

        #[arg(long, default_value = "64")]
        batch_size: usize,

        #[arg(long, default_value = "1e-3")]
        lr: f64,
    },

    /// Print the run name
    Name {
        #[arg(short, long)]
        config: PathBuf,

        /// Image folder, used when the config names no dataset
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn dir_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

#[allow(clippy::too_many_arguments)]
fn run_train(
    config_path: &Path,
    data_dir: &Path,
    out: &Path,
    iterations: Option<usize>,
    batch_size: Option<usize>,
    lr: Option<f64>,
    viz_every: Option<usize>,
    save_every: Option<usize>,
) -> Result<()> {
    let mut run = load_config(config_path)?;
    if let Some(v) = iterations {
        run.train.iterations = v;
    }
    if let Some(v) = batch_size {
        run.train.batch_size = v;
    }
    if let Some(v) = lr {
        run.train.learning_rate = v;
    }
    if let Some(v) = viz_every {
        run.train.viz_every = v;
    }
    if let Some(v) = save_every {
        run.train.save_every = v;
    }
    if run.train.batch_size == 0 {
        anyhow::bail!("--batch-size must be positive");
    }

    let name = run.run_name(dir_name(data_dir).as_deref());
    let run_dir = out.join(&name);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("Failed to create {}", run_dir.display()))?;
    run.save(run_dir.join("config.json"))?;

    tracing::info!(run = %name, backend = backend_name(), "starting training");

    let data = ImageFolder::new(data_dir, run.model.encoder.in_shape())?;
    let device = default_device();
    let model = run.model.init::<TrainBackend>(&device)?;
    for (key, value) in model.hparams() {
        tracing::debug!(%key, %value, "hparam");
    }

    let mut logger = DirLogger::new(run_dir.join("logs"))?;
    let mut trainer = Trainer::new(model, AdamConfig::new().init(), run.train.clone());

    let pb = ProgressBar::new(run.train.iterations as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let checkpoints = run_dir.join("checkpoints");
    std::fs::create_dir_all(&checkpoints)?;
    trainer.fit(&data, &mut logger, Some(&checkpoints), |iteration, stats| {
        pb.set_position(iteration as u64);
        if let Some(loss) = stats.get("rec_loss").and_then(|m| m.smooth) {
            pb.set_message(format!("rec_loss {loss:.4}"));
        }
    })?;
    pb.finish_and_clear();

    let batches = data.batches(run.train.batch_size, false);
    let first = batches
        .into_iter()
        .take(1)
        .map(|indices| data.batch::<DefaultBackend>(&indices, &device))
        .collect::<burn_autoencoders::Result<Vec<_>>>()?;
    let report = trainer.evaluate(first, &mut logger)?;
    std::fs::write(
        run_dir.join("eval.json"),
        serde_json::to_string_pretty(&report)?,
    )?;

    println!("Run saved to {}", run_dir.display());
    Ok(())
}

fn run_eval(
    config_path: &Path,
    data_dir: &Path,
    checkpoint: &Path,
    out: &Path,
    batch_size: usize,
    max_batches: Option<usize>,
) -> Result<()> {
    if batch_size == 0 {
        anyhow::bail!("--batch-size must be positive");
    }
    let run = load_config(config_path)?;
    let device = default_device();
    let model = load_checkpoint::<DefaultBackend, _>(&run.model, checkpoint, &device)
        .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;

    let cache = load_latent_cache::<DefaultBackend, _>(checkpoint, &device)?;
    if cache.is_empty() {
        tracing::warn!("checkpoint has no saved codes; hybrids use the evaluated images");
    }

    let data = ImageFolder::new(data_dir, run.model.encoder.in_shape())?;
    let mut chunks = data.batches(batch_size, false);
    if let Some(max) = max_batches {
        chunks.truncate(max);
    }

    let pb = ProgressBar::new(chunks.len() as u64);
    let mut batches = Vec::with_capacity(chunks.len());
    for indices in &chunks {
        batches.push(data.batch::<DefaultBackend>(indices, &device)?);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let mut logger = DirLogger::new(out)?;
    let report = evaluate(&model, &cache, batches, &mut logger)?;
    std::fs::write(out.join("eval.json"), serde_json::to_string_pretty(&report)?)?;

    for (name, value) in &report.stats {
        println!("{name:>12}: {value:.5}");
    }
    println!("{:>12}: {}", "samples", report.count);
    Ok(())
}

fn run_generate(
    config_path: &Path,
    checkpoint: &Path,
    out: &Path,
    n: usize,
    mode: GenMode,
    data_dir: Option<&Path>,
) -> Result<()> {
    let run = load_config(config_path)?;
    let device = default_device();
    let model = load_checkpoint::<DefaultBackend, _>(&run.model, checkpoint, &device)
        .with_context(|| format!("Failed to load checkpoint {}", checkpoint.display()))?;

    let needs_data = match mode {
        GenMode::Auto => !run.model.kind.has_prior(),
        GenMode::Hybrid => true,
        GenMode::Prior => false,
    };

    let mut cache = load_latent_cache::<DefaultBackend, _>(checkpoint, &device)?;
    if needs_data && cache.is_empty() {
        let Some(dir) = data_dir else {
            anyhow::bail!("checkpoint has no saved codes; pass --data to prime hybrid samples");
        };
        let data = ImageFolder::new(dir, run.model.encoder.in_shape())?;
        let indices: Vec<usize> = (0..data.len().min(n.max(1))).collect();
        let x = data.batch::<DefaultBackend>(&indices, &device)?;
        cache.store(&model.encode(x));
    }

    let samples = match mode {
        GenMode::Auto => model.generate(&cache, n, &device)?,
        GenMode::Prior => model.generate_prior(n, &device),
        GenMode::Hybrid => model.generate_hybrid(&cache, n)?,
    };

    let cols = (n as f64).sqrt().ceil() as usize;
    let grid = ImageBatch::from_tensor(samples)?.grid(cols);
    grid.save(out)
        .with_context(|| format!("Failed to save {}", out.display()))?;
    println!("Saved {n} samples to {}", out.display());
    Ok(())
}

fn run_classify(
    data_dir: &Path,
    out: &Path,
    shape: &[usize],
    hidden: Vec<usize>,
    train: TrainConfig,
) -> Result<()> {
    let shape: [usize; 3] = shape
        .try_into()
        .map_err(|_| anyhow::anyhow!("--shape needs 3 values, got {}", shape.len()))?;
    if train.batch_size == 0 {
        anyhow::bail!("--batch-size must be positive");
    }

    let data = ImageFolder::new(data_dir, shape)?;
    if data.classes().len() < 2 {
        anyhow::bail!(
            "{} needs at least two class folders, found {}",
            data_dir.display(),
            data.classes().len()
        );
    }
    std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;

    let config = ClassifierConfig {
        hidden,
        ..ClassifierConfig::new(shape, data.classes().len())
    };
    let device = default_device();
    let model = config.init::<TrainBackend>(&device);
    let mut logger = DirLogger::new(out.join("logs"))?;

    let pb = ProgressBar::new(train.iterations as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );
    let model = fit_classifier(
        model,
        &mut AdamConfig::new().init(),
        &data,
        &train,
        &mut logger,
        |iteration, stats| {
            pb.set_position(iteration as u64);
            if let Some(error) = stats.get("error").and_then(|m| m.smooth) {
                pb.set_message(format!("error {error:.3}"));
            }
        },
    )?;
    pb.finish_and_clear();

    let model = model.valid();
    let report = evaluate_classifier(&model, &data, train.batch_size, &mut logger)?;
    Recorder::<DefaultBackend>::record(
        &CompactRecorder::new(),
        model.into_record(),
        out.join("classifier"),
    )?;
    std::fs::write(out.join("classes.json"), serde_json::to_string_pretty(data.classes())?)?;
    std::fs::write(out.join("eval.json"), serde_json::to_string_pretty(&report)?)?;

    for (name, value) in &report.stats {
        println!("{name:>12}: {value:.5}");
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            config,
            data,
            out,
            iterations,
            batch_size,
            lr,
            viz_every,
            save_every,
        } => run_train(
            &config, &data, &out, iterations, batch_size, lr, viz_every, save_every,
        ),
        Commands::Eval {
            config,
            data,
            checkpoint,
            out,
            batch_size,
            max_batches,
        } => run_eval(&config, &data, &checkpoint, &out, batch_size, max_batches),
        Commands::Generate {
            config,
            checkpoint,
            out,
            n,
            mode,
            data,
        } => run_generate(&config, &checkpoint, &out, n, mode, data.as_deref()),
        Commands::Classify {
            data,
            out,
            shape,
            hidden,
            iterations,
            batch_size,
            lr,
        } => run_classify(
            &data,
            &out,
            &shape,
            hidden,
            TrainConfig {
                iterations,
                batch_size,
                learning_rate: lr,
                viz_every: 100,
                save_every: 0,
            },
        ),
        Commands::Name { config, data } => {
            let run = load_config(&config)?;
            let fallback = data.as_deref().and_then(dir_name);
            println!("{}", run.run_name(fallback.as_deref()));
            Ok(())
        }
    }
}
