//! Speechface CLI - train and preview speech-driven facial animation

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use speechface::{MoodSource, PipelineConfig, PreviewPipeline, Trainer, VERSION};

/// Speechface - speech-driven facial animation training in Rust
#[derive(Parser, Debug)]
#[command(name = "speechface")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use CPU even when CUDA is available
    #[arg(long, global = true)]
    cpu: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a model on one clip's audio and target frames
    Train {
        /// Path to a pipeline config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Data root holding data/<clip>/ (overrides config and env)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Clip name under the data root
        #[arg(long)]
        clip: Option<String>,

        /// Number of epochs to run
        #[arg(long)]
        epochs: Option<usize>,

        /// Examples per optimizer step
        #[arg(long)]
        batch_size: Option<usize>,

        /// Batch preparation threads
        #[arg(long)]
        workers: Option<usize>,

        /// Seed for batch shuffling, jitter and the mood table
        #[arg(long)]
        seed: Option<u64>,

        /// Smooth the initial mood table down the time axis
        #[arg(long)]
        smooth_mood: bool,

        /// Disable the one-row analysis window jitter
        #[arg(long)]
        no_jitter: bool,
    },

    /// Predict vertex offsets for a clip with a trained checkpoint
    Preview {
        /// Checkpoint to load
        #[arg(short = 'k', long)]
        checkpoint: PathBuf,

        /// Audio clip to preview
        #[arg(short, long)]
        audio: PathBuf,

        /// Directory for the pred.<n>.npy frames
        #[arg(short, long, default_value = "preview")]
        output: PathBuf,

        /// Condition on a learned mood row of the training clip
        #[arg(long, conflicts_with = "mood_vector")]
        mood_frame: Option<usize>,

        /// Condition on an explicit mood vector, comma separated
        #[arg(long)]
        mood_vector: Option<String>,

        /// Path to a pipeline config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Show the tensors inside a checkpoint
    Info {
        /// Checkpoint to inspect
        #[arg(short = 'k', long)]
        checkpoint: PathBuf,
    },
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn create_progress_bar(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb
}

fn load_config(path: &Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(p) => PipelineConfig::load(p),
        None => Ok(PipelineConfig::default()),
    }
}

fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else {
        Ok(Device::cuda_if_available(0)?)
    }
}

fn parse_mood_vector(raw: &str) -> Result<Vec<f32>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid mood component: {part:?}"))
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    info!("speechface v{}", VERSION);

    match cli.command {
        Commands::Train {
            config,
            root,
            clip,
            epochs,
            batch_size,
            workers,
            seed,
            smooth_mood,
            no_jitter,
        } => {
            let mut cfg = load_config(&config)?;
            if let Some(root) = root {
                cfg.root_path = root;
            }
            if let Some(clip) = clip {
                cfg.clip = clip;
            }
            if let Some(epochs) = epochs {
                cfg.epochs = epochs;
            }
            if let Some(batch_size) = batch_size {
                cfg.batch_size = batch_size;
            }
            if let Some(workers) = workers {
                cfg.workers = workers;
            }
            if let Some(seed) = seed {
                cfg.seed = seed;
            }
            if smooth_mood {
                cfg.smooth_mood_init = true;
            }
            if no_jitter {
                cfg.jitter = false;
            }

            let device = select_device(cli.cpu)?;
            let pb = create_progress_bar("Preparing training run...");
            let trainer = Trainer::new(cfg, device);
            pb.finish_and_clear();
            let mut trainer = trainer?;

            let outcome = trainer.train()?;
            info!(
                "run {} finished after {} epochs, final checkpoint {}",
                outcome.run,
                outcome.epochs_run,
                outcome.final_checkpoint.display()
            );
            Ok(())
        }

        Commands::Preview {
            checkpoint,
            audio,
            output,
            mood_frame,
            mood_vector,
            config,
        } => {
            let cfg = load_config(&config)?;
            let device = select_device(cli.cpu)?;
            let mood = if let Some(raw) = mood_vector {
                MoodSource::Vector(parse_mood_vector(&raw)?)
            } else {
                MoodSource::Frame(mood_frame.unwrap_or(0))
            };

            let pb = create_progress_bar("Loading checkpoint...");
            let pipeline = PreviewPipeline::new(&checkpoint, &audio, cfg, device);
            pb.finish_and_clear();
            let pipeline = pipeline?;

            info!("predicting {} frames", pipeline.frame_count());
            let predictions = pipeline.run(&mood)?;
            let paths = pipeline.write_frames(&output, &predictions)?;
            info!("wrote {} frames to {}", paths.len(), output.display());
            Ok(())
        }

        Commands::Info { checkpoint } => {
            let tensors = candle_core::safetensors::load(&checkpoint, &Device::Cpu)
                .with_context(|| format!("failed to read checkpoint: {}", checkpoint.display()))?;
            let mut names: Vec<&String> = tensors.keys().collect();
            names.sort();

            let mut total = 0usize;
            for name in &names {
                let dims = tensors[*name].dims();
                total += dims.iter().product::<usize>();
                println!("  {name:<48} {dims:?}");
            }
            println!("{} tensors, {} parameters", names.len(), total);
            Ok(())
        }
    }
}
