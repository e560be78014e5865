use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use pixelforest_rf::{
    COORDINATOR_RANK, Coordinator, Evaluation, EvaluationReport, Forest, FrameSet, LabelTable,
    PixelRef, ToCoordinator, ToWorker, TrainConfig, Worker, channel_pair, synthetic_scene,
};

/// Seed of the scene held out for evaluation; training scenes use `1..=frames`.
const HELD_OUT_SCENE_SEED: u64 = 1_000;

#[derive(Parser)]
#[command(name = "pixelforest")]
#[command(about = "Randomized decision forests for per-pixel depth image classification")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for reproducibility (overrides the config file)
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Train on synthetic depth scenes and evaluate on a held-out scene
    Demo {
        /// Training configuration as JSON; missing fields take their defaults
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of trees (overrides the config file)
        #[arg(long)]
        trees: Option<usize>,

        /// Number of training scenes to render
        #[arg(long, default_value_t = 4)]
        frames: usize,

        /// Scene width in pixels
        #[arg(long, default_value_t = 64)]
        width: usize,

        /// Scene height in pixels
        #[arg(long, default_value_t = 48)]
        height: usize,

        /// Pixels drawn from each scene per tree
        #[arg(long, default_value_t = 500)]
        pixels_per_frame: usize,

        /// In-process workers sharing the split search (0 = local training)
        #[arg(long, default_value_t = 0)]
        workers: usize,

        /// Write the trained trees to this directory as `<i>.tree` files
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Write a binary snapshot of the forest to this file
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Load a trained forest and print per-tree statistics
    Inspect {
        /// Directory of `<i>.tree` files
        #[arg(long, conflicts_with = "snapshot", required_unless_present = "snapshot")]
        dir: Option<PathBuf>,

        /// Binary snapshot written by `demo --snapshot`
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Number of trees in the directory
        #[arg(long, requires = "dir")]
        trees: Option<usize>,

        /// Probabilities per leaf line
        #[arg(long, default_value_t = 3)]
        label_count: usize,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct DemoOutput {
    participants: usize,
    n_trees: usize,
    label_count: usize,
    n_nodes: usize,
    max_depth: usize,
    error_rate: f64,
    object_error_rate: f64,
    labels: Vec<LabelOutput>,
}

#[derive(Serialize)]
struct LabelOutput {
    label: u32,
    name: String,
    precision: f64,
    recall: f64,
    f1: f64,
    support: usize,
}

#[derive(Serialize)]
struct InspectOutput {
    n_trees: usize,
    label_count: usize,
    trees: Vec<TreeOutput>,
}

#[derive(Serialize)]
struct TreeOutput {
    index: usize,
    n_nodes: usize,
    n_leaves: usize,
    depth: usize,
}

fn load_config(path: Option<&Path>, seed: Option<u64>, trees: Option<usize>) -> Result<TrainConfig> {
    let mut config = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse config {}", path.display()))?
        }
        None => TrainConfig::default(),
    };
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    if let Some(trees) = trees {
        config = config.with_number_of_trees(trees);
    }
    config.validate().context("invalid training configuration")?;
    Ok(config)
}

/// Train with `n_workers` in-process workers, each on its own replica.
fn train_distributed(config: &TrainConfig, frames: &FrameSet, n_workers: usize) -> Result<Forest> {
    let participants = n_workers + 1;
    let mut links = Vec::with_capacity(n_workers);
    let mut handles = Vec::with_capacity(n_workers);
    for rank in 1..=n_workers {
        let (coordinator_end, worker_end) =
            channel_pair::<ToWorker, ToCoordinator>(COORDINATOR_RANK, rank);
        links.push(coordinator_end);
        let mut worker = Worker::<PixelRef, _, _>::new(
            rank,
            participants,
            config,
            frames.clone(),
            worker_end,
        )?;
        handles.push(thread::spawn(move || worker.run()));
    }

    let forest = Coordinator::new(config, links)?
        .train::<PixelRef>(&mut frames.clone())
        .context("distributed training failed")?;
    for (i, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(result) => {
                result.with_context(|| format!("worker {} failed", i + 1))?;
            }
            Err(_) => bail!("worker {} panicked", i + 1),
        }
    }
    Ok(forest)
}

fn label_outputs(report: &EvaluationReport, table: &LabelTable) -> Vec<LabelOutput> {
    report
        .confusion
        .label_metrics()
        .into_iter()
        .map(|m| LabelOutput {
            label: m.label.id(),
            name: table.name(m.label).unwrap_or("unknown").to_string(),
            precision: m.precision,
            recall: m.recall,
            f1: m.f1,
            support: m.support,
        })
        .collect()
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Demo {
            config,
            trees,
            frames,
            width,
            height,
            pixels_per_frame,
            workers,
            output_dir,
            snapshot,
        } => {
            if width == 0 || height == 0 || frames == 0 {
                bail!("scene size and frame count must be positive");
            }
            let config = load_config(config.as_deref(), cli.seed, trees)?;

            let mut labels = LabelTable::new();
            labels.register("box")?;
            labels.register("ball")?;

            // 1. Render scenes
            let scenes = (1..=frames as u64)
                .map(|seed| synthetic_scene(width, height, seed))
                .collect();
            let mut train_set = FrameSet::new(scenes, pixels_per_frame).with_background(true);
            info!(frames, width, height, pixels_per_frame, "scenes rendered");

            // 2. Train
            let forest = if workers == 0 {
                Forest::train::<PixelRef>(&mut train_set, None, &config)
                    .context("training failed")?
            } else {
                if config.candidates_per_node() % (config.search_threads() * (workers + 1)) != 0 {
                    warn!(
                        candidates = config.candidates_per_node(),
                        "candidate budget does not divide evenly across participants"
                    );
                }
                train_distributed(&config, &train_set, workers)?
            };

            // 3. Evaluate on a held-out scene
            let test_set = FrameSet::new(vec![synthetic_scene(width, height, HELD_OUT_SCENE_SEED)], 1);
            let report = Evaluation::new()
                .run(&forest, &test_set)
                .context("evaluation failed")?;
            let objects = Evaluation::new()
                .with_skip_background(true)
                .run(&forest, &test_set)
                .context("evaluation failed")?;

            // 4. Persist
            if let Some(dir) = &output_dir {
                forest
                    .write_dir(dir)
                    .with_context(|| format!("failed to write trees to {}", dir.display()))?;
            }
            if let Some(path) = &snapshot {
                forest.save(path).context("failed to save snapshot")?;
            }

            // 5. Print summary
            let output = DemoOutput {
                participants: workers + 1,
                n_trees: forest.n_trees(),
                label_count: forest.label_count(),
                n_nodes: forest.trees().iter().map(|t| t.n_nodes()).sum(),
                max_depth: forest.trees().iter().map(|t| t.depth()).max().unwrap_or(0),
                error_rate: report.error_rate,
                object_error_rate: objects.error_rate,
                labels: label_outputs(&report, &labels),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Command::Inspect {
            dir,
            snapshot,
            trees,
            label_count,
        } => {
            let forest = match (dir, snapshot) {
                (Some(dir), _) => {
                    let Some(n_trees) = trees else {
                        bail!("--trees is required with --dir");
                    };
                    Forest::load_dir(n_trees, label_count, &dir)
                        .with_context(|| format!("failed to load trees from {}", dir.display()))?
                }
                (None, Some(path)) => Forest::load(&path).context("failed to load snapshot")?,
                (None, None) => bail!("one of --dir or --snapshot is required"),
            };

            let output = InspectOutput {
                n_trees: forest.n_trees(),
                label_count: forest.label_count(),
                trees: forest
                    .trees()
                    .iter()
                    .enumerate()
                    .map(|(index, tree)| TreeOutput {
                        index,
                        n_nodes: tree.n_nodes(),
                        n_leaves: tree.n_leaves(),
                        depth: tree.depth(),
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
