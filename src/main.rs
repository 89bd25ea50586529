//! Interactive ablation viewer.
//!
//! ```bash
//! # Random demo network
//! cargo run -- --seed 3 --epochs 12
//!
//! # Topology and weights exported by the training backend
//! cargo run -- --topology model.json --weights weights.json --network-id mnist
//! ```
//!
//! Click a unit to detach it, click a connection to inspect its weight,
//! scroll to zoom and drag to pan.

mod viewer;

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use log::info;

use nn_ablation_viz::VizConfig;

#[derive(Parser, Debug)]
#[command(name = "nn-ablation-viz")]
#[command(about = "Inspect and ablate the units of a trained network", long_about = None)]
struct Cli {
    /// Topology JSON with `conv_layers` and `layers`
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Per-epoch weight JSON, keyed by epoch then layer
    #[arg(long, requires = "topology")]
    weights: Option<PathBuf>,

    /// Layout, threshold and debounce settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed for the demo network
    #[arg(long, default_value = "7")]
    seed: u64,

    /// Epochs in the demo network
    #[arg(long, default_value = "8")]
    epochs: usize,

    /// Network id sent with ablation requests
    #[arg(long, default_value = "demo")]
    network_id: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => VizConfig::load(path)?,
        None => VizConfig::default(),
    };
    let (shape, history) = viewer::load_inputs(
        cli.topology.as_deref(),
        cli.weights.as_deref(),
        cli.seed,
        cli.epochs,
    )?;
    let app = viewer::AblationApp::new(&config, shape, history, cli.network_id)?;
    info!("starting viewer");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1200.0, 800.0]),
        ..Default::default()
    };
    eframe::run_native(
        "NN Ablation Visualizer",
        options,
        Box::new(|_cc| Ok(Box::new(app))),
    )?;
    Ok(())
}
