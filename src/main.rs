use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, Level};

use popquiz::{
    composition::QuizEngine,
    config::Config,
    stream::{BackendRegistry, FfmpegToolchain, Toolchain},
};

#[derive(Parser)]
#[command(
    name = "popquiz",
    version,
    about = "Build themed pop-quiz videos from a JSON round file",
    long_about = "popquiz cuts question and answer videos out of downloaded clips, local files and generated text cards, labels them, and concatenates them behind title cards into one question and one answer video per round."
)]
struct Cli {
    /// Input JSON file describing the round
    #[arg(short, long)]
    input_file: PathBuf,

    /// Output directory for sources, units and the round videos
    #[arg(short, long)]
    output_dir: PathBuf,

    /// Rendering backend (graph, clip)
    #[arg(short, long)]
    backend: Option<String>,

    /// Video width
    #[arg(long)]
    width: Option<u32>,

    /// Video height
    #[arg(long)]
    height: Option<u32>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting popquiz v{}", env!("CARGO_PKG_VERSION"));
    info!("Input: {:?}", cli.input_file);
    info!("Output: {:?}", cli.output_dir);

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Some(backend) = cli.backend {
        config.tools.backend = backend;
    }
    if let Some(width) = cli.width {
        config.video.width = width;
    }
    if let Some(height) = cli.height {
        config.video.height = height;
    }
    config.validate().map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let toolchain = FfmpegToolchain::detect(&config.tools)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    info!("Using ffmpeg {}", toolchain.version().as_str());
    info!(
        "Backend: {} (available: {})",
        config.tools.backend,
        BackendRegistry::new().available_backends().join(", ")
    );

    std::fs::create_dir_all(&cli.output_dir)
        .with_context(|| format!("Cannot create output directory {:?}", cli.output_dir))?;

    let engine = QuizEngine::from_config(config, Arc::new(toolchain))?;
    let input_file = cli.input_file.clone();
    let output_dir = cli.output_dir.clone();

    info!("Starting quiz rendering...");
    let outputs = tokio::task::spawn_blocking(move || engine.render_file(&input_file, &output_dir))
        .await
        .context("Render task panicked")?
        .map_err(|e| {
            if e.is_configuration_error() {
                anyhow::anyhow!("{} (check {:?})", e.user_message(), cli.input_file)
            } else {
                anyhow::anyhow!(e.user_message())
            }
        })?;

    info!("Question video: {:?}", outputs.questions);
    match outputs.answers {
        Some(answers) => info!("Answer video: {:?}", answers),
        None => info!("No separate answer video for this round"),
    }
    Ok(())
}
