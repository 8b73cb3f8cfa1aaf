use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vecplot::config::{Settings, VecplotConfig};
use vecplot::pipeline;
use vecplot::qdrant::QdrantStore;
use vecplot::store::{JsonlStore, VectorStore};

#[derive(Parser)]
#[command(name = "vecplot")]
#[command(version = "0.1")]
#[command(about = "Project vector store embeddings to 2D with t-SNE and plot them", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, reduce and render once
    Plot {
        #[command(flatten)]
        overrides: Overrides,
        /// Read points from a JSON-lines file instead of the vector store
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the effective configuration
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },
}

/// Flags layered on top of `vecplot_config.*` and `VECPLOT_*`.
#[derive(Args)]
struct Overrides {
    /// Qdrant gRPC URL
    #[arg(long)]
    endpoint: Option<String>,
    #[arg(short, long)]
    collection: Option<String>,
    /// Named vector to read, for collections with several vectors per point
    #[arg(long)]
    vector_name: Option<String>,
    /// Payload field used for coloring
    #[arg(short, long)]
    attribute: Option<String>,
    /// Maximum number of points to fetch
    #[arg(short, long)]
    limit: Option<usize>,
    #[arg(long)]
    perplexity: Option<f64>,
    #[arg(long)]
    seed: Option<u64>,
    #[arg(long)]
    iterations: Option<usize>,
    #[arg(long)]
    learning_rate: Option<f64>,
    /// Image to write; `.svg` selects SVG output
    #[arg(short, long)]
    output: Option<String>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// `neutral` or `fail` when every point has the same attribute value
    #[arg(long)]
    flat_attribute: Option<String>,
    #[arg(short, long)]
    verbose: bool,
}

impl Overrides {
    fn into_config(self) -> VecplotConfig {
        VecplotConfig {
            store_endpoint: self.endpoint,
            collection_name: self.collection,
            vector_name: self.vector_name,
            attribute_key: self.attribute,
            fetch_limit: self.limit,
            neighborhood_size: self.perplexity,
            random_seed: self.seed,
            max_iterations: self.iterations,
            learning_rate: self.learning_rate,
            output_path: self.output,
            image_width: self.width,
            image_height: self.height,
            flat_attribute: self.flat_attribute,
            verbose: self.verbose.then_some(true),
            ..Default::default()
        }
    }
}

fn load_settings(overrides: Overrides) -> Result<Settings> {
    let layered = VecplotConfig::load()
        .context("Failed to read configuration")?
        .overlay(overrides.into_config());
    Settings::resolve(layered).context("Invalid configuration")
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn plot_command(settings: &Settings, input: Option<PathBuf>) -> Result<()> {
    let mut store: Box<dyn VectorStore> = match input {
        Some(path) => {
            info!("Reading points from {}", path.display());
            Box::new(JsonlStore::new(path))
        }
        None => Box::new(
            QdrantStore::connect(&settings.store).context("Failed to connect to the vector store")?,
        ),
    };

    let report = pipeline::run(store.as_mut(), settings).context("Pipeline failed")?;
    info!(
        "Plotted {} points of dimension {} to {}{}",
        report.fetched,
        report.dimensions,
        report.output_path.display(),
        if report.has_variance { "" } else { " (attribute had no variance)" }
    );
    Ok(())
}

fn config_command(settings: &Settings) -> Result<()> {
    settings.print_config();
    Ok(())
}

fn main() -> Result<()> {
    let args = Cli::parse();

    match args.command {
        Commands::Plot { overrides, input } => {
            let settings = load_settings(overrides)?;
            init_logging(settings.verbose);
            plot_command(&settings, input)?
        }
        Commands::Config { overrides } => {
            let settings = load_settings(overrides)?;
            config_command(&settings)?
        }
    }
    Ok(())
}
