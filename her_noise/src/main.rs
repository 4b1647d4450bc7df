use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::helper_functions::resolve_path;
use crate::models::Background;
use crate::pipeline::{CombineStage, CompareStage};

mod analysis;
mod comparison;
mod config;
mod data_handling;
mod errors;
mod helper_functions;
mod models;
mod pipeline;
mod plotting;

#[derive(Parser)]
#[command(name = "her_noise", about = "her1/her7 expression noise analysis of segmented embryos")]
struct Cli {
    /// TOML file overriding the analysis constants
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Heatmaps and spatial expression of one embryo folder
    Embryo {
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Combine the slice workbooks of one genetic background
    Combine {
        #[arg(short, long)]
        out: PathBuf,
        /// Number of equal-width her bins
        #[arg(short = 'b', long, default_value_t = 5)]
        num_bins: usize,
        /// Run only these stages
        #[arg(long, value_enum, value_delimiter = ',')]
        only: Vec<CombineStage>,
        #[arg(short, long, num_args = 1.., required = true)]
        inputs: Vec<PathBuf>,
    },
    /// Compare the combined outputs of several genetic backgrounds
    Compare {
        #[arg(short, long)]
        out: PathBuf,
        #[arg(long, value_enum, value_delimiter = ',')]
        only: Vec<CompareStage>,
        #[command(flatten)]
        backgrounds: BackgroundArgs,
    },
    /// Normalise total noise and her amplitude within groups of backgrounds
    Normalize {
        #[arg(short, long)]
        out: PathBuf,
        #[command(flatten)]
        backgrounds: BackgroundArgs,
    },
    /// Segment, plot and combine every embryo listed in the sample sheet
    Batch {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
        #[arg(short = 'b', long, default_value_t = 5)]
        num_bins: usize,
    },
}

#[derive(Args)]
struct BackgroundArgs {
    /// Output folders of `combine`, one per background
    #[arg(short, long, num_args = 1.., required = true)]
    folders: Vec<PathBuf>,
    #[arg(short, long, num_args = 1.., required = true)]
    names: Vec<String>,
    /// `#rrggbb` or colour names, one per background
    #[arg(long, num_args = 1.., required = true)]
    colours: Vec<String>,
}

impl BackgroundArgs {
    fn backgrounds(self) -> anyhow::Result<Vec<Background>> {
        if self.folders.len() != self.names.len() || self.folders.len() != self.colours.len() {
            bail!(
                "got {} folders, {} names and {} colours; one of each is needed per background",
                self.folders.len(),
                self.names.len(),
                self.colours.len()
            );
        }
        Ok(self
            .folders
            .into_iter()
            .zip(self.names)
            .zip(self.colours)
            .map(|((folder, name), colour)| Background {
                folder: resolve_path(&folder),
                name,
                colour,
            })
            .collect())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Commands::Embryo { dir } => {
            pipeline::embryo(&resolve_path(&dir), &config)?;
        }
        Commands::Combine { out, num_bins, only, inputs } => {
            let inputs: Vec<PathBuf> = inputs.iter().map(|p| resolve_path(p)).collect();
            pipeline::combine(&inputs, num_bins, &resolve_path(&out), &config, &only)
                .context("combining embryos")?;
        }
        Commands::Compare { out, only, backgrounds } => {
            pipeline::compare(&backgrounds.backgrounds()?, &resolve_path(&out), &config, &only)
                .context("comparing genetic backgrounds")?;
        }
        Commands::Normalize { out, backgrounds } => {
            pipeline::normalize(&backgrounds.backgrounds()?, &resolve_path(&out), &config)
                .context("normalising genetic backgrounds")?;
        }
        Commands::Batch { input, out, num_bins } => {
            pipeline::batch(&resolve_path(&input), &resolve_path(&out), num_bins, &config)
                .context("running batch")?;
        }
    }
    info!("Done.");
    Ok(())
}
