//! Command-line interface for ane-rs.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::OutputFormat;

/// Run compiled Apple Neural Engine models from Rust.
#[derive(Parser, Debug)]
#[command(name = "ane-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to an optional YAML config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory bare model names are resolved against.
    ///
    /// Overrides `model.search_dir` from the config file.
    #[arg(long, global = true)]
    pub search_dir: Option<PathBuf>,

    /// Output format (json, pretty). Overrides `output.format`.
    #[arg(short, long, global = true, value_enum)]
    pub format: Option<OutputFormat>,

    /// Log native calls and context lifetimes.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a model and print its slot layout.
    Info {
        /// Path to the compiled model library.
        ///
        /// Falls back to `model.library` from the config file.
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Run one prediction.
    Predict {
        /// Path to the compiled model library.
        ///
        /// Falls back to `model.library` from the config file.
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Path to input data file.
        ///
        /// Expected format: `{"inputs": [{"shape": [N, C, H, W], "data": [...]}]}`
        /// with one entry per input slot.
        #[arg(short, long)]
        input: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
