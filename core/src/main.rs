//! CLI entry point for ane-rs.

use anyhow::{bail, ensure, Context, Result};
use half::f16;
use ndarray::{ArrayD, IxDyn};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ane_rs::cli::{Cli, Commands};
use ane_rs::config::{Config, OutputFormat};
use ane_rs::Model;

/// One input tensor as read from the input file.
#[derive(Debug, Deserialize)]
struct InputTensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct InputFile {
    inputs: Vec<InputTensor>,
}

fn print(value: &Value, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
    }
    Ok(())
}

fn load_model(model: Option<PathBuf>, config: &Config, search_dir: &Path) -> Result<Model> {
    let Some(path) = model.or_else(|| config.model.library.clone()) else {
        bail!("No model given: pass --model or set model.library in the config");
    };
    info!("Loading model: {}", path.display());
    let model = Model::load_from(&path, search_dir)
        .with_context(|| format!("Failed to load model: {}", path.display()))?;
    info!("Model loaded successfully");
    Ok(model)
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(config_path) = &cli.config {
        Config::from_yaml_file(config_path)
            .with_context(|| format!("Failed to load config: {}", config_path.display()))?
    } else {
        Config::default()
    };
    let search_dir = cli
        .search_dir
        .clone()
        .unwrap_or_else(|| config.model.search_dir.clone());
    let format = cli.format.unwrap_or(config.output.format);

    match cli.command {
        Commands::Info { model } => {
            let model = load_model(model, &config, &search_dir)?;
            info!("ane-rs v{}", env!("CARGO_PKG_VERSION"));
            print(&serde_json::to_value(model.summary())?, format)?;
        }

        Commands::Predict { model, input } => {
            let mut model = load_model(model, &config, &search_dir)?;

            info!("Loading input: {}", input.display());
            let input_file: InputFile = serde_json::from_str(
                &fs::read_to_string(&input)
                    .with_context(|| format!("Failed to read input: {}", input.display()))?,
            )
            .with_context(|| format!("Malformed input: {}", input.display()))?;

            let arrays = input_file
                .inputs
                .into_iter()
                .enumerate()
                .map(|(slot, tensor)| {
                    let numel: usize = tensor.shape.iter().product();
                    ensure!(
                        numel == tensor.data.len(),
                        "Input {} has {} values for shape {:?}",
                        slot,
                        tensor.data.len(),
                        tensor.shape
                    );
                    let data = tensor.data.into_iter().map(f16::from_f32).collect();
                    ArrayD::from_shape_vec(IxDyn(&tensor.shape), data)
                        .with_context(|| format!("Failed to create input tensor {}", slot))
                })
                .collect::<Result<Vec<_>>>()?;

            info!("Running inference...");
            let result = model.infer(&arrays)?;
            info!(
                "Inference complete: {} outputs in {:.2}ms",
                result.outputs.len(),
                result.latency_ms
            );

            let output = serde_json::json!({
                "num_outputs": result.outputs.len(),
                "latency_ms": result.latency_ms,
                "outputs": result.outputs.iter().enumerate().map(|(i, t)| {
                    serde_json::json!({
                        "index": i,
                        "shape": t.shape(),
                        "data": t.iter().map(|v| v.to_f32()).collect::<Vec<_>>(),
                    })
                }).collect::<Vec<_>>()
            });
            print(&output, format)?;
        }
    }

    Ok(())
}
