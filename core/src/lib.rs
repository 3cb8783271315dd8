//! ane-rs: run compiled Apple Neural Engine models from Rust.
//!
//! Each compiled model ships as a shared library exporting a small C surface
//! (`pyane_init`, `pyane_exec`, ...). This crate opens such a library at
//! runtime, binds one accelerator context per [`Model`] and converts between
//! `f16` arrays and the padded tile buffers the hardware consumes.
//!
//! # Example
//!
//! ```ignore
//! use ane_rs::Model;
//! use half::f16;
//! use ndarray::Array4;
//!
//! // Load model
//! let mut model = Model::load("model.so")?;
//!
//! // Create input tensor (N, C, H, W)
//! let input = Array4::<f16>::zeros((1, 3, 224, 224));
//!
//! // Run inference
//! let result = model.infer(&[input])?;
//! println!("Got {} outputs in {:.2}ms", result.outputs.len(), result.latency_ms);
//! ```
//!
//! The lower-level flow is [`Model::tile`], [`Model::predict`] and
//! [`Model::untile`], which keeps tiles around between calls.

pub mod cli;
pub mod config;
pub mod error;
pub mod inference;
pub mod tile;

// Re-export commonly used types
pub use error::{AneError, Result};
pub use inference::{Backend, Driver, InferenceResult, Model};
pub use tile::{tile_align, TensorDescriptor, Tile, TILE_ALIGN, TILE_COUNT};
