//! Model inference module.
//!
//! This module binds a compiled Neural Engine model library at runtime and
//! provides safe Rust wrappers for driving it.

mod backend;
mod driver;
mod ffi;
mod model;
#[cfg(test)]
mod testing;

pub use backend::{Backend, DylibBackend, RawContext};
pub use driver::{ContextId, Driver};
pub use model::{
    resolve_library_path, InferenceResult, Model, ModelSummary, SlotSummary, DEFAULT_SEARCH_DIR,
};
