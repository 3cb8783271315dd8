//! Context registry over a loaded model library.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

use super::backend::{Backend, DylibBackend, RawContext};
use crate::error::{AneError, Result};

/// Identifies a context registered with a [`Driver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Owns a model library and every context created from it.
///
/// Each registered context is freed exactly once: by [`Driver::release`],
/// by [`Driver::cleanup`], or when the driver is dropped.
pub struct Driver {
    backend: Box<dyn Backend>,
    contexts: BTreeMap<ContextId, RawContext>,
    next_id: u64,
}

impl Driver {
    /// Open the model library at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let backend = DylibBackend::load(path)?;
        Ok(Self::with_backend(Box::new(backend)))
    }

    /// Drive an already-opened backend.
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            contexts: BTreeMap::new(),
            next_id: 0,
        }
    }

    /// The backend all contexts belong to.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Create and track a new context.
    pub fn register(&mut self) -> Result<ContextId> {
        let raw = self
            .backend
            .create_context()
            .ok_or_else(|| AneError::context("native constructor returned null"))?;
        let id = ContextId(self.next_id);
        self.next_id += 1;
        self.contexts.insert(id, raw);
        info!("Registered {} ({:?})", id, raw);
        Ok(id)
    }

    /// Look up the live handle behind `id`.
    pub fn context(&self, id: ContextId) -> Result<RawContext> {
        self.contexts
            .get(&id)
            .copied()
            .ok_or_else(|| AneError::context(format!("{} is not live", id)))
    }

    /// Free one context now. Returns `false` if it was not live.
    pub fn release(&mut self, id: ContextId) -> bool {
        match self.contexts.remove(&id) {
            Some(raw) => {
                self.backend.free_context(raw);
                info!("Released {}", id);
                true
            }
            None => false,
        }
    }

    /// Free every live context. Safe to call repeatedly.
    pub fn cleanup(&mut self) -> usize {
        let contexts = std::mem::take(&mut self.contexts);
        let released = contexts.len();
        for (id, raw) in contexts {
            self.backend.free_context(raw);
            debug!("Released {}", id);
        }
        released
    }

    /// Number of contexts not yet released.
    pub fn live_contexts(&self) -> usize {
        self.contexts.len()
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        let released = self.cleanup();
        if released > 0 {
            warn!("Driver dropped with {} live context(s); released", released);
        }
    }
}
