//! Safe wrapper around one compiled Neural Engine model.
//!
//! A [`Model`] owns a [`Driver`] with a single context, reads the slot layout
//! once at construction and then moves tiles in and out of the accelerator.

use half::f16;
use ndarray::{s, Array4, ArrayBase, Data, Dimension};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

use super::backend::Backend;
use super::driver::{ContextId, Driver};
use crate::error::{AneError, Result};
use crate::tile::{TensorDescriptor, Tile, NCHW_FIELDS, TILE_COUNT};

/// Directory a bare library file name is resolved against.
pub const DEFAULT_SEARCH_DIR: &str = ".";

/// Resolve a library path; a bare file name is looked up in `search_dir`.
pub fn resolve_library_path(path: impl AsRef<Path>, search_dir: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => path.to_path_buf(),
        _ => search_dir.as_ref().join(path),
    }
}

/// Result of [`Model::infer`].
#[derive(Debug)]
pub struct InferenceResult {
    /// One cropped array per output slot.
    pub outputs: Vec<Array4<f16>>,
    /// Wall-clock time of the native round trip in milliseconds.
    pub latency_ms: f64,
}

/// Layout of one slot, as reported by [`Model::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct SlotSummary {
    pub slot: usize,
    pub shape: [usize; 4],
    pub nchw: TensorDescriptor,
    pub tile_size: usize,
}

/// Serializable description of a loaded model.
#[derive(Debug, Clone, Serialize)]
pub struct ModelSummary {
    pub library: Option<PathBuf>,
    pub src_count: usize,
    pub dst_count: usize,
    pub inputs: Vec<SlotSummary>,
    pub outputs: Vec<SlotSummary>,
}

/// A compiled model bound to one accelerator context.
///
/// # Example
///
/// ```ignore
/// use ane_rs::Model;
/// use half::f16;
/// use ndarray::Array4;
///
/// let mut model = Model::load("yolov5.so")?;
/// let input = Array4::<f16>::zeros((1, 3, 224, 224));
/// let tiles = model.tile(&[input])?;
/// let outputs = model.predict(&tiles)?;
/// let arrays = model.untile(&outputs)?;
/// ```
pub struct Model {
    driver: Driver,
    context: ContextId,
    library: Option<PathBuf>,
    src_nchw: Vec<TensorDescriptor>,
    dst_nchw: Vec<TensorDescriptor>,
    src_size: Vec<usize>,
    dst_size: Vec<usize>,
    // Reused by every predict call.
    outputs: Vec<Tile>,
}

fn slot_count(raw: i32, kind: &str) -> Result<usize> {
    usize::try_from(raw)
        .ok()
        .filter(|&count| count <= TILE_COUNT)
        .ok_or_else(|| {
            AneError::native(format!(
                "library reports {} {} slots, limit is {}",
                raw, kind, TILE_COUNT
            ))
        })
}

impl Model {
    /// Load a model library, resolving bare file names against the current directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_from(path, DEFAULT_SEARCH_DIR)
    }

    /// Load a model library, resolving bare file names against `search_dir`.
    ///
    /// # Errors
    ///
    /// Fails if the library cannot be loaded, lacks an entry point, refuses
    /// to create a context, or reports an impossible slot layout.
    pub fn load_from(path: impl AsRef<Path>, search_dir: impl AsRef<Path>) -> Result<Self> {
        let library = resolve_library_path(path, search_dir);
        info!("Loading model library: {}", library.display());
        let driver = Driver::load(&library)?;
        Self::with_driver(driver, Some(library))
    }

    /// Build a model on top of an already-opened backend.
    pub fn with_backend(backend: Box<dyn Backend>) -> Result<Self> {
        Self::with_driver(Driver::with_backend(backend), None)
    }

    fn with_driver(mut driver: Driver, library: Option<PathBuf>) -> Result<Self> {
        let context = driver.register()?;
        let raw = driver.context(context)?;

        let (src_count, dst_count) = driver.backend().slot_counts(raw);
        let src_count = slot_count(src_count, "input")?;
        let dst_count = slot_count(dst_count, "output")?;

        let words = driver.backend().descriptors(raw);
        let rows = words
            .chunks_exact(NCHW_FIELDS)
            .map(TensorDescriptor::from_words)
            .collect::<Result<Vec<_>>>()?;
        let src_nchw = rows[..src_count].to_vec();
        let dst_nchw = rows[TILE_COUNT..TILE_COUNT + dst_count].to_vec();

        let src_size = src_nchw
            .iter()
            .map(TensorDescriptor::tile_size)
            .collect::<Result<Vec<_>>>()?;
        let dst_size = dst_nchw
            .iter()
            .map(TensorDescriptor::tile_size)
            .collect::<Result<Vec<_>>>()?;
        let outputs = dst_size.iter().map(|&size| Tile::zeroed(size)).collect();

        info!("Model ready: {} input(s), {} output(s)", src_count, dst_count);
        Ok(Self {
            driver,
            context,
            library,
            src_nchw,
            dst_nchw,
            src_size,
            dst_size,
            outputs,
        })
    }

    /// Path of the library this model was loaded from, if any.
    pub fn library_path(&self) -> Option<&Path> {
        self.library.as_deref()
    }

    pub fn src_count(&self) -> usize {
        self.src_nchw.len()
    }

    pub fn dst_count(&self) -> usize {
        self.dst_nchw.len()
    }

    /// Descriptors of the input slots.
    pub fn src_nchw(&self) -> &[TensorDescriptor] {
        &self.src_nchw
    }

    /// Descriptors of the output slots.
    pub fn dst_nchw(&self) -> &[TensorDescriptor] {
        &self.dst_nchw
    }

    /// Tile byte size of each input slot.
    pub fn src_size(&self) -> &[usize] {
        &self.src_size
    }

    /// Tile byte size of each output slot.
    pub fn dst_size(&self) -> &[usize] {
        &self.dst_size
    }

    /// Run the model once on pre-tiled inputs.
    ///
    /// Exactly one tile per input slot is required, each at least as large as
    /// the slot's tile size. The returned tiles are copies and stay valid
    /// across later calls.
    ///
    /// # Errors
    ///
    /// Returns a validation error without touching the accelerator if the
    /// inputs do not match the model; native failures are propagated.
    pub fn predict<T: AsRef<[u8]>>(&mut self, inputs: &[T]) -> Result<Vec<Tile>> {
        if inputs.len() != self.src_count() {
            return Err(AneError::validation(format!(
                "expected {} input tile(s), got {}",
                self.src_count(),
                inputs.len()
            )));
        }
        let inputs: Vec<&[u8]> = inputs.iter().map(|input| input.as_ref()).collect();
        for (slot, (input, &size)) in inputs.iter().zip(&self.src_size).enumerate() {
            if input.len() < size {
                return Err(AneError::validation(format!(
                    "input tile {} has {} bytes, slot needs {}",
                    slot,
                    input.len(),
                    size
                )));
            }
        }

        let raw = self.driver.context(self.context)?;
        let backend = self.driver.backend();
        backend.send(raw, &inputs)?;
        backend.execute(raw)?;
        let mut outputs: Vec<&mut [u8]> =
            self.outputs.iter_mut().map(Tile::as_bytes_mut).collect();
        backend.read(raw, &mut outputs)?;
        debug!("Predicted {} output tile(s)", self.outputs.len());

        Ok(self.outputs.clone())
    }

    /// Free this model's context. Returns `false` if it was already freed.
    fn release_context(&mut self) -> bool {
        self.driver.release(self.context)
    }

    /// Tile `array` for input `slot` using the library's own repacking.
    pub fn arr2tile<S, D>(&self, array: &ArrayBase<S, D>, slot: usize) -> Result<Tile>
    where
        S: Data<Elem = f16>,
        D: Dimension,
    {
        let desc = self.src_nchw.get(slot).ok_or_else(|| {
            AneError::validation(format!(
                "input slot {} out of range ({} slots)",
                slot,
                self.src_count()
            ))
        })?;
        if array.shape() != desc.shape().as_slice() {
            return Err(AneError::validation(format!(
                "input slot {} expects shape {:?}, got {:?}",
                slot,
                desc.shape(),
                array.shape()
            )));
        }

        let data: Vec<u8> = array.iter().flat_map(|v| v.to_le_bytes()).collect();
        let mut tile = Tile::zeroed(self.src_size[slot]);
        let raw = self.driver.context(self.context)?;
        self.driver
            .backend()
            .tile(raw, &data, tile.as_bytes_mut(), slot)?;
        Ok(tile)
    }

    /// Recover the logical array of output `slot` from its tile.
    ///
    /// The tile is read as the padded (N, C, P/R, R/2) layout and cropped to
    /// (N, C, H, W).
    pub fn tile2arr(&self, tile: &[u8], slot: usize) -> Result<Array4<f16>> {
        let desc = self.dst_nchw.get(slot).ok_or_else(|| {
            AneError::validation(format!(
                "output slot {} out of range ({} slots)",
                slot,
                self.dst_count()
            ))
        })?;
        crop_tile(desc, tile)
            .map_err(|e| AneError::validation(format!("output slot {}: {}", slot, e)))
    }

    /// Tile one array per input slot, in slot order.
    pub fn tile<S, D>(&self, arrays: &[ArrayBase<S, D>]) -> Result<Vec<Tile>>
    where
        S: Data<Elem = f16>,
        D: Dimension,
    {
        if arrays.len() != self.src_count() {
            return Err(AneError::validation(format!(
                "expected {} input array(s), got {}",
                self.src_count(),
                arrays.len()
            )));
        }
        arrays
            .iter()
            .enumerate()
            .map(|(slot, array)| self.arr2tile(array, slot))
            .collect()
    }

    /// Untile one buffer per output slot, in slot order.
    pub fn untile<T: AsRef<[u8]>>(&self, tiles: &[T]) -> Result<Vec<Array4<f16>>> {
        if tiles.len() != self.dst_count() {
            return Err(AneError::validation(format!(
                "expected {} output tile(s), got {}",
                self.dst_count(),
                tiles.len()
            )));
        }
        tiles
            .iter()
            .enumerate()
            .map(|(slot, tile)| self.tile2arr(tile.as_ref(), slot))
            .collect()
    }

    /// Tile, predict and untile in one call, timing the native round trip.
    pub fn infer<S, D>(&mut self, arrays: &[ArrayBase<S, D>]) -> Result<InferenceResult>
    where
        S: Data<Elem = f16>,
        D: Dimension,
    {
        let tiles = self.tile(arrays)?;
        let start = Instant::now();
        let outputs = self.predict(&tiles)?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(InferenceResult {
            outputs: self.untile(&outputs)?,
            latency_ms,
        })
    }

    /// Describe every slot of the model.
    pub fn summary(&self) -> ModelSummary {
        let slots = |nchw: &[TensorDescriptor], sizes: &[usize]| -> Vec<SlotSummary> {
            nchw.iter()
                .zip(sizes)
                .enumerate()
                .map(|(slot, (desc, &tile_size))| SlotSummary {
                    slot,
                    shape: desc.shape(),
                    nchw: *desc,
                    tile_size,
                })
                .collect()
        };
        ModelSummary {
            library: self.library.clone(),
            src_count: self.src_count(),
            dst_count: self.dst_count(),
            inputs: slots(&self.src_nchw, &self.src_size),
            outputs: slots(&self.dst_nchw, &self.dst_size),
        }
    }
}

impl Drop for Model {
    fn drop(&mut self) {
        self.release_context();
    }
}

/// Reinterpret `tile` as the padded layout of `desc` and crop it.
fn crop_tile(desc: &TensorDescriptor, tile: &[u8]) -> std::result::Result<Array4<f16>, String> {
    let [pn, pc, ph, pw] = desc.padded_shape();
    let needed = [pc, ph, pw, std::mem::size_of::<f16>()]
        .iter()
        .try_fold(pn, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| format!("padded layout {:?} overflows", desc.padded_shape()))?;
    if tile.len() < needed {
        return Err(format!(
            "tile has {} bytes, padded layout needs {}",
            tile.len(),
            needed
        ));
    }

    let values: Vec<f16> = tile[..needed]
        .chunks_exact(2)
        .map(|b| f16::from_le_bytes([b[0], b[1]]))
        .collect();
    let padded = Array4::from_shape_vec((pn, pc, ph, pw), values)
        .map_err(|e| format!("Array shape error: {}", e))?;

    let [n, c, h, w] = desc.shape();
    Ok(padded.slice(s![..n, ..c, ..h, ..w]).to_owned())
}
