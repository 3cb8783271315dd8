//! Tile geometry shared by the driver and the model.
//!
//! Every tensor crossing the boundary travels as a *tile*: a flat byte buffer
//! laid out the way the Neural Engine DMAs it, padded to a 0x4000-byte
//! boundary. A [`TensorDescriptor`] describes both the logical NCHW shape of a
//! slot and the strides of its padded layout.

use serde::Serialize;
use std::ops::{Deref, DerefMut};

use crate::error::{AneError, Result};

/// Number of input slots (and, separately, output slots) per context.
pub const TILE_COUNT: usize = 0x20;

/// DMA alignment of a tile, in bytes.
pub const TILE_ALIGN: usize = 0x4000;

/// Words per slot descriptor: N, C, H, W, P, R.
pub const NCHW_FIELDS: usize = 6;

/// Words filled by the descriptor query: 32 input rows followed by 32 output rows.
pub const NCHW_WORDS: usize = NCHW_FIELDS * TILE_COUNT * 2;

/// Round `x` up to the next tile boundary; `None` if that overflows `usize`.
pub fn tile_align(x: usize) -> Option<usize> {
    x.checked_add(TILE_ALIGN - 1)
        .map(|padded| padded & !(TILE_ALIGN - 1))
}

/// Shape and layout of one tensor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TensorDescriptor {
    pub n: usize,
    pub c: usize,
    pub h: usize,
    pub w: usize,
    /// Plane stride in bytes.
    pub p: usize,
    /// Row stride in bytes.
    pub r: usize,
}

impl TensorDescriptor {
    /// Build a descriptor from one six-word row of the native query.
    pub fn from_words(words: &[u64]) -> Result<Self> {
        if words.len() != NCHW_FIELDS {
            return Err(AneError::native(format!(
                "descriptor row has {} words, expected {}",
                words.len(),
                NCHW_FIELDS
            )));
        }
        let field = |i: usize| {
            usize::try_from(words[i])
                .map_err(|_| AneError::native(format!("descriptor word {} overflows", words[i])))
        };
        Ok(Self {
            n: field(0)?,
            c: field(1)?,
            h: field(2)?,
            w: field(3)?,
            p: field(4)?,
            r: field(5)?,
        })
    }

    /// Logical (N, C, H, W) shape.
    pub fn shape(&self) -> [usize; 4] {
        [self.n, self.c, self.h, self.w]
    }

    /// Number of logical elements; `None` if the product overflows.
    pub fn numel(&self) -> Option<usize> {
        self.n
            .checked_mul(self.c)?
            .checked_mul(self.h)?
            .checked_mul(self.w)
    }

    /// Byte size of a tile holding this slot.
    ///
    /// Descriptor words come from the native library unchecked, so a size
    /// that does not fit in `usize` is reported as a native error.
    pub fn tile_size(&self) -> Result<usize> {
        self.n
            .checked_mul(self.c)
            .and_then(|planes| planes.checked_mul(self.p))
            .and_then(tile_align)
            .ok_or_else(|| AneError::native(format!("tile size of {:?} overflows", self)))
    }

    /// Shape of the padded layout as `f16` elements.
    ///
    /// Rows per plane come from `P / R` and elements per row from `R / 2`.
    /// Neither is allowed to fall below the logical extent, so cropping the
    /// padded array always yields the logical shape.
    pub fn padded_shape(&self) -> [usize; 4] {
        let rows = if self.r == 0 { 0 } else { self.p / self.r };
        let cols = self.r / 2;
        [self.n, self.c, rows.max(self.h), cols.max(self.w)]
    }
}

/// A padded, hardware-layout byte buffer for one slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tile {
    bytes: Vec<u8>,
}

impl Tile {
    /// A zero-filled tile of `size` bytes.
    pub fn zeroed(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Wrap an existing buffer.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Take the underlying buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Deref for Tile {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl DerefMut for Tile {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl AsRef<[u8]> for Tile {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for Tile {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}
