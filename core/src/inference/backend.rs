//! The seam between the safe wrappers and a native model library.
//!
//! [`Backend`] works with right-sized slices; padding the argument lists out to
//! the fixed 32-slot arity of the C surface happens only inside
//! [`DylibBackend`], right where the native call is issued.

use libloading::Library;
use std::ffi::c_void;
use std::fmt;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use tracing::debug;

use super::ffi;
use crate::error::{AneError, Result};
use crate::tile::{NCHW_WORDS, TILE_COUNT};

/// A non-null native context handle.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawContext(NonNull<c_void>);

// SAFETY: a context is only ever used by the single Driver that owns it; the
// native library does not tie contexts to the creating thread.
unsafe impl Send for RawContext {}

impl RawContext {
    /// Wrap a pointer returned by a context constructor; `None` if null.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

impl fmt::Debug for RawContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawContext({:p})", self.0)
    }
}

/// Operations a model library provides.
///
/// Implementations only ever see contexts they returned from
/// [`Backend::create_context`] that have not yet been passed to
/// [`Backend::free_context`]; the [`Driver`](super::Driver) registry
/// guarantees this.
pub trait Backend: Send {
    /// Create a fresh context, or `None` if the library refused.
    fn create_context(&self) -> Option<RawContext>;

    /// Release a context.
    fn free_context(&self, ctx: RawContext);

    /// Run the model once, synchronously.
    fn execute(&self, ctx: RawContext) -> Result<()>;

    /// Hand input tiles to the context, one per input slot.
    fn send(&self, ctx: RawContext, inputs: &[&[u8]]) -> Result<()>;

    /// Copy output tiles out of the context, one per output slot.
    fn read(&self, ctx: RawContext, outputs: &mut [&mut [u8]]) -> Result<()>;

    /// Repack a row-major `f16` tensor into the padded layout of input `slot`.
    fn tile(&self, ctx: RawContext, src: &[u8], dst: &mut [u8], slot: usize) -> Result<()>;

    /// Number of input and output slots, as reported natively.
    fn slot_counts(&self, ctx: RawContext) -> (i32, i32);

    /// The full descriptor table: 32 input rows then 32 output rows.
    fn descriptors(&self, ctx: RawContext) -> Box<[u64; NCHW_WORDS]>;
}

/// Entry points resolved from the library.
struct Entrypoints {
    init: ffi::InitFn,
    free: ffi::FreeFn,
    exec: ffi::ExecFn,
    send: ffi::SlotsFn,
    read: ffi::SlotsFn,
    tile: ffi::TileFn,
    info: ffi::InfoFn,
    nchw: ffi::NchwFn,
}

/// A model library opened with `dlopen`.
pub struct DylibBackend {
    fns: Entrypoints,
    path: PathBuf,
    // Keeps the function pointers in `fns` valid; dropped last.
    _library: Library,
}

/// Resolve one symbol and copy the function pointer out.
///
/// # Safety
///
/// `T` must match the symbol's real C signature.
unsafe fn resolve<T: Copy>(library: &Library, symbol: &'static str) -> Result<T> {
    let sym = unsafe { library.get::<T>(symbol.as_bytes()) }.map_err(|e| {
        AneError::MissingSymbol {
            symbol,
            reason: e.to_string(),
        }
    })?;
    debug!("Resolved {}", symbol);
    Ok(*sym)
}

impl DylibBackend {
    /// Open a model library and resolve every `pyane_*` entry point.
    ///
    /// # Errors
    ///
    /// Returns [`AneError::FileNotFound`] if the file does not exist,
    /// [`AneError::LibraryLoad`] if the loader rejects it, and
    /// [`AneError::MissingSymbol`] for the first entry point it lacks.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(AneError::FileNotFound(path.to_path_buf()));
        }

        // SAFETY: loading runs the library's initializers; model libraries
        // have none beyond the driver's own static setup.
        let library = unsafe { Library::new(path) }
            .map_err(|e| AneError::library_load(format!("{}: {}", path.display(), e)))?;

        // SAFETY: the aliases in `ffi` mirror the exported C signatures.
        let fns = unsafe {
            Entrypoints {
                init: resolve(&library, ffi::INIT)?,
                free: resolve(&library, ffi::FREE)?,
                exec: resolve(&library, ffi::EXEC)?,
                send: resolve(&library, ffi::SEND)?,
                read: resolve(&library, ffi::READ)?,
                tile: resolve(&library, ffi::TILE)?,
                info: resolve(&library, ffi::INFO)?,
                nchw: resolve(&library, ffi::NCHW)?,
            }
        };

        debug!("Loaded {}", path.display());
        Ok(Self {
            fns,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    /// Path the library was loaded from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lay `count` slot pointers into the fixed-arity argument array, nulls after.
fn pad_slots(
    count: usize,
    mut slot: impl FnMut(usize) -> *mut c_void,
) -> Result<[*mut c_void; TILE_COUNT]> {
    if count > TILE_COUNT {
        return Err(AneError::validation(format!(
            "{} buffers exceed the {} slot limit",
            count, TILE_COUNT
        )));
    }
    let mut args = [ptr::null_mut(); TILE_COUNT];
    for (i, arg) in args.iter_mut().enumerate().take(count) {
        *arg = slot(i);
    }
    Ok(args)
}

/// Map a native status code to a result; anything but zero is a failure.
fn check_status(symbol: &'static str, status: c_int) -> Result<()> {
    match status {
        0 => Ok(()),
        _ => Err(AneError::native(format!("{} returned {}", symbol, status))),
    }
}

impl Backend for DylibBackend {
    fn create_context(&self) -> Option<RawContext> {
        RawContext::from_ptr(unsafe { (self.fns.init)() })
    }

    fn free_context(&self, ctx: RawContext) {
        unsafe { (self.fns.free)(ctx.as_ptr()) }
    }

    fn execute(&self, ctx: RawContext) -> Result<()> {
        let status = unsafe { (self.fns.exec)(ctx.as_ptr()) };
        check_status(ffi::EXEC, status)
    }

    fn send(&self, ctx: RawContext, inputs: &[&[u8]]) -> Result<()> {
        // The native side only reads through these.
        let args = pad_slots(inputs.len(), |i| inputs[i].as_ptr() as *mut c_void)?;
        unsafe { ffi::call_slots(self.fns.send, ctx.as_ptr(), &args) };
        Ok(())
    }

    fn read(&self, ctx: RawContext, outputs: &mut [&mut [u8]]) -> Result<()> {
        let args = pad_slots(outputs.len(), |i| outputs[i].as_mut_ptr() as *mut c_void)?;
        unsafe { ffi::call_slots(self.fns.read, ctx.as_ptr(), &args) };
        Ok(())
    }

    fn tile(&self, ctx: RawContext, src: &[u8], dst: &mut [u8], slot: usize) -> Result<()> {
        let slot = c_int::try_from(slot)
            .map_err(|_| AneError::validation(format!("slot {} out of range", slot)))?;
        unsafe {
            (self.fns.tile)(
                ctx.as_ptr(),
                src.as_ptr() as *const c_void,
                dst.as_mut_ptr() as *mut c_void,
                slot,
            )
        };
        Ok(())
    }

    fn slot_counts(&self, ctx: RawContext) -> (i32, i32) {
        let mut src: c_int = 0;
        let mut dst: c_int = 0;
        unsafe { (self.fns.info)(ctx.as_ptr(), &mut src, &mut dst) };
        (src, dst)
    }

    fn descriptors(&self, ctx: RawContext) -> Box<[u64; NCHW_WORDS]> {
        let mut words = Box::new([0u64; NCHW_WORDS]);
        let mut args = [ptr::null_mut::<u64>(); NCHW_WORDS];
        for (arg, word) in args.iter_mut().zip(words.iter_mut()) {
            *arg = word as *mut u64;
        }
        unsafe { ffi::call_nchw(self.fns.nchw, ctx.as_ptr(), &args) };
        words
    }
}
