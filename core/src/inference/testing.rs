//! In-crate backend that only counts context lifetimes.

use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use super::backend::{Backend, RawContext};
use crate::error::Result;
use crate::tile::NCHW_WORDS;

/// Counts constructor and free calls.
#[derive(Default)]
pub(crate) struct Counter {
    pub created: usize,
    pub freed: Vec<usize>,
    pub refuse: bool,
}

/// Hands out fake handles 0x1000, 0x2000, ... and reports no slots.
pub(crate) struct CountingBackend(pub Arc<Mutex<Counter>>);

impl Backend for CountingBackend {
    fn create_context(&self) -> Option<RawContext> {
        let mut state = self.0.lock().unwrap();
        if state.refuse {
            return None;
        }
        state.created += 1;
        RawContext::from_ptr((state.created * 0x1000) as *mut c_void)
    }

    fn free_context(&self, ctx: RawContext) {
        self.0.lock().unwrap().freed.push(ctx.as_ptr() as usize);
    }

    fn execute(&self, _ctx: RawContext) -> Result<()> {
        Ok(())
    }

    fn send(&self, _ctx: RawContext, _inputs: &[&[u8]]) -> Result<()> {
        Ok(())
    }

    fn read(&self, _ctx: RawContext, _outputs: &mut [&mut [u8]]) -> Result<()> {
        Ok(())
    }

    fn tile(&self, _ctx: RawContext, _src: &[u8], _dst: &mut [u8], _slot: usize) -> Result<()> {
        Ok(())
    }

    fn slot_counts(&self, _ctx: RawContext) -> (i32, i32) {
        (0, 0)
    }

    fn descriptors(&self, _ctx: RawContext) -> Box<[u64; NCHW_WORDS]> {
        Box::new([0; NCHW_WORDS])
    }
}
