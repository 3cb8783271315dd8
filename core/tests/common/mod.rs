//! In-memory stand-in for a compiled model library.
//!
//! The mock "device" echoes each input tile into the output tile of the same
//! slot and its tiler copies the row-major bytes unchanged, so tests can check
//! descriptor math and buffer handling without Neural Engine hardware.

#![allow(dead_code)]

use ane_rs::inference::{Backend, RawContext};
use ane_rs::tile::NCHW_WORDS;
use ane_rs::Result;
use std::ffi::c_void;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct MockState {
    /// Input slot descriptors (N, C, H, W, P, R).
    pub src: Vec<[u64; 6]>,
    /// Output slot descriptors.
    pub dst: Vec<[u64; 6]>,
    /// Overrides the reported slot counts when set.
    pub counts: Option<(i32, i32)>,
    /// Native calls in order.
    pub calls: Vec<&'static str>,
    pub created: usize,
    pub freed: usize,
    /// Inputs handed over by the last send.
    pub sent: Vec<Vec<u8>>,
}

impl MockState {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }
}

#[derive(Clone)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new(src: Vec<[u64; 6]>, dst: Vec<[u64; 6]>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                src,
                dst,
                ..MockState::default()
            })),
        }
    }

    fn record(&self, call: &'static str) {
        self.state.lock().unwrap().calls.push(call);
    }
}

impl Backend for MockBackend {
    fn create_context(&self) -> Option<RawContext> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("init");
        state.created += 1;
        RawContext::from_ptr((0x1000 * state.created) as *mut c_void)
    }

    fn free_context(&self, _ctx: RawContext) {
        let mut state = self.state.lock().unwrap();
        state.calls.push("free");
        state.freed += 1;
    }

    fn execute(&self, _ctx: RawContext) -> Result<()> {
        self.record("exec");
        Ok(())
    }

    fn send(&self, _ctx: RawContext, inputs: &[&[u8]]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("send");
        state.sent = inputs.iter().map(|input| input.to_vec()).collect();
        Ok(())
    }

    fn read(&self, _ctx: RawContext, outputs: &mut [&mut [u8]]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("read");
        for (slot, output) in outputs.iter_mut().enumerate() {
            output.fill(0);
            if let Some(input) = state.sent.get(slot) {
                let len = input.len().min(output.len());
                output[..len].copy_from_slice(&input[..len]);
            }
        }
        Ok(())
    }

    fn tile(&self, _ctx: RawContext, src: &[u8], dst: &mut [u8], _slot: usize) -> Result<()> {
        self.record("tile");
        dst[..src.len()].copy_from_slice(src);
        Ok(())
    }

    fn slot_counts(&self, _ctx: RawContext) -> (i32, i32) {
        let mut state = self.state.lock().unwrap();
        state.calls.push("info");
        state
            .counts
            .unwrap_or((state.src.len() as i32, state.dst.len() as i32))
    }

    fn descriptors(&self, _ctx: RawContext) -> Box<[u64; NCHW_WORDS]> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("nchw");
        let mut words = Box::new([0u64; NCHW_WORDS]);
        for (slot, row) in state.src.iter().enumerate() {
            words[slot * 6..slot * 6 + 6].copy_from_slice(row);
        }
        for (slot, row) in state.dst.iter().enumerate() {
            let base = (32 + slot) * 6;
            words[base..base + 6].copy_from_slice(row);
        }
        words
    }
}
