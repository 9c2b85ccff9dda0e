// src/engine/memory.rs
//
// Scratch budget: byte-weighted semaphore bounding the pixel buffers that
// concurrent pipeline runs and dead-zone probes keep alive.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::Duration;

/// Default budget when none is configured.
pub const DEFAULT_SCRATCH_BUDGET_BYTES: u64 = 1024 * 1024 * 1024; // 1GB

/// Lower bound for any estimate so tiny images still take a meaningful permit.
const MIN_ESTIMATE_BYTES: u64 = 1024 * 1024;

/// Codec-internal work buffers (libjpeg component planes, Huffman tables)
const CODEC_OVERHEAD_BYTES: u64 = 4 * 1024 * 1024;

const BPP_RGBA: u64 = 4;
const BPP_RGB: u64 = 3;

/// In-memory weighted semaphore for byte-based backpressure.
#[derive(Debug)]
pub struct ScratchBudget {
    capacity: u64,
    state: Mutex<u64>, // available bytes
    cvar: Condvar,
}

/// Bytes held from a [`ScratchBudget`]; returned on drop.
#[derive(Debug)]
pub struct ScratchPermit {
    budget: Arc<ScratchBudget>,
    weight: u64,
}

impl ScratchBudget {
    pub fn new(capacity: u64) -> Self {
        let capacity = capacity.max(MIN_ESTIMATE_BYTES);
        Self {
            capacity,
            state: Mutex::new(capacity),
            cvar: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn available(&self) -> u64 {
        *self.state.lock()
    }

    /// Block until `weight` bytes are free. Weights above capacity are clamped so a
    /// single oversize request can still run alone.
    pub fn acquire(self: &Arc<Self>, weight: u64) -> ScratchPermit {
        let mut available = self.state.lock();
        let need = weight.min(self.capacity);
        while *available < need {
            self.cvar.wait(&mut available);
        }
        *available -= need;
        ScratchPermit {
            budget: Arc::clone(self),
            weight: need,
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    pub fn acquire_timeout(self: &Arc<Self>, weight: u64, timeout: Duration) -> Option<ScratchPermit> {
        let mut available = self.state.lock();
        let need = weight.min(self.capacity);
        while *available < need {
            if self.cvar.wait_for(&mut available, timeout).timed_out() && *available < need {
                return None;
            }
        }
        *available -= need;
        Some(ScratchPermit {
            budget: Arc::clone(self),
            weight: need,
        })
    }

    fn release(&self, weight: u64) {
        let mut available = self.state.lock();
        *available = (*available).saturating_add(weight).min(self.capacity);
        // Waiters have heterogeneous weights; notify_one could starve a large one.
        self.cvar.notify_all();
    }
}

impl Default for ScratchBudget {
    fn default() -> Self {
        Self::new(DEFAULT_SCRATCH_BUDGET_BYTES)
    }
}

impl ScratchPermit {
    pub fn weight(&self) -> u64 {
        self.weight
    }
}

impl Drop for ScratchPermit {
    fn drop(&mut self) {
        self.budget.release(self.weight);
    }
}

fn bytes_for_image(width: u32, height: u32, bytes_per_pixel: u64) -> u64 {
    (width as u64 * height as u64).saturating_mul(bytes_per_pixel)
}

/// Peak scratch bytes of one compress run: resized RGBA, the flattened RGB copy
/// handed to the encoder, the decoded RGBA and the heat map, plus codec overhead.
/// The source bitmap is owned by the session and not counted.
pub fn estimate_run_bytes(target_width: u32, target_height: u32) -> u64 {
    let rgba = bytes_for_image(target_width, target_height, BPP_RGBA);
    let rgb = bytes_for_image(target_width, target_height, BPP_RGB);
    rgba.saturating_mul(3)
        .saturating_add(rgb)
        .saturating_add(CODEC_OVERHEAD_BYTES)
        .max(MIN_ESTIMATE_BYTES)
}

/// Peak scratch bytes of a dead-zone search: one resized bitmap and one encode at a time.
pub fn estimate_probe_bytes(target_width: u32, target_height: u32) -> u64 {
    bytes_for_image(target_width, target_height, BPP_RGBA)
        .saturating_add(bytes_for_image(target_width, target_height, BPP_RGB))
        .saturating_add(CODEC_OVERHEAD_BYTES)
        .max(MIN_ESTIMATE_BYTES)
}
