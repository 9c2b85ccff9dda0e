// src/engine.rs
//
// The core of quality-lens. For one source image it:
// 1. Re-encodes at a quality level with an optional downscale
// 2. Decodes the result back and scores it with PSNR / SSIM
// 3. Renders a per-pixel difference heat map
// 4. Searches the quality ladder for the dead zone where re-encoding stops saving bytes
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod bitmap;
mod codec;
mod common;
pub mod dead_zone;
mod decoder;
mod encoder;
pub mod guard;
pub mod heatmap;
mod io;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
mod pipeline;
mod scheduler;
mod session;
#[cfg(feature = "stress")]
mod stress;

pub use bitmap::{Bitmap, EncodedImage, EncodedKind};
pub use codec::{JpegCodec, LossyCodec};
pub use common::run_with_panic_policy;
pub use dead_zone::{
    find_dead_zone_threshold, find_threshold, find_threshold_cancellable, DeadZoneResult,
    DEAD_ZONE_LADDER, NO_DEAD_ZONE,
};
pub use decoder::{check_dimensions, decode_jpeg, detect_format, read_dimensions};
pub use encoder::{encode_jpeg, AlphaHandling};
pub use guard::{InputPolicy, InputPolicyKind};
pub use heatmap::{diff, HeatMap};
pub use io::{Source, SourceImage};
pub use memory::{ScratchBudget, ScratchPermit};
pub use metrics::{compare, psnr, ssim, MetricResult};
pub use orchestrator::{CompressionOutcome, Orchestrator, PipelineStage, StageTimings};
pub use pipeline::{compute_target_size, resize_bitmap};
pub use scheduler::{SchedulerEvent, SettingsScheduler};
pub use session::ImageSession;

#[cfg(feature = "stress")]
pub use stress::run_stress_iteration;
