// src/engine/orchestrator.rs
//
// Compression orchestrator: resize -> encode -> decode -> metrics -> heat map
// for one settings snapshot.
//
// Runs are serialized behind a run lock and tagged with a generation taken
// from a monotonically increasing counter. Only the latest generation may
// finish: a run checks its tag at every stage boundary and aborts with
// `Superseded` once a newer one exists.

use crate::engine::bitmap::{Bitmap, EncodedImage};
use crate::engine::codec::{JpegCodec, LossyCodec};
use crate::engine::heatmap::{self, HeatMap};
use crate::engine::io::SourceImage;
use crate::engine::memory::{estimate_run_bytes, ScratchBudget};
use crate::engine::metrics::{self, MetricResult};
use crate::engine::pipeline::{compute_target_size, resize_bitmap};
use crate::error::{QualityLensError, Result};
use crate::ops::{CompressionSettings, Quality};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Where a pipeline run currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineStage {
    Idle = 0,
    Resizing = 1,
    Encoding = 2,
    Decoding = 3,
    ComputingMetrics = 4,
    ComputingHeatMap = 5,
}

impl PipelineStage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Resizing,
            2 => Self::Encoding,
            3 => Self::Decoding,
            4 => Self::ComputingMetrics,
            5 => Self::ComputingHeatMap,
            _ => Self::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Resizing => "resizing",
            Self::Encoding => "encoding",
            Self::Decoding => "decoding",
            Self::ComputingMetrics => "computing_metrics",
            Self::ComputingHeatMap => "computing_heat_map",
        }
    }
}

/// Wall-clock milliseconds spent per stage. Skipped stages stay at 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub resize_ms: u64,
    pub encode_ms: u64,
    pub decode_ms: u64,
    pub metrics_ms: u64,
    pub heat_map_ms: u64,
}

impl StageTimings {
    pub fn total_ms(&self) -> u64 {
        self.resize_ms + self.encode_ms + self.decode_ms + self.metrics_ms + self.heat_map_ms
    }
}

/// Everything one successful run publishes.
#[derive(Clone, Debug)]
pub struct CompressionOutcome {
    pub encoded: EncodedImage,
    /// The original bytes were handed back untouched (quality 100, no resize).
    pub is_original_alias: bool,
    pub metrics: MetricResult,
    pub heat_map: HeatMap,
    pub target_size: (u32, u32),
    pub quality: Quality,
    pub reference_size: u64,
    pub generation: u64,
    pub timings: StageTimings,
}

impl CompressionOutcome {
    pub fn encoded_size(&self) -> u64 {
        self.encoded.len() as u64
    }
}

/// Resets the published stage to `Idle` on every exit path.
struct StageGuard<'a> {
    stage: &'a AtomicU8,
    generation: u64,
    started: Instant,
}

impl<'a> StageGuard<'a> {
    fn new(stage: &'a AtomicU8, generation: u64) -> Self {
        Self {
            stage,
            generation,
            started: Instant::now(),
        }
    }

    fn enter(&self, next: PipelineStage) {
        self.stage.store(next as u8, Ordering::Release);
        tracing::debug!(
            generation = self.generation,
            stage = next.as_str(),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "pipeline stage"
        );
    }
}

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        self.stage.store(PipelineStage::Idle as u8, Ordering::Release);
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

pub struct Orchestrator<C: LossyCodec = JpegCodec> {
    codec: C,
    generation: AtomicU64,
    run_lock: Mutex<()>,
    stage: AtomicU8,
    scratch: Arc<ScratchBudget>,
}

impl Default for Orchestrator<JpegCodec> {
    fn default() -> Self {
        Self::new(JpegCodec)
    }
}

impl<C: LossyCodec> Orchestrator<C> {
    pub fn new(codec: C) -> Self {
        Self::with_scratch_budget(codec, Arc::new(ScratchBudget::default()))
    }

    pub fn with_scratch_budget(codec: C, scratch: Arc<ScratchBudget>) -> Self {
        Self {
            codec,
            generation: AtomicU64::new(0),
            run_lock: Mutex::new(()),
            stage: AtomicU8::new(PipelineStage::Idle as u8),
            scratch,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn scratch_budget(&self) -> &Arc<ScratchBudget> {
        &self.scratch
    }

    pub fn stage(&self) -> PipelineStage {
        PipelineStage::from_u8(self.stage.load(Ordering::Acquire))
    }

    pub fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Take a new generation. Every run tagged with an older one is now stale.
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current_generation() == generation
    }

    fn ensure_current(&self, generation: u64) -> Result<()> {
        let latest = self.current_generation();
        if latest != generation {
            tracing::debug!(generation, latest, "pipeline run superseded");
            return Err(QualityLensError::superseded(generation, latest));
        }
        Ok(())
    }

    /// Run the pipeline under a fresh generation.
    pub fn compress(
        &self,
        source: &SourceImage,
        settings: CompressionSettings,
        reference_size: u64,
    ) -> Result<CompressionOutcome> {
        let generation = self.begin();
        self.compress_as(generation, source, settings, reference_size)
    }

    /// Run the pipeline under a generation obtained earlier from [`begin`](Self::begin).
    pub fn compress_as(
        &self,
        generation: u64,
        source: &SourceImage,
        settings: CompressionSettings,
        reference_size: u64,
    ) -> Result<CompressionOutcome> {
        settings.validate()?;

        let _run = self.run_lock.lock();
        self.ensure_current(generation)?;
        let guard = StageGuard::new(&self.stage, generation);

        let (src_w, src_h) = source.dimensions();
        let target_size = compute_target_size(src_w, src_h, settings.max_width, settings.max_height);
        if target_size.0 == 0 || target_size.1 == 0 {
            return Err(QualityLensError::invalid_dimension("width", target_size.0));
        }
        let _permit = self.scratch.acquire(estimate_run_bytes(target_size.0, target_size.1));

        let mut timings = StageTimings::default();
        let fast_path = settings.quality.is_max() && target_size == (src_w, src_h);

        let (encoded, reference, compared) = if fast_path {
            tracing::debug!(generation, "quality 100 without resize; aliasing original bytes");
            let encoded = EncodedImage::original(Arc::clone(source.original_bytes()));
            (encoded, source.bitmap().clone(), source.bitmap().clone())
        } else {
            guard.enter(PipelineStage::Resizing);
            let started = Instant::now();
            let resized = resize_bitmap(source.bitmap(), target_size.0, target_size.1)?;
            timings.resize_ms = elapsed_ms(started);
            self.ensure_current(generation)?;

            guard.enter(PipelineStage::Encoding);
            let started = Instant::now();
            let encoded = self
                .codec
                .encode(&resized, settings.quality, source.alpha_handling())?;
            timings.encode_ms = elapsed_ms(started);
            self.ensure_current(generation)?;

            guard.enter(PipelineStage::Decoding);
            let started = Instant::now();
            let decoded = self.codec.decode(&encoded)?;
            timings.decode_ms = elapsed_ms(started);
            self.ensure_current(generation)?;

            (encoded, resized, decoded)
        };

        let (metrics, heat_map) = self.analyze(&guard, &reference, &compared, &mut timings)?;
        self.ensure_current(generation)?;
        drop(guard);

        tracing::debug!(
            generation,
            quality = settings.quality.get(),
            width = target_size.0,
            height = target_size.1,
            size = encoded.len(),
            reference_size,
            psnr = metrics.psnr,
            ssim = metrics.ssim,
            total_ms = timings.total_ms(),
            "compression finished"
        );

        Ok(CompressionOutcome {
            is_original_alias: encoded.is_alias_of(source.original_bytes()),
            encoded,
            metrics,
            heat_map,
            target_size,
            quality: settings.quality,
            reference_size,
            generation,
            timings,
        })
    }

    fn analyze(
        &self,
        guard: &StageGuard<'_>,
        reference: &Bitmap,
        compared: &Bitmap,
        timings: &mut StageTimings,
    ) -> Result<(MetricResult, HeatMap)> {
        guard.enter(PipelineStage::ComputingMetrics);
        let started = Instant::now();
        let metrics = metrics::compare(reference, compared)?;
        timings.metrics_ms = elapsed_ms(started);
        self.ensure_current(guard.generation)?;

        guard.enter(PipelineStage::ComputingHeatMap);
        let started = Instant::now();
        let heat_map = heatmap::diff(reference, compared)?;
        timings.heat_map_ms = elapsed_ms(started);
        Ok((metrics, heat_map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::encoder::AlphaHandling;
    use crate::error::ErrorCategory;
    use std::sync::Barrier;
    use std::thread;

    fn source(width: u32, height: u32) -> SourceImage {
        let bmp = Bitmap::from_fn(width, height, |x, y| {
            [(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8, 255]
        })
        .unwrap();
        SourceImage::from_decoded(bmp, vec![7u8; 4096], false)
    }

    fn settings(quality: i64) -> CompressionSettings {
        CompressionSettings::new(Quality::new(quality).unwrap())
    }

    struct FailingCodec;

    impl LossyCodec for FailingCodec {
        fn format_name(&self) -> &'static str {
            "failing"
        }

        fn extension(&self) -> &'static str {
            "bin"
        }

        fn encode(&self, _: &Bitmap, _: Quality, _: AlphaHandling) -> Result<EncodedImage> {
            Err(QualityLensError::encode_failed("failing", "no output"))
        }

        fn decode(&self, _: &EncodedImage) -> Result<Bitmap> {
            Err(QualityLensError::decode_failed("unreachable"))
        }
    }

    /// JPEG codec that parks inside `encode` until released.
    struct GatedCodec {
        gate: Arc<Barrier>,
    }

    impl LossyCodec for GatedCodec {
        fn format_name(&self) -> &'static str {
            "gated"
        }

        fn extension(&self) -> &'static str {
            "jpg"
        }

        fn encode(&self, bitmap: &Bitmap, quality: Quality, alpha: AlphaHandling) -> Result<EncodedImage> {
            self.gate.wait(); // entered
            self.gate.wait(); // released
            JpegCodec.encode(bitmap, quality, alpha)
        }

        fn decode(&self, encoded: &EncodedImage) -> Result<Bitmap> {
            JpegCodec.decode(encoded)
        }
    }

    #[test]
    fn fast_path_aliases_original_bytes() {
        let orch = Orchestrator::new(JpegCodec);
        let src = source(64, 48);
        let out = orch.compress(&src, settings(100), src.reference_size()).unwrap();
        assert!(out.is_original_alias);
        assert!(out.encoded.is_alias_of(src.original_bytes()));
        assert_eq!(out.target_size, (64, 48));
        assert_eq!(out.metrics, MetricResult::perfect());
        assert_eq!(out.heat_map.pixel(10, 10), [0, 0, 255, 30]);
        assert_eq!(out.timings.encode_ms, 0);
        assert_eq!(orch.stage(), PipelineStage::Idle);
    }

    #[test]
    fn quality_100_with_resize_reencodes() {
        let orch = Orchestrator::new(JpegCodec);
        let src = source(64, 48);
        let out = orch
            .compress(&src, settings(100).with_max_width(Some(32)), 4096)
            .unwrap();
        assert!(!out.is_original_alias);
        assert_eq!(out.target_size, (32, 24));
        assert_eq!(out.heat_map.dimensions(), (32, 24));
    }

    #[test]
    fn lossy_run_reports_metrics() {
        let orch = Orchestrator::new(JpegCodec);
        let src = source(80, 60);
        let out = orch.compress(&src, settings(60), 4096).unwrap();
        assert!(!out.is_original_alias);
        assert!(out.metrics.psnr > 0.0 && out.metrics.psnr <= 100.0);
        assert!((0.0..=1.0).contains(&out.metrics.ssim));
        assert_eq!(out.generation, orch.current_generation());
    }

    #[test]
    fn codec_failure_returns_to_idle() {
        let orch = Orchestrator::new(FailingCodec);
        let src = source(16, 16);
        let err = orch.compress(&src, settings(50), 100).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::EncodeFailure);
        assert_eq!(orch.stage(), PipelineStage::Idle);

        // the session survives: a fast-path run still works afterwards
        assert!(orch.compress(&src, settings(100), 100).is_ok());
    }

    #[test]
    fn stale_generation_is_rejected_up_front() {
        let orch = Orchestrator::new(JpegCodec);
        let src = source(16, 16);
        let stale = orch.begin();
        let latest = orch.begin();
        let err = orch.compress_as(stale, &src, settings(70), 100).unwrap_err();
        assert!(matches!(
            err,
            QualityLensError::Superseded { generation, latest: l } if generation == stale && l == latest
        ));
        assert!(!err.is_user_visible());
        assert_eq!(orch.stage(), PipelineStage::Idle);
    }

    #[test]
    fn newer_generation_aborts_running_pipeline() {
        let gate = Arc::new(Barrier::new(2));
        let orch = Arc::new(Orchestrator::new(GatedCodec { gate: gate.clone() }));
        let src = source(32, 32);

        let runner = {
            let orch = Arc::clone(&orch);
            let src = src.clone();
            thread::spawn(move || orch.compress(&src, settings(75), 100))
        };

        gate.wait();
        assert_eq!(orch.stage(), PipelineStage::Encoding);
        orch.begin();
        gate.wait();

        let err = runner.join().unwrap().unwrap_err();
        assert!(matches!(err, QualityLensError::Superseded { .. }));
        assert_eq!(orch.stage(), PipelineStage::Idle);
    }

    #[test]
    fn invalid_settings_rejected_before_running() {
        let orch = Orchestrator::new(JpegCodec);
        let src = source(8, 8);
        let err = orch
            .compress(&src, settings(80).with_max_width(Some(0)), 10)
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::InputInvalid);
    }

    #[test]
    fn scratch_permit_released_after_run() {
        let orch = Orchestrator::new(JpegCodec);
        let before = orch.scratch_budget().available();
        let src = source(40, 40);
        orch.compress(&src, settings(50), 100).unwrap();
        assert_eq!(orch.scratch_budget().available(), before);
        let _ = orch.compress(&src, settings(50).with_max_height(Some(0)), 100);
        assert_eq!(orch.scratch_budget().available(), before);
    }
}
