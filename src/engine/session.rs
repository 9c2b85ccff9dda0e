// src/engine/session.rs
//
// One image being tuned: the source, the orchestrator, and the latest
// published outcome and dead-zone result.

use crate::config::EngineConfig;
use crate::engine::codec::{JpegCodec, LossyCodec};
use crate::engine::dead_zone::{find_threshold_cancellable, DeadZoneResult};
use crate::engine::io::SourceImage;
use crate::engine::memory::estimate_probe_bytes;
use crate::engine::orchestrator::{CompressionOutcome, Orchestrator, PipelineStage};
use crate::engine::pipeline::compute_target_size;
use crate::error::{QualityLensError, Result};
use crate::ops::CompressionSettings;
use crate::report::CompressionSummary;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How often a search waiting for scratch memory rechecks its generation.
const SCRATCH_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Default)]
struct Published {
    settings: Option<CompressionSettings>,
    outcome: Option<Arc<CompressionOutcome>>,
    dead_zone: Option<DeadZoneResult>,
    /// Target size the dead-zone result was computed for.
    dead_zone_target: Option<(u32, u32)>,
}

pub struct ImageSession<C: LossyCodec = JpegCodec> {
    source: SourceImage,
    orchestrator: Orchestrator<C>,
    published: Mutex<Published>,
    search_lock: Mutex<()>,
}

impl ImageSession<JpegCodec> {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, config: &EngineConfig) -> Result<Self> {
        let source = SourceImage::from_bytes(bytes, &config.input_policy)?;
        Ok(Self::with_config(source, JpegCodec, config))
    }

    pub fn from_path(path: impl AsRef<Path>, config: &EngineConfig) -> Result<Self> {
        let source = SourceImage::from_path(path, &config.input_policy)?;
        Ok(Self::with_config(source, JpegCodec, config))
    }
}

impl<C: LossyCodec> ImageSession<C> {
    pub fn new(source: SourceImage, codec: C) -> Self {
        Self::with_config(source, codec, &EngineConfig::default())
    }

    pub fn with_config(source: SourceImage, codec: C, config: &EngineConfig) -> Self {
        Self {
            source,
            orchestrator: Orchestrator::with_scratch_budget(codec, config.scratch_budget()),
            published: Mutex::new(Published::default()),
            search_lock: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &SourceImage {
        &self.source
    }

    pub fn orchestrator(&self) -> &Orchestrator<C> {
        &self.orchestrator
    }

    pub fn stage(&self) -> PipelineStage {
        self.orchestrator.stage()
    }

    /// Latest published outcome, if any run has completed.
    pub fn outcome(&self) -> Option<Arc<CompressionOutcome>> {
        self.published.lock().outcome.clone()
    }

    pub fn dead_zone(&self) -> Option<DeadZoneResult> {
        self.published.lock().dead_zone
    }

    pub fn last_settings(&self) -> Option<CompressionSettings> {
        self.published.lock().settings
    }

    pub fn summary(&self) -> Option<CompressionSummary> {
        let published = self.published.lock();
        published.outcome.as_ref().map(|outcome| {
            CompressionSummary::from_outcome(outcome, published.dead_zone, self.source.name())
        })
    }

    /// Make every in-flight run stale.
    pub fn cancel_in_flight(&self) -> u64 {
        self.orchestrator.begin()
    }

    /// Run one settings snapshot to completion.
    ///
    /// When the target size differs from the one the current dead-zone result was
    /// computed for, the search runs first under the same generation. The new
    /// dead-zone result is published together with the outcome, so a failed or
    /// superseded run leaves both untouched.
    pub fn apply(&self, settings: CompressionSettings) -> Result<Arc<CompressionOutcome>> {
        settings.validate()?;
        let generation = self.orchestrator.begin();
        let reference_size = self.source.reference_size();

        let (src_w, src_h) = self.source.dimensions();
        let target = compute_target_size(src_w, src_h, settings.max_width, settings.max_height);

        let needs_search = {
            let published = self.published.lock();
            published.dead_zone.is_none() || published.dead_zone_target != Some(target)
        };
        let searched = if needs_search {
            Some(self.search_dead_zone(generation, target, reference_size)?)
        } else {
            None
        };

        let outcome = Arc::new(self.orchestrator.compress_as(
            generation,
            &self.source,
            settings,
            reference_size,
        )?);

        let mut published = self.published.lock();
        let latest = self.orchestrator.current_generation();
        if latest != generation {
            return Err(QualityLensError::superseded(generation, latest));
        }
        if let Some(dead_zone) = searched {
            published.dead_zone = Some(dead_zone);
            published.dead_zone_target = Some(target);
        }
        published.outcome = Some(Arc::clone(&outcome));
        published.settings = Some(settings);
        Ok(outcome)
    }

    /// At most one search runs per session; a newer call waits here while the
    /// older search notices it is stale and stops.
    fn search_dead_zone(
        &self,
        generation: u64,
        target: (u32, u32),
        reference_size: u64,
    ) -> Result<DeadZoneResult> {
        let _search = self.search_lock.lock();
        let stale = || !self.orchestrator.is_current(generation);
        let superseded = || {
            QualityLensError::superseded(generation, self.orchestrator.current_generation())
        };

        let weight = estimate_probe_bytes(target.0, target.1);
        let _permit = loop {
            if stale() {
                return Err(superseded());
            }
            if let Some(permit) = self
                .orchestrator
                .scratch_budget()
                .acquire_timeout(weight, SCRATCH_POLL_INTERVAL)
            {
                break permit;
            }
        };

        find_threshold_cancellable(
            self.orchestrator.codec(),
            Some(self.source.bitmap()),
            reference_size,
            target.0,
            target.1,
            self.source.alpha_handling(),
            stale,
        )
        .filter(|_| !stale())
        .map(DeadZoneResult::new)
        .ok_or_else(superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::bitmap::{Bitmap, EncodedImage};
    use crate::engine::encoder::AlphaHandling;
    use crate::ops::Quality;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// JPEG codec that counts encodes.
    #[derive(Default)]
    struct CountingCodec {
        encodes: AtomicUsize,
    }

    impl LossyCodec for CountingCodec {
        fn format_name(&self) -> &'static str {
            "jpeg"
        }

        fn extension(&self) -> &'static str {
            "jpg"
        }

        fn encode(
            &self,
            bitmap: &Bitmap,
            quality: Quality,
            alpha: AlphaHandling,
        ) -> Result<EncodedImage> {
            self.encodes.fetch_add(1, Ordering::SeqCst);
            JpegCodec.encode(bitmap, quality, alpha)
        }

        fn decode(&self, encoded: &EncodedImage) -> Result<Bitmap> {
            JpegCodec.decode(encoded)
        }
    }

    fn session() -> ImageSession<CountingCodec> {
        let bmp = Bitmap::from_fn(64, 48, |x, y| [(x * 4) as u8, (y * 5) as u8, 100, 255]).unwrap();
        let source = SourceImage::from_decoded(bmp, vec![0u8; 3000], false).with_name("shot.png");
        ImageSession::new(source, CountingCodec::default())
    }

    fn settings(quality: i64) -> CompressionSettings {
        CompressionSettings::new(Quality::new(quality).unwrap())
    }

    fn encodes(session: &ImageSession<CountingCodec>) -> usize {
        session.orchestrator().codec().encodes.load(Ordering::SeqCst)
    }

    #[test]
    fn first_apply_runs_dead_zone_then_compress() {
        let session = session();
        assert!(session.outcome().is_none());
        let outcome = session.apply(settings(70)).unwrap();
        assert!(session.dead_zone().is_some());
        assert!(encodes(&session) >= 2);
        assert_eq!(session.outcome().unwrap().generation, outcome.generation);
        assert_eq!(session.last_settings(), Some(settings(70)));
        assert_eq!(session.stage(), PipelineStage::Idle);
    }

    #[test]
    fn quality_only_change_skips_search() {
        let session = session();
        session.apply(settings(70)).unwrap();
        let before = encodes(&session);
        session.apply(settings(50)).unwrap();
        assert_eq!(encodes(&session), before + 1);
    }

    #[test]
    fn constraint_change_reruns_search() {
        let session = session();
        session.apply(settings(70)).unwrap();
        let before = encodes(&session);
        session.apply(settings(70).with_max_width(Some(32))).unwrap();
        assert!(encodes(&session) >= before + 2);
        assert_eq!(session.outcome().unwrap().target_size, (32, 24));
    }

    #[test]
    fn summary_uses_source_name() {
        let session = session();
        session.apply(settings(60)).unwrap();
        let summary = session.summary().unwrap();
        assert_eq!(summary.file_name, "shot-compressed.jpg");
        assert_eq!(summary.quality, 60);
        assert_eq!(summary.reference_size, 3000);
        assert!(summary.dead_zone_threshold.is_some());
    }

    /// Output size depends on the bitmap width; quality 50 always fails.
    struct WidthSizedCodec;

    impl LossyCodec for WidthSizedCodec {
        fn format_name(&self) -> &'static str {
            "jpeg"
        }

        fn extension(&self) -> &'static str {
            "jpg"
        }

        fn encode(
            &self,
            bitmap: &Bitmap,
            quality: Quality,
            _: AlphaHandling,
        ) -> Result<EncodedImage> {
            if quality.get() == 50 {
                return Err(QualityLensError::encode_failed("jpeg", "scripted failure"));
            }
            let size = if bitmap.width() >= 64 { 5000 } else { 100 };
            Ok(EncodedImage::reencoded(vec![0u8; size]))
        }

        fn decode(&self, _: &EncodedImage) -> Result<Bitmap> {
            Err(QualityLensError::decode_failed("not decodable"))
        }
    }

    #[test]
    fn failed_run_keeps_dead_zone_of_displayed_outcome() {
        let bmp = Bitmap::filled(64, 48, [80, 90, 100, 255]).unwrap();
        let source = SourceImage::from_decoded(bmp, vec![0u8; 3000], false);
        let session = ImageSession::new(source, WidthSizedCodec);

        session.apply(settings(100)).unwrap();
        assert_eq!(session.dead_zone().map(|d| d.threshold()), Some(71));

        let err = session
            .apply(settings(50).with_max_width(Some(32)))
            .unwrap_err();
        assert!(matches!(err, QualityLensError::EncodeFailed { .. }));

        let summary = session.summary().unwrap();
        assert_eq!((summary.width, summary.height), (64, 48));
        assert_eq!(summary.dead_zone_threshold, Some(71));
        assert_eq!(session.dead_zone().map(|d| d.threshold()), Some(71));
    }

    #[test]
    fn search_waiting_for_scratch_gives_up_when_superseded() {
        let config = EngineConfig::default().with_scratch_budget_bytes(Some(1));
        let source = session().source().clone();
        let session = Arc::new(ImageSession::with_config(
            source,
            CountingCodec::default(),
            &config,
        ));
        let budget = Arc::clone(session.orchestrator().scratch_budget());
        let held = budget.acquire(budget.capacity());

        let started = session.orchestrator().current_generation();
        let worker = {
            let session = Arc::clone(&session);
            std::thread::spawn(move || session.apply(settings(70)))
        };
        while session.orchestrator().current_generation() == started {
            std::thread::yield_now();
        }
        session.cancel_in_flight();

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(err, QualityLensError::Superseded { .. }));
        assert!(session.outcome().is_none());
        assert!(session.dead_zone().is_none());
        assert_eq!(encodes(&session), 0);
        drop(held);
    }

    #[test]
    fn invalid_settings_publish_nothing() {
        let session = session();
        assert!(session.apply(settings(70).with_max_width(Some(0))).is_err());
        assert!(session.outcome().is_none());
        assert_eq!(encodes(&session), 0);
    }
}
