// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::QualityLensError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, QualityLensError>;

/// Run a codec/resize call and turn any panic into `InternalPanic`.
///
/// libjpeg reports fatal errors by unwinding through the mozjpeg wrapper, so
/// every call into it goes through here.
pub fn run_with_panic_policy<T, F>(stage: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::warn!(stage, %detail, "panic caught in engine stage");
            Err(QualityLensError::internal_panic(format!(
                "{stage} panicked: {detail}"
            )))
        }
    }
}
