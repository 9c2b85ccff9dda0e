// src/config.rs
//
// Engine configuration with environment overrides.

use crate::engine::guard::{InputPolicy, InputPolicyKind};
use crate::engine::memory::{ScratchBudget, DEFAULT_SCRATCH_BUDGET_BYTES};
use std::sync::Arc;
use std::time::Duration;

/// Quiet window before the scheduler acts on the latest settings.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
pub const MIN_DEBOUNCE_MS: u64 = 150;
pub const MAX_DEBOUNCE_MS: u64 = 300;

pub const DEBOUNCE_ENV: &str = "QUALITY_LENS_DEBOUNCE_MS";
pub const INPUT_POLICY_ENV: &str = "QUALITY_LENS_INPUT_POLICY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub debounce: Duration,
    pub input_policy: InputPolicy,
    /// `None` uses [`DEFAULT_SCRATCH_BUDGET_BYTES`].
    pub scratch_budget_bytes: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            input_policy: InputPolicy::default(),
            scratch_budget_bytes: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `QUALITY_LENS_DEBOUNCE_MS` and `QUALITY_LENS_INPUT_POLICY`.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(DEBOUNCE_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) => {
                    let clamped = ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
                    if clamped != ms {
                        tracing::debug!(requested = ms, clamped, "debounce override clamped");
                    }
                    config.debounce = Duration::from_millis(clamped);
                }
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid {DEBOUNCE_ENV}"),
            }
        }

        if let Some(raw) = lookup(INPUT_POLICY_ENV) {
            match InputPolicyKind::parse(&raw) {
                Some(kind) => config.input_policy = InputPolicy::apply_policy(kind),
                None => tracing::warn!(value = %raw, "ignoring invalid {INPUT_POLICY_ENV}"),
            }
        }

        config
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_input_policy(mut self, policy: InputPolicy) -> Self {
        self.input_policy = policy;
        self
    }

    pub fn with_scratch_budget_bytes(mut self, bytes: Option<u64>) -> Self {
        self.scratch_budget_bytes = bytes;
        self
    }

    pub fn scratch_budget(&self) -> Arc<ScratchBudget> {
        Arc::new(ScratchBudget::new(
            self.scratch_budget_bytes
                .unwrap_or(DEFAULT_SCRATCH_BUDGET_BYTES),
        ))
    }
}
