//! Perceived-latency helpers. Nothing here gates real completion.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressPhase {
    Processing,
    Finalizing,
    Complete,
}

/// Two-phase fake progress bar: slow random steps while the work is in
/// flight, faster steps once the caller says it is finishing.
#[derive(Debug, Clone, Serialize)]
pub struct StagedProgress {
    phase: ProgressPhase,
    value: u8,
}

const PROCESSING_CAP: u8 = 70;
const FINALIZING_CAP: u8 = 99;

/// Poll intervals the UI should use for each phase.
pub const PROCESSING_INTERVAL: Duration = Duration::from_millis(500);
pub const FINALIZING_INTERVAL: Duration = Duration::from_millis(100);

impl Default for StagedProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl StagedProgress {
    pub fn new() -> Self {
        Self {
            phase: ProgressPhase::Processing,
            value: 0,
        }
    }

    pub fn phase(&self) -> ProgressPhase {
        self.phase
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    pub fn interval(&self) -> Option<Duration> {
        match self.phase {
            ProgressPhase::Processing => Some(PROCESSING_INTERVAL),
            ProgressPhase::Finalizing => Some(FINALIZING_INTERVAL),
            ProgressPhase::Complete => None,
        }
    }

    /// One poll tick. Returns the new value.
    pub fn tick<R: Rng>(&mut self, rng: &mut R) -> u8 {
        let (step, cap) = match self.phase {
            ProgressPhase::Processing => (rng.gen_range(3..=10), PROCESSING_CAP),
            ProgressPhase::Finalizing => (rng.gen_range(8..=15), FINALIZING_CAP),
            ProgressPhase::Complete => return self.value,
        };
        self.value = self.value.saturating_add(step).min(cap);
        self.value
    }

    pub fn finalize(&mut self) {
        if self.phase == ProgressPhase::Processing {
            self.phase = ProgressPhase::Finalizing;
        }
    }

    pub fn complete(&mut self) {
        self.phase = ProgressPhase::Complete;
        self.value = 100;
    }
}

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Holds back search input until it has been quiet for `delay`.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<(String, Instant)>,
    last_emitted: Option<String>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            last_emitted: None,
        }
    }

    pub fn input(&mut self, value: impl Into<String>, now: Instant) {
        self.pending = Some((value.into(), now));
    }

    /// The settled value, once, after the quiet period. Repeats of the last
    /// emitted value are swallowed.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        let (_, at) = self.pending.as_ref()?;
        if now.duration_since(*at) < self.delay {
            return None;
        }
        let (value, _) = self.pending.take()?;
        if self.last_emitted.as_deref() == Some(value.as_str()) {
            return None;
        }
        self.last_emitted = Some(value.clone());
        Some(value)
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}
