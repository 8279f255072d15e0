//! Progress reporting plumbing shared by job runners and providers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Handle given to providers to report fractional progress in `[0.0, 1.0]`.
///
/// Cheap to clone, so providers can move it into blocking closures (e.g. a
/// whisper.cpp progress hook running on a worker thread).
#[derive(Clone)]
pub struct ProgressHandle(Arc<dyn Fn(f32) + Send + Sync>);

impl ProgressHandle {
    pub fn new(sink: impl Fn(f32) + Send + Sync + 'static) -> Self {
        Self(Arc::new(sink))
    }

    /// A handle that discards all reports.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    pub fn report(&self, progress: f32) {
        (self.0)(progress);
    }
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressHandle")
    }
}

/// Enforces the progress contract on behalf of a provider: values are clamped
/// to `[0.0, 1.0]` and must strictly increase to be observable.
///
/// Providers under-report or jitter; the gate guarantees observers only ever
/// see a non-decreasing sequence.
#[derive(Debug, Default)]
pub struct ProgressGate {
    // f32 bits; progress is non-negative so the bit pattern orders correctly.
    last: AtomicU32,
}

impl ProgressGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a progress report. Returns the clamped value if it advances past
    /// everything seen so far, or `None` if it should be dropped.
    ///
    /// The initial 0.0 is not re-admitted; operations start at 0.0 already.
    pub fn advance(&self, progress: f32) -> Option<f32> {
        if !progress.is_finite() {
            return None;
        }
        let clamped = progress.clamp(0.0, 1.0);
        let bits = clamped.to_bits();

        let prev = self.last.fetch_max(bits, Ordering::AcqRel);
        (bits > prev).then_some(clamped)
    }

    /// The highest progress admitted so far.
    pub fn current(&self) -> f32 {
        f32::from_bits(self.last.load(Ordering::Acquire))
    }
}
