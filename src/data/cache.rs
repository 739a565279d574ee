//! Per-view calculation cache and the dirty flags that gate it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::data::fft::FftEngine;
use crate::data::peak::PeakHoldAccumulator;

/// Shared, immutable sample array handed out by snapshots.
pub type Samples = Arc<Vec<f64>>;

/// Which pipeline stage an invalidation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvalidateLevel {
    /// Filter, FFT-domain filter or before-zoom math changed; everything is redone.
    BeforeZoom,
    /// Trigger, zoom or pan changed; `calculated_before_zoom` is reused.
    AfterZoom,
    /// Only the painted appearance changed.
    Projection,
}

impl InvalidateLevel {
    /// Strength: BeforeZoom > AfterZoom > Projection.
    pub fn rank(self) -> u8 {
        match self {
            InvalidateLevel::Projection => 1,
            InvalidateLevel::AfterZoom => 2,
            InvalidateLevel::BeforeZoom => 3,
        }
    }

    pub(crate) fn from_rank(rank: u8) -> Option<Self> {
        match rank {
            1 => Some(InvalidateLevel::Projection),
            2 => Some(InvalidateLevel::AfterZoom),
            3 => Some(InvalidateLevel::BeforeZoom),
            _ => None,
        }
    }

    pub fn stronger(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// Three independent stage flags.
///
/// Flags are consumed with an atomic swap, so an invalidation that lands
/// while a stage runs is never lost; it only causes one more pass.
#[derive(Debug)]
pub struct DirtyFlags {
    before_zoom: AtomicBool,
    after_zoom: AtomicBool,
    projection: AtomicBool,
}

impl Default for DirtyFlags {
    /// A fresh view has never been calculated.
    fn default() -> Self {
        Self {
            before_zoom: AtomicBool::new(true),
            after_zoom: AtomicBool::new(false),
            projection: AtomicBool::new(false),
        }
    }
}

impl DirtyFlags {
    pub fn mark(&self, level: InvalidateLevel) {
        let flag = match level {
            InvalidateLevel::BeforeZoom => &self.before_zoom,
            InvalidateLevel::AfterZoom => &self.after_zoom,
            InvalidateLevel::Projection => &self.projection,
        };
        flag.store(true, Ordering::Release);
    }

    /// No stage pending (projection excluded: it is not calculation work).
    pub fn is_calculated(&self) -> bool {
        !self.before_zoom_required() && !self.after_zoom_required()
    }

    pub fn before_zoom_required(&self) -> bool {
        self.before_zoom.load(Ordering::Acquire)
    }

    pub fn after_zoom_required(&self) -> bool {
        self.after_zoom.load(Ordering::Acquire)
    }

    pub fn projection_required(&self) -> bool {
        self.projection.load(Ordering::Acquire)
    }

    pub(crate) fn take_before_zoom(&self) -> bool {
        self.before_zoom.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn take_after_zoom(&self) -> bool {
        self.after_zoom.swap(false, Ordering::AcqRel)
    }

    /// Read-and-clear used by the renderer.
    pub fn take_projection(&self) -> bool {
        self.projection.swap(false, Ordering::AcqRel)
    }
}

/// Derived sample arrays of one view.
///
/// Lives inside its buffer's DataLock; see [`BufferData`](crate::data::buffer::BufferData).
#[derive(Debug, Default)]
pub struct CalculationCache {
    /// Samples after offset/length adjustment (or composite combination).
    pub(crate) raw_before_zoom: Option<Samples>,
    /// After filter, FFT-domain filter and before-zoom math.
    pub(crate) calculated_before_zoom: Option<Samples>,
    /// After trigger, zoom/pan windowing and after-zoom math.
    pub(crate) drawn: Option<Samples>,
    /// Index of `drawn[0]` within `calculated_before_zoom`.
    pub(crate) drawn_start: usize,
    /// Number of `calculated_before_zoom` samples the drawn window covers.
    pub(crate) drawn_span: usize,
    /// Width of the transform that produced the spectrum, if any.
    pub(crate) spectrum_width: Option<usize>,
    pub(crate) trigger_found: bool,
    /// Trigger source samples, refreshed once per before-zoom generation.
    pub(crate) trigger_snapshot: Option<Samples>,
    /// Bumped each time the before-zoom stage completes.
    pub(crate) before_zoom_generation: u64,
    pub(crate) peak: PeakHoldAccumulator,
    pub(crate) fft: Option<FftEngine>,
}

impl CalculationCache {
    /// Drop every derived array. The peak envelope survives; it has its own lifecycle.
    pub fn clear(&mut self) {
        self.raw_before_zoom = None;
        self.calculated_before_zoom = None;
        self.drawn = None;
        self.drawn_start = 0;
        self.drawn_span = 0;
        self.spectrum_width = None;
        self.trigger_found = false;
        self.trigger_snapshot = None;
    }

    pub fn raw_before_zoom(&self) -> Option<&Samples> {
        self.raw_before_zoom.as_ref()
    }

    pub fn calculated_before_zoom(&self) -> Option<&Samples> {
        self.calculated_before_zoom.as_ref()
    }

    pub fn drawn(&self) -> Option<&Samples> {
        self.drawn.as_ref()
    }

    pub fn drawn_start(&self) -> usize {
        self.drawn_start
    }

    pub fn trigger_found(&self) -> bool {
        self.trigger_found
    }

    pub fn before_zoom_generation(&self) -> u64 {
        self.before_zoom_generation
    }

    pub fn peak(&self) -> &PeakHoldAccumulator {
        &self.peak
    }

    pub(crate) fn peak_mut(&mut self) -> &mut PeakHoldAccumulator {
        &mut self.peak
    }

    /// `true` when the before-zoom result holds at least one sample.
    pub fn has_data(&self) -> bool {
        self.calculated_before_zoom.as_ref().is_some_and(|s| !s.is_empty())
    }
}
