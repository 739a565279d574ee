//! Stage functions of the per-view calculation pipeline.
//!
//! Both stages run with the view's DataLock held and never fail: every
//! transform error is logged and the stage continues with its input.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::cache::{CalculationCache, Samples};
use crate::data::fft::{FftEngine, MathPhase};
use crate::data::filter::Filter;
use crate::data::trigger::{locate_trigger, window_for_zoom_pan};
use crate::data::view::ViewSettings;

#[cfg(feature = "pipeline_trace")]
macro_rules! pipeline_trace { ($($arg:tt)*) => { log::trace!($($arg)*); } }
#[cfg(not(feature = "pipeline_trace"))]
macro_rules! pipeline_trace { ($($arg:tt)*) => {}; }

/// What fills the window beyond the buffer's ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PadPolicy {
    /// Leave padding at zero.
    #[default]
    Zero,
    /// Repeat the first value on the left, the last value on the right.
    Edge,
}

/// Offset/length override applied before filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleWindow {
    /// First buffer index taken; negative values pad on the left.
    pub offset: isize,
    /// Number of samples taken; `None` runs to the end of the buffer.
    pub length: Option<usize>,
    pub left_pad: PadPolicy,
    pub right_pad: PadPolicy,
}

impl SampleWindow {
    pub fn is_identity(&self) -> bool {
        self.offset == 0 && self.length.is_none()
    }
}

/// Offset/length adjusted copy of `samples`.
pub fn adjust_window(samples: &[f64], window: &SampleWindow) -> Vec<f64> {
    if window.is_identity() {
        return samples.to_vec();
    }
    let n = samples.len() as isize;
    let length = match window.length {
        Some(len) => len,
        None => (n - window.offset).max(0) as usize,
    };
    let left = match window.left_pad {
        PadPolicy::Zero => 0.0,
        PadPolicy::Edge => samples.first().copied().unwrap_or(0.0),
    };
    let right = match window.right_pad {
        PadPolicy::Zero => 0.0,
        PadPolicy::Edge => samples.last().copied().unwrap_or(0.0),
    };
    (0..length as isize)
        .map(|i| {
            let idx = window.offset + i;
            if idx < 0 {
                left
            } else if idx >= n {
                right
            } else {
                samples[idx as usize]
            }
        })
        .collect()
}

/// Read-only inputs of a stage.
pub(crate) struct StageContext<'a> {
    pub view: &'a str,
    pub settings: &'a ViewSettings,
    pub sample_rate_hz: f64,
}

/// Where the after-zoom stage looks for its trigger edge.
pub(crate) enum TriggerSamples {
    /// The view's own before-zoom result.
    Own,
    /// Another view's before-zoom result (empty when it has none yet).
    External(Option<Samples>),
}

/// Before-zoom stage: filter, FFT-domain filter, before-zoom math.
pub(crate) fn before_zoom(ctx: &StageContext<'_>, raw: Vec<f64>, cache: &mut CalculationCache) {
    let settings = ctx.settings;
    let raw: Samples = Arc::new(raw);

    let mut data = match settings.filter.build(ctx.sample_rate_hz).and_then(|f| f.apply(&raw)) {
        Ok(out) => out,
        Err(e) => {
            log::warn!("view '{}': filter {} failed, passing through: {e}", ctx.view, settings.filter.describe());
            raw.to_vec()
        }
    };

    if let Some(spectral) = settings.spectral_filter {
        if !data.is_empty() {
            match spectral.at_rate(ctx.sample_rate_hz).and_then(|f| f.apply(&data)) {
                Ok(out) => data = out,
                Err(e) => log::warn!("view '{}': {} failed, passing through: {e}", ctx.view, spectral.describe()),
            }
        }
    }

    cache.spectrum_width = None;
    if settings.math_phase == MathPhase::BeforeZoom && !data.is_empty() {
        let width = data.len();
        if let Some(spectrum) = run_math(ctx, &data, &mut cache.fft) {
            data = spectrum;
            cache.spectrum_width = Some(width);
        }
        if settings.paint_mode.holds_peaks() {
            cache.peak.accumulate(&data, 0, data.len());
        }
    }

    pipeline_trace!("view '{}': before-zoom {} -> {} samples", ctx.view, raw.len(), data.len());
    cache.raw_before_zoom = Some(raw);
    cache.calculated_before_zoom = Some(Arc::new(data));
    cache.before_zoom_generation += 1;
}

/// After-zoom stage: trigger, zoom/pan window, peak hold, after-zoom math.
///
/// Returns `false` when a manual trigger found no edge; `drawn` is then
/// left untouched and no projection is needed.
pub(crate) fn after_zoom(ctx: &StageContext<'_>, trigger: TriggerSamples, cache: &mut CalculationCache) -> bool {
    let settings = ctx.settings;
    let calculated = match cache.calculated_before_zoom.clone() {
        Some(c) if !c.is_empty() => c,
        _ => {
            cache.drawn = None;
            cache.drawn_start = 0;
            cache.drawn_span = 0;
            cache.trigger_found = true;
            return true;
        }
    };

    let outcome = {
        let source: &[f64] = match &trigger {
            TriggerSamples::Own => calculated.as_slice(),
            TriggerSamples::External(Some(s)) => s.as_slice(),
            TriggerSamples::External(None) => &[],
        };
        locate_trigger(source, 0, settings.trigger_mode, settings.trigger_value, settings.pre_trigger)
    };
    cache.trigger_found = outcome.found;
    if !outcome.found {
        pipeline_trace!("view '{}': waiting for {} trigger", ctx.view, settings.trigger_mode.label());
        return false;
    }

    let total = calculated.len();
    let offset = outcome.start.min(total - 1);
    let (start, count) = window_for_zoom_pan(total, offset, total - offset, settings.zoom, settings.pan);
    let mut drawn = calculated[start..start + count].to_vec();
    let holds = settings.paint_mode.holds_peaks();

    match settings.math_phase {
        MathPhase::AfterZoom => {
            cache.spectrum_width = None;
            if let Some(spectrum) = run_math(ctx, &drawn, &mut cache.fft) {
                cache.spectrum_width = Some(drawn.len());
                drawn = spectrum;
            }
            if holds {
                cache.peak.accumulate(&drawn, 0, drawn.len());
            }
        }
        MathPhase::None => {
            if holds {
                cache.peak.accumulate(&drawn, 0, drawn.len());
            }
        }
        // accumulated over the full spectrum in the before-zoom stage
        MathPhase::BeforeZoom => {}
    }

    pipeline_trace!("view '{}': drawn {}+{}", ctx.view, start, count);
    cache.drawn = Some(Arc::new(drawn));
    cache.drawn_start = start;
    cache.drawn_span = count;
    true
}

fn run_math(ctx: &StageContext<'_>, input: &[f64], engine: &mut Option<FftEngine>) -> Option<Vec<f64>> {
    let settings = ctx.settings;
    let result = FftEngine::ensure_width(engine, input.len(), settings.fft_window)
        .and_then(|e| e.transform(input, settings.math_output));
    match result {
        Ok(spectrum) => Some(spectrum),
        Err(e) => {
            log::warn!("view '{}': FFT failed, passing through: {e}", ctx.view);
            None
        }
    }
}
