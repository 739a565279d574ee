//! Trigger edge search and zoom/pan window derivation.

use serde::{Deserialize, Serialize};

/// How a view locates the start of its displayed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TriggerMode {
    /// Free running: the window starts at the original offset.
    #[default]
    None,
    /// Wait for a rising edge; freeze the display until one is found.
    Rising,
    /// Wait for a falling edge; freeze the display until one is found.
    Falling,
    /// Rising edge if present, free running otherwise.
    RisingAuto,
    /// Falling edge if present, free running otherwise.
    FallingAuto,
}

impl TriggerMode {
    /// All modes (for UI selection)
    pub const ALL: &'static [TriggerMode] = &[
        TriggerMode::None,
        TriggerMode::Rising,
        TriggerMode::Falling,
        TriggerMode::RisingAuto,
        TriggerMode::FallingAuto,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TriggerMode::None => "none",
            TriggerMode::Rising => "rising",
            TriggerMode::Falling => "falling",
            TriggerMode::RisingAuto => "rising (auto)",
            TriggerMode::FallingAuto => "falling (auto)",
        }
    }

    /// Auto modes fall back to free running when no edge is found.
    pub fn is_auto(&self) -> bool {
        matches!(self, TriggerMode::RisingAuto | TriggerMode::FallingAuto)
    }

    fn is_rising(&self) -> bool {
        matches!(self, TriggerMode::Rising | TriggerMode::RisingAuto)
    }

    /// Whether `prev -> curr` crosses `level` in this mode's direction.
    pub fn crosses(&self, prev: f64, curr: f64, level: f64) -> bool {
        match self {
            TriggerMode::None => false,
            _ if self.is_rising() => prev < level && level <= curr,
            _ => prev > level && level >= curr,
        }
    }
}

/// Result of a trigger search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerOutcome {
    /// `false` only for manual modes without an edge; the caller must then
    /// leave its displayed samples untouched.
    pub found: bool,
    /// First sample of the triggered region.
    pub start: usize,
}

/// Search `samples` for the first edge crossing `level` after `start_offset`.
///
/// The pair ending at `start_offset` itself is never reported as a crossing.
/// On a crossing at index `i` the region starts `pre_trigger` samples earlier
/// (clamped at zero).
pub fn locate_trigger(
    samples: &[f64],
    start_offset: usize,
    mode: TriggerMode,
    level: f64,
    pre_trigger: usize,
) -> TriggerOutcome {
    if mode == TriggerMode::None || samples.is_empty() {
        return TriggerOutcome { found: true, start: start_offset };
    }

    let first = start_offset.max(1);
    for i in first..samples.len() {
        if i == start_offset {
            continue;
        }
        if mode.crosses(samples[i - 1], samples[i], level) {
            return TriggerOutcome {
                found: true,
                start: i.saturating_sub(pre_trigger),
            };
        }
    }

    TriggerOutcome { found: mode.is_auto(), start: start_offset }
}

/// Derive the visible `(start, count)` from the triggered region.
///
/// `zoom` is the visible fraction of the buffer, `pan` shifts the window
/// right by that fraction of the buffer. `zoom = 1, pan = 0` yields the full
/// triggered region. Returns `(0, 0)` for an empty buffer.
pub fn window_for_zoom_pan(
    total_len: usize,
    trigger_offset: usize,
    trigger_count: usize,
    zoom: f64,
    pan: f64,
) -> (usize, usize) {
    if total_len == 0 {
        return (0, 0);
    }
    let total = total_len as f64;
    let zoomed = (total * zoom.max(0.0)).floor() as usize;
    let count = trigger_count.min(zoomed).min(total_len).max(1);

    let kept = (total * (1.0 - pan).clamp(0.0, 1.0)).floor() as usize;
    let start = trigger_offset + (total_len - kept.min(total_len));
    let start = start.min(total_len - count);
    (start, count)
}
