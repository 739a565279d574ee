//! Axis extents and statistics of a drawn window, used for labels and tooltips.

/// Horizontal extent of the drawn samples, for axis labelling.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawnExtents {
    /// Index of the first drawn sample within the before-zoom result.
    pub left_index: usize,
    /// Index of the last drawn sample within the before-zoom result.
    pub right_index: usize,
    /// Axis value (time or frequency) at the left edge.
    pub left_value: f64,
    /// Axis value (time or frequency) at the right edge.
    pub right_value: f64,
    /// Axis unit: "s" for time traces, "Hz" for spectra.
    pub unit: &'static str,
}

/// Summary statistics of a sample window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
}

impl TraceStats {
    /// Statistics over the finite values of `samples`.
    pub fn of(samples: &[f64]) -> Option<TraceStats> {
        let mut count = 0usize;
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut sum, mut sum_sq) = (0.0, 0.0);
        for &v in samples.iter().filter(|v| v.is_finite()) {
            count += 1;
            min = min.min(v);
            max = max.max(v);
            sum += v;
            sum_sq += v * v;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(TraceStats { count, min, max, mean: sum / n, rms: (sum_sq / n).sqrt() })
    }
}

/// Format `value` with an optional unit suffix.
pub fn format_value(value: f64, unit: Option<&str>) -> String {
    match unit {
        Some(u) if !u.is_empty() => format!("{value:.4} {u}"),
        _ => format!("{value:.4}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_skip_non_finite() {
        let s = TraceStats::of(&[1.0, f64::NAN, -1.0]).unwrap();
        assert_eq!(s.count, 2);
        assert_eq!(s.min, -1.0);
        assert_eq!(s.max, 1.0);
        assert_eq!(s.mean, 0.0);
        assert_eq!(s.rms, 1.0);
        assert!(TraceStats::of(&[]).is_none());
    }

    #[test]
    fn value_formatting() {
        assert_eq!(format_value(1.5, Some("V")), "1.5000 V");
        assert_eq!(format_value(1.5, Some("")), "1.5000");
        assert_eq!(format_value(-2.0, None), "-2.0000");
    }
}
