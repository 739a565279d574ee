//! Time-domain filters applied in the before-zoom stage.
//!
//! Two families: centre-windowed FIR kernels (moving average, windowed-sinc
//! low-pass) and streaming biquads run over the whole buffer.

use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};

/// A filter over a complete sample sequence.
///
/// Implementations report bad parameters as errors; the pipeline turns every
/// error into pass-through.
pub trait Filter: Send + Sync {
    fn apply(&self, input: &[f64]) -> TransformResult<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadParams {
    pub b: [f64; 3],
    pub a: [f64; 3],
}

/// User-selectable filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum FilterKind {
    #[default]
    None,
    MovingAverage { taps: usize },
    SincLowpass { cutoff_hz: f64, taps: usize },
    Lowpass { cutoff_hz: f64 },
    Highpass { cutoff_hz: f64 },
    Bandpass { low_cut_hz: f64, high_cut_hz: f64 },
    BiquadLowpass { cutoff_hz: f64, q: f64 },
    BiquadHighpass { cutoff_hz: f64, q: f64 },
    BiquadBandpass { center_hz: f64, q: f64 },
    Custom { params: BiquadParams },
}

impl FilterKind {
    /// Parse a short filter name with default parameters (e.g. from a config file).
    pub fn from_name(name: &str) -> TransformResult<FilterKind> {
        let kind = match name.trim().to_ascii_lowercase().as_str() {
            "" | "none" => FilterKind::None,
            "avg" | "moving_average" => FilterKind::MovingAverage { taps: 5 },
            "sinc" | "sinc_lowpass" => FilterKind::SincLowpass { cutoff_hz: 10.0, taps: 31 },
            "lp" | "lowpass" => FilterKind::Lowpass { cutoff_hz: 10.0 },
            "hp" | "highpass" => FilterKind::Highpass { cutoff_hz: 1.0 },
            "bp" | "bandpass" => FilterKind::Bandpass { low_cut_hz: 1.0, high_cut_hz: 10.0 },
            "bqlp" => FilterKind::BiquadLowpass { cutoff_hz: 10.0, q: 0.707 },
            "bqhp" => FilterKind::BiquadHighpass { cutoff_hz: 1.0, q: 0.707 },
            "bqbp" => FilterKind::BiquadBandpass { center_hz: 5.0, q: 0.707 },
            other => return Err(TransformError::UnknownFilter(other.to_string())),
        };
        Ok(kind)
    }

    pub fn is_none(&self) -> bool {
        matches!(self, FilterKind::None)
    }

    /// Build a runnable filter for the given sample rate.
    pub fn build(&self, sample_rate_hz: f64) -> TransformResult<Box<dyn Filter>> {
        if !(sample_rate_hz > 0.0) {
            return Err(TransformError::InvalidParameter { name: "sample rate", value: sample_rate_hz });
        }
        let dt = 1.0 / sample_rate_hz;
        let nyquist = sample_rate_hz / 2.0;
        let check_freq = |name: &'static str, hz: f64| {
            if hz > 0.0 && hz < nyquist {
                Ok(hz)
            } else {
                Err(TransformError::InvalidParameter { name, value: hz })
            }
        };
        let check_taps = |taps: usize| {
            if taps == 0 {
                Err(TransformError::InvalidParameter { name: "taps", value: 0.0 })
            } else {
                Ok(taps)
            }
        };

        let filter: Box<dyn Filter> = match *self {
            FilterKind::None => Box::new(Passthrough),
            FilterKind::MovingAverage { taps } => {
                let taps = check_taps(taps)?;
                Box::new(FirFilter { kernel: vec![1.0 / taps as f64; taps] })
            }
            FilterKind::SincLowpass { cutoff_hz, taps } => {
                let fc = check_freq("cutoff", cutoff_hz)? / sample_rate_hz;
                Box::new(FirFilter { kernel: windowed_sinc(fc, check_taps(taps)?) })
            }
            FilterKind::Lowpass { cutoff_hz } => {
                Box::new(BiquadFilter::single(first_order_lowpass(check_freq("cutoff", cutoff_hz)?, dt)))
            }
            FilterKind::Highpass { cutoff_hz } => {
                Box::new(BiquadFilter::single(first_order_highpass(check_freq("cutoff", cutoff_hz)?, dt)))
            }
            FilterKind::Bandpass { low_cut_hz, high_cut_hz } => {
                let lo = check_freq("low cut", low_cut_hz)?;
                let hi = check_freq("high cut", high_cut_hz)?;
                if lo >= hi {
                    return Err(TransformError::InvalidParameter { name: "low cut", value: lo });
                }
                Box::new(BiquadFilter {
                    sections: vec![first_order_highpass(lo, dt), first_order_lowpass(hi, dt)],
                })
            }
            FilterKind::BiquadLowpass { cutoff_hz, q } => {
                Box::new(BiquadFilter::single(biquad_lowpass(check_freq("cutoff", cutoff_hz)?, q, dt)))
            }
            FilterKind::BiquadHighpass { cutoff_hz, q } => {
                Box::new(BiquadFilter::single(biquad_highpass(check_freq("cutoff", cutoff_hz)?, q, dt)))
            }
            FilterKind::BiquadBandpass { center_hz, q } => {
                Box::new(BiquadFilter::single(biquad_bandpass(check_freq("center", center_hz)?, q, dt)))
            }
            FilterKind::Custom { params } => {
                if params.a[0].abs() < 1e-15 {
                    return Err(TransformError::InvalidParameter { name: "a0", value: params.a[0] });
                }
                Box::new(BiquadFilter::single(params))
            }
        };
        Ok(filter)
    }

    /// Short label for status text, e.g. "BQLP 10.000 Hz, Q=0.71".
    pub fn describe(&self) -> String {
        match self {
            FilterKind::None => "none".to_string(),
            FilterKind::MovingAverage { taps } => format!("AVG {taps}"),
            FilterKind::SincLowpass { cutoff_hz, taps } => format!("SINC {:.3} Hz, {} taps", cutoff_hz, taps),
            FilterKind::Lowpass { cutoff_hz } => format!("LP {:.3} Hz", cutoff_hz),
            FilterKind::Highpass { cutoff_hz } => format!("HP {:.3} Hz", cutoff_hz),
            FilterKind::Bandpass { low_cut_hz, high_cut_hz } => {
                format!("BP {:.3}-{:.3} Hz", low_cut_hz, high_cut_hz)
            }
            FilterKind::BiquadLowpass { cutoff_hz, q } => format!("BQLP {:.3} Hz, Q={:.2}", cutoff_hz, q),
            FilterKind::BiquadHighpass { cutoff_hz, q } => format!("BQHP {:.3} Hz, Q={:.2}", cutoff_hz, q),
            FilterKind::BiquadBandpass { center_hz, q } => format!("BQBP {:.3} Hz, Q={:.2}", center_hz, q),
            FilterKind::Custom { .. } => "Custom".to_string(),
        }
    }
}

struct Passthrough;

impl Filter for Passthrough {
    fn apply(&self, input: &[f64]) -> TransformResult<Vec<f64>> {
        Ok(input.to_vec())
    }
}

/// Centre-windowed FIR: output `i` is the kernel centred on input `i`,
/// with edge samples repeated beyond the ends.
pub struct FirFilter {
    kernel: Vec<f64>,
}

impl FirFilter {
    pub fn new(kernel: Vec<f64>) -> TransformResult<Self> {
        if kernel.is_empty() {
            return Err(TransformError::InvalidParameter { name: "taps", value: 0.0 });
        }
        Ok(Self { kernel })
    }
}

impl Filter for FirFilter {
    fn apply(&self, input: &[f64]) -> TransformResult<Vec<f64>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        let half = (self.kernel.len() / 2) as isize;
        let last = input.len() as isize - 1;
        let out = (0..input.len() as isize)
            .map(|i| {
                self.kernel
                    .iter()
                    .enumerate()
                    .map(|(k, h)| {
                        let j = (i + k as isize - half).clamp(0, last);
                        h * input[j as usize]
                    })
                    .sum()
            })
            .collect();
        Ok(out)
    }
}

/// Cascade of direct-form-I biquad sections.
pub struct BiquadFilter {
    sections: Vec<BiquadParams>,
}

impl BiquadFilter {
    fn single(p: BiquadParams) -> Self {
        Self { sections: vec![p] }
    }
}

impl Filter for BiquadFilter {
    fn apply(&self, input: &[f64]) -> TransformResult<Vec<f64>> {
        let mut data = input.to_vec();
        for p in &self.sections {
            let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
            // Prime the state with the first sample so a DC offset does not ring.
            if let Some(&first) = data.first() {
                let dc_gain = (p.b[0] + p.b[1] + p.b[2]) / (p.a[0] + p.a[1] + p.a[2]);
                let y0 = if dc_gain.is_finite() { first * dc_gain } else { 0.0 };
                x1 = first;
                x2 = first;
                y1 = y0;
                y2 = y0;
            }
            for v in data.iter_mut() {
                let x0 = *v;
                let y = biquad_step(*p, x0, x1, x2, y1, y2);
                x2 = x1;
                x1 = x0;
                y2 = y1;
                y1 = y;
                *v = y;
            }
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(TransformError::InvalidParameter { name: "output", value: f64::NAN });
        }
        Ok(data)
    }
}

fn windowed_sinc(fc: f64, taps: usize) -> Vec<f64> {
    let m = (taps - 1) as f64;
    let mut kernel: Vec<f64> = (0..taps)
        .map(|n| {
            let x = n as f64 - m / 2.0;
            let sinc = if x.abs() < 1e-12 {
                2.0 * fc
            } else {
                (2.0 * std::f64::consts::PI * fc * x).sin() / (std::f64::consts::PI * x)
            };
            let w = if taps > 1 {
                0.54 - 0.46 * (2.0 * std::f64::consts::PI * n as f64 / m).cos()
            } else {
                1.0
            };
            sinc * w
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    if sum.abs() > 1e-12 {
        kernel.iter_mut().for_each(|h| *h /= sum);
    }
    kernel
}

#[inline]
fn first_order_lowpass(fc: f64, dt: f64) -> BiquadParams {
    let rc = 1.0 / (2.0 * std::f64::consts::PI * fc.max(1e-9));
    let alpha = dt / (rc + dt);
    BiquadParams { b: [alpha, 0.0, 0.0], a: [1.0, -(1.0 - alpha), 0.0] }
}

#[inline]
fn first_order_highpass(fc: f64, dt: f64) -> BiquadParams {
    let rc = 1.0 / (2.0 * std::f64::consts::PI * fc.max(1e-9));
    let alpha = rc / (rc + dt);
    BiquadParams { b: [alpha, -alpha, 0.0], a: [1.0, -alpha, 0.0] }
}

#[inline]
fn biquad_step(p: BiquadParams, x0: f64, x1: f64, x2: f64, y1: f64, y2: f64) -> f64 {
    let a0 = if p.a[0].abs() < 1e-15 { 1.0 } else { p.a[0] };
    let (b0, b1, b2) = (p.b[0] / a0, p.b[1] / a0, p.b[2] / a0);
    let (a1, a2) = (p.a[1] / a0, p.a[2] / a0);
    b0 * x0 + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2
}

/// Shared RBJ cookbook terms: `(cos w0, alpha)`.
#[inline]
fn rbj_terms(fc: f64, q: f64, dt: f64) -> (f64, f64) {
    let fs = (1.0 / dt).max(1.0);
    let w0 = 2.0 * std::f64::consts::PI * (fc.max(1e-9) / fs);
    let alpha = w0.sin() / (2.0 * q.max(1e-6));
    (w0.cos(), alpha)
}

#[inline]
fn biquad_lowpass(fc: f64, q: f64, dt: f64) -> BiquadParams {
    let (cosw0, alpha) = rbj_terms(fc, q, dt);
    BiquadParams {
        b: [(1.0 - cosw0) * 0.5, 1.0 - cosw0, (1.0 - cosw0) * 0.5],
        a: [1.0 + alpha, -2.0 * cosw0, 1.0 - alpha],
    }
}

#[inline]
fn biquad_highpass(fc: f64, q: f64, dt: f64) -> BiquadParams {
    let (cosw0, alpha) = rbj_terms(fc, q, dt);
    BiquadParams {
        b: [(1.0 + cosw0) * 0.5, -(1.0 + cosw0), (1.0 + cosw0) * 0.5],
        a: [1.0 + alpha, -2.0 * cosw0, 1.0 - alpha],
    }
}

#[inline]
fn biquad_bandpass(fc: f64, q: f64, dt: f64) -> BiquadParams {
    let (cosw0, alpha) = rbj_terms(fc, q, dt);
    BiquadParams {
        b: [alpha, 0.0, -alpha],
        a: [1.0 + alpha, -2.0 * cosw0, 1.0 - alpha],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moving_average_smooths_step_with_clamped_edges() {
        let f = FilterKind::MovingAverage { taps: 3 }.build(1.0).unwrap();
        let out = f.apply(&[0.0, 0.0, 3.0, 3.0]).unwrap();
        assert_eq!(out, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn lowpass_keeps_dc() {
        let f = FilterKind::BiquadLowpass { cutoff_hz: 5.0, q: 0.707 }.build(100.0).unwrap();
        let out = f.apply(&[2.0; 64]).unwrap();
        assert!(out.iter().all(|v| (v - 2.0).abs() < 1e-9), "{out:?}");
    }

    #[test]
    fn sinc_kernel_has_unit_gain() {
        let f = FilterKind::SincLowpass { cutoff_hz: 5.0, taps: 21 }.build(100.0).unwrap();
        let out = f.apply(&[1.5; 40]).unwrap();
        assert!(out.iter().all(|v| (v - 1.5).abs() < 1e-9));
    }

    #[test]
    fn invalid_parameters_are_errors() {
        assert!(FilterKind::Lowpass { cutoff_hz: 80.0 }.build(100.0).is_err());
        assert!(FilterKind::MovingAverage { taps: 0 }.build(100.0).is_err());
        assert!(FilterKind::Bandpass { low_cut_hz: 10.0, high_cut_hz: 5.0 }.build(100.0).is_err());
        assert!(FilterKind::None.build(0.0).is_err());
    }

    #[test]
    fn names_parse() {
        assert_eq!(FilterKind::from_name("none").unwrap(), FilterKind::None);
        assert!(matches!(FilterKind::from_name("BQLP").unwrap(), FilterKind::BiquadLowpass { .. }));
        assert_eq!(
            FilterKind::from_name("bogus"),
            Err(TransformError::UnknownFilter("bogus".to_string()))
        );
    }

    #[test]
    fn describe_matches_kind() {
        assert_eq!(FilterKind::Lowpass { cutoff_hz: 2.0 }.describe(), "LP 2.000 Hz");
    }
}
