// FFT engine and spectral transforms for the calculation pipeline.
// Provides windowing, one-sided magnitude/phase spectra and FFT-domain
// band filtering.
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::data::filter::Filter;
use crate::error::{TransformError, TransformResult};

/// Supported FFT window functions for spectral analysis.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FftWindow {
    /// Rectangular (no windowing)
    Rect,
    /// Hann window
    #[default]
    Hann,
    /// Hamming window
    Hamming,
    /// Blackman window
    Blackman,
}

impl FftWindow {
    /// All available window types (for UI selection)
    pub const ALL: &'static [FftWindow] = &[
        FftWindow::Rect,
        FftWindow::Hann,
        FftWindow::Hamming,
        FftWindow::Blackman,
    ];

    /// Human-readable label for each window type
    pub fn label(&self) -> &'static str {
        match self {
            FftWindow::Rect => "Rect",
            FftWindow::Hann => "Hann",
            FftWindow::Hamming => "Hamming",
            FftWindow::Blackman => "Blackman",
        }
    }

    /// Compute the window weight for a given sample index
    pub fn weight(&self, n: usize, len: usize) -> f64 {
        let phase = 2.0 * std::f64::consts::PI * n as f64 / (len as f64);
        match self {
            FftWindow::Rect => 1.0,
            FftWindow::Hann => 0.5 - 0.5 * phase.cos(),
            FftWindow::Hamming => 0.54 - 0.46 * phase.cos(),
            FftWindow::Blackman => 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos(),
        }
    }
}

/// Where in the pipeline the FFT is applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MathPhase {
    /// No FFT; the view shows time-domain samples.
    #[default]
    None,
    /// FFT over the whole filtered buffer, then trigger/zoom on the spectrum.
    BeforeZoom,
    /// FFT over the visible window only.
    AfterZoom,
}

/// Which spectrum the FFT stage produces.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MathOutput {
    #[default]
    Magnitude,
    Phase,
    /// 20·log10 of the magnitude (dB).
    LogMagnitude,
}

impl MathOutput {
    pub fn unit(&self) -> &'static str {
        match self {
            MathOutput::Magnitude => "",
            MathOutput::Phase => "rad",
            MathOutput::LogMagnitude => "dB",
        }
    }
}

/// Planned forward FFT of a fixed width.
///
/// Re-create (or call [`FftEngine::ensure_width`]) when the input width changes.
pub struct FftEngine {
    width: usize,
    window: FftWindow,
    plan: Arc<dyn Fft<f64>>,
    spectrum: Vec<Complex<f64>>,
}

impl std::fmt::Debug for FftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftEngine")
            .field("width", &self.width)
            .field("window", &self.window)
            .finish()
    }
}

impl FftEngine {
    pub fn new(width: usize, window: FftWindow) -> TransformResult<Self> {
        if width < 2 {
            return Err(TransformError::InvalidParameter { name: "FFT width", value: width as f64 });
        }
        let mut planner = FftPlanner::new();
        Ok(Self {
            width,
            window,
            plan: planner.plan_fft_forward(width),
            spectrum: Vec::new(),
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Re-plan if `width` or `window` differ from the current plan.
    pub fn ensure_width(engine: &mut Option<FftEngine>, width: usize, window: FftWindow) -> TransformResult<&mut FftEngine> {
        let stale = match engine {
            Some(e) => e.width != width || e.window != window,
            None => true,
        };
        if stale {
            log::debug!("planning FFT width={} window={}", width, window.label());
            *engine = Some(FftEngine::new(width, window)?);
        }
        engine.as_mut().ok_or(TransformError::EmptyInput)
    }

    /// Windowed forward transform of `input`, which must match the planned width.
    pub fn forward(&mut self, input: &[f64]) -> TransformResult<()> {
        if input.len() != self.width {
            return Err(TransformError::WidthMismatch { planned: self.width, input: input.len() });
        }
        self.spectrum = input
            .iter()
            .enumerate()
            .map(|(i, &v)| Complex { re: v * self.window.weight(i, self.width), im: 0.0 })
            .collect();
        self.plan.process(&mut self.spectrum);
        Ok(())
    }

    /// One-sided amplitude spectrum (up to Nyquist), `width / 2` bins.
    pub fn magnitude(&self) -> Vec<f64> {
        let scale = 2.0 / self.width as f64; // amplitude normalization
        self.spectrum
            .iter()
            .take(self.width / 2)
            .map(|c| c.norm() * scale)
            .collect()
    }

    /// One-sided phase spectrum in radians, `width / 2` bins.
    pub fn phase(&self) -> Vec<f64> {
        self.spectrum.iter().take(self.width / 2).map(|c| c.arg()).collect()
    }

    /// Run the transform and produce the requested output.
    pub fn transform(&mut self, input: &[f64], output: MathOutput) -> TransformResult<Vec<f64>> {
        self.forward(input)?;
        Ok(match output {
            MathOutput::Magnitude => self.magnitude(),
            MathOutput::Phase => self.phase(),
            MathOutput::LogMagnitude => self
                .magnitude()
                .into_iter()
                .map(|m| 20.0 * (m.max(1e-12)).log10())
                .collect(),
        })
    }
}

/// Frequency of bin `k` of a `width`-point transform.
pub fn bin_frequency(k: usize, width: usize, sample_rate_hz: f64) -> f64 {
    if width == 0 {
        return 0.0;
    }
    k as f64 * sample_rate_hz / width as f64
}

/// Band shape for FFT-domain filtering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectralBand {
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

/// FFT-domain filter: zero the bins outside (or inside, for a notch) a band.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpectralFilter {
    pub band: SpectralBand,
    /// Lower edge (LowPass: ignored).
    pub low_hz: f64,
    /// Upper edge (HighPass: ignored).
    pub high_hz: f64,
}

impl SpectralFilter {
    fn passes(&self, f: f64) -> bool {
        match self.band {
            SpectralBand::LowPass => f <= self.high_hz,
            SpectralBand::HighPass => f >= self.low_hz,
            SpectralBand::BandPass => f >= self.low_hz && f <= self.high_hz,
            SpectralBand::Notch => f < self.low_hz || f > self.high_hz,
        }
    }

    pub fn describe(&self) -> String {
        match self.band {
            SpectralBand::LowPass => format!("FFT LP {:.3} Hz", self.high_hz),
            SpectralBand::HighPass => format!("FFT HP {:.3} Hz", self.low_hz),
            SpectralBand::BandPass => format!("FFT BP {:.3}-{:.3} Hz", self.low_hz, self.high_hz),
            SpectralBand::Notch => format!("FFT notch {:.3}-{:.3} Hz", self.low_hz, self.high_hz),
        }
    }

    /// Bind to a sample rate so it can run as a [`Filter`].
    pub fn at_rate(self, sample_rate_hz: f64) -> TransformResult<BoundSpectralFilter> {
        if !(sample_rate_hz > 0.0) {
            return Err(TransformError::InvalidParameter { name: "sample rate", value: sample_rate_hz });
        }
        if self.band != SpectralBand::LowPass && self.low_hz < 0.0 {
            return Err(TransformError::InvalidParameter { name: "low edge", value: self.low_hz });
        }
        if matches!(self.band, SpectralBand::BandPass | SpectralBand::Notch) && self.low_hz > self.high_hz {
            return Err(TransformError::InvalidParameter { name: "low edge", value: self.low_hz });
        }
        Ok(BoundSpectralFilter { band: self, sample_rate_hz })
    }
}

pub struct BoundSpectralFilter {
    band: SpectralFilter,
    sample_rate_hz: f64,
}

impl Filter for BoundSpectralFilter {
    fn apply(&self, input: &[f64]) -> TransformResult<Vec<f64>> {
        let n = input.len();
        if n == 0 {
            return Err(TransformError::EmptyInput);
        }
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        let mut data: Vec<Complex<f64>> = input.iter().map(|&re| Complex { re, im: 0.0 }).collect();
        forward.process(&mut data);
        for (k, c) in data.iter_mut().enumerate() {
            // bins above n/2 mirror the negative frequencies
            let mirrored = if k <= n / 2 { k } else { n - k };
            if !self.band.passes(bin_frequency(mirrored, n, self.sample_rate_hz)) {
                *c = Complex { re: 0.0, im: 0.0 };
            }
        }
        inverse.process(&mut data);
        let scale = 1.0 / n as f64;
        Ok(data.iter().map(|c| c.re * scale).collect())
    }
}
