//! Running min/max envelope that spans multiple pipeline passes.

/// Elementwise min/max of every window accumulated since the last clear.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeakHoldAccumulator {
    min: Vec<f64>,
    max: Vec<f64>,
    passes: usize,
}

impl PeakHoldAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `samples[start..start + count]` into the envelope.
    ///
    /// The first window is copied as both min and max. Later windows update
    /// the overlapping range elementwise; a longer window extends the envelope.
    pub fn accumulate(&mut self, samples: &[f64], start: usize, count: usize) {
        let start = start.min(samples.len());
        let end = start.saturating_add(count).min(samples.len());
        let window = &samples[start..end];

        if self.passes == 0 {
            self.min = window.to_vec();
            self.max = window.to_vec();
        } else {
            let overlap = window.len().min(self.min.len());
            for (i, &v) in window.iter().take(overlap).enumerate() {
                self.min[i] = self.min[i].min(v);
                self.max[i] = self.max[i].max(v);
            }
            if window.len() > overlap {
                self.min.extend_from_slice(&window[overlap..]);
                self.max.extend_from_slice(&window[overlap..]);
            }
        }
        self.passes += 1;
    }

    pub fn clear(&mut self) {
        self.min = Vec::new();
        self.max = Vec::new();
        self.passes = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.passes == 0
    }

    /// Number of windows accumulated since the last clear.
    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }
}
