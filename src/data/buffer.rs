//! Sample buffers and their DataLock.
//!
//! A [`SampleBuffer`] owns the raw samples and one mutex (the DataLock). The
//! lock guards the samples *and* the [`CalculationCache`] of every view bound
//! to the buffer, so a cache can only be touched through a [`DataGuard`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::data::cache::CalculationCache;
use crate::data::listeners::{ListenerId, ListenerList};

/// Identifier of a view, unique within the process.
pub type ViewId = u64;

/// Callback invoked after samples change, with the new generation.
pub type SamplesChanged = Arc<dyn Fn(u64) + Send + Sync>;

/// Everything guarded by a buffer's DataLock.
#[derive(Debug, Default)]
pub struct BufferData {
    samples: Vec<f64>,
    generation: u64,
    caches: HashMap<ViewId, CalculationCache>,
}

impl BufferData {
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn cache(&self, view: ViewId) -> Option<&CalculationCache> {
        self.caches.get(&view)
    }

    pub fn cache_mut(&mut self, view: ViewId) -> &mut CalculationCache {
        self.caches.entry(view).or_default()
    }

    /// Borrow the samples and one view's cache at the same time.
    pub fn split_mut(&mut self, view: ViewId) -> (&[f64], &mut CalculationCache) {
        let cache = self.caches.entry(view).or_default();
        (&self.samples, cache)
    }

    pub(crate) fn remove_cache(&mut self, view: ViewId) {
        self.caches.remove(&view);
    }

    /// Samples with non-finite gaps filled by linear interpolation.
    ///
    /// Leading/trailing gaps take the nearest finite value; an all-gap
    /// buffer becomes zeros.
    pub fn interpolated(&self) -> Vec<f64> {
        interpolate_gaps(&self.samples)
    }

    fn bump(&mut self) -> u64 {
        self.generation += 1;
        for cache in self.caches.values_mut() {
            cache.clear();
        }
        self.generation
    }
}

/// Held DataLock.
pub type DataGuard<'a> = MutexGuard<'a, BufferData>;

/// Named, append-only (bounded) sample store.
pub struct SampleBuffer {
    name: String,
    sample_rate_hz: f64,
    max_samples: usize,
    data: Mutex<BufferData>,
    listeners: ListenerList<SamplesChanged>,
}

impl std::fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("name", &self.name)
            .field("sample_rate_hz", &self.sample_rate_hz)
            .field("max_samples", &self.max_samples)
            .finish()
    }
}

impl SampleBuffer {
    /// Default cap on retained samples.
    pub const DEFAULT_MAX_SAMPLES: usize = 100_000;

    pub fn new(name: impl Into<String>, sample_rate_hz: f64) -> Arc<Self> {
        Self::with_capacity(name, sample_rate_hz, Self::DEFAULT_MAX_SAMPLES)
    }

    /// Buffer that keeps only the newest `max_samples` samples.
    pub fn with_capacity(name: impl Into<String>, sample_rate_hz: f64, max_samples: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            sample_rate_hz: if sample_rate_hz > 0.0 { sample_rate_hz } else { 1.0 },
            max_samples: max_samples.max(1),
            data: Mutex::new(BufferData::default()),
            listeners: ListenerList::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }

    /// Take the DataLock. Never hold it across a blocking wait.
    pub fn lock(&self) -> DataGuard<'_> {
        // A panic while holding the lock leaves the cache consistent enough to
        // keep rendering; recover instead of propagating the poison.
        self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn sample_count(&self) -> usize {
        self.lock().samples.len()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Copy of the samples with gaps (NaN/inf) linearly interpolated.
    pub fn interpolated_samples(&self) -> Vec<f64> {
        self.lock().interpolated()
    }

    /// Register a callback fired (outside the DataLock) after every change.
    pub fn on_samples_changed(&self, callback: SamplesChanged) -> ListenerId {
        self.listeners.add(callback)
    }

    pub fn remove_samples_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Append samples, dropping the oldest beyond the capacity.
    pub fn append(&self, samples: &[f64]) {
        if samples.is_empty() {
            return;
        }
        let generation = {
            let mut data = self.lock();
            data.samples.extend_from_slice(samples);
            let excess = data.samples.len().saturating_sub(self.max_samples);
            if excess > 0 {
                data.samples.drain(..excess);
            }
            data.bump()
        };
        self.notify(generation);
    }

    /// Replace the whole content.
    pub fn replace(&self, samples: Vec<f64>) {
        let generation = {
            let mut data = self.lock();
            let excess = samples.len().saturating_sub(self.max_samples);
            data.samples = samples;
            if excess > 0 {
                data.samples.drain(..excess);
            }
            data.bump()
        };
        self.notify(generation);
    }

    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    fn notify(&self, generation: u64) {
        let listeners = self.listeners.snapshot();
        log::trace!("buffer '{}' generation {}", self.name, generation);
        for listener in listeners {
            listener(generation);
        }
    }
}

fn interpolate_gaps(samples: &[f64]) -> Vec<f64> {
    let mut out = samples.to_vec();
    let mut prev: Option<usize> = None;
    let mut i = 0;
    while i < out.len() {
        if out[i].is_finite() {
            prev = Some(i);
            i += 1;
            continue;
        }
        let next = (i..out.len()).find(|&j| out[j].is_finite());
        match (prev, next) {
            (Some(p), Some(n)) => {
                let (a, b) = (out[p], out[n]);
                for j in i..n {
                    let t = (j - p) as f64 / (n - p) as f64;
                    out[j] = a + (b - a) * t;
                }
                i = n;
            }
            (Some(p), None) => {
                let v = out[p];
                out[i..].iter_mut().for_each(|x| *x = v);
                break;
            }
            (None, Some(n)) => {
                let v = out[n];
                out[i..n].iter_mut().for_each(|x| *x = v);
                i = n;
            }
            (None, None) => {
                out.iter_mut().for_each(|x| *x = 0.0);
                break;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn append_bumps_generation_and_notifies() {
        let buffer = SampleBuffer::new("a", 10.0);
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = seen.clone();
        buffer.on_samples_changed(Arc::new(move |g| seen2.store(g, Ordering::SeqCst)));
        buffer.append(&[1.0, 2.0]);
        buffer.append(&[3.0]);
        assert_eq!(buffer.generation(), 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(buffer.sample_count(), 3);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let buffer = SampleBuffer::new("a", 10.0);
        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = seen.clone();
        let id = buffer.on_samples_changed(Arc::new(move |g| seen2.store(g, Ordering::SeqCst)));
        assert!(buffer.remove_samples_listener(id));
        buffer.append(&[1.0]);
        assert_eq!(seen.load(Ordering::SeqCst), 0);
        assert_eq!(buffer.listener_count(), 0);
    }

    #[test]
    fn capacity_drops_oldest() {
        let buffer = SampleBuffer::with_capacity("a", 1.0, 3);
        buffer.append(&[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(buffer.lock().samples(), &[2.0, 3.0, 4.0]);
    }

    #[test]
    fn gaps_are_interpolated() {
        let buffer = SampleBuffer::new("a", 1.0);
        buffer.replace(vec![f64::NAN, 1.0, f64::NAN, 3.0, f64::NAN]);
        assert_eq!(buffer.interpolated_samples(), vec![1.0, 1.0, 2.0, 3.0, 3.0]);
        buffer.replace(vec![f64::NAN; 2]);
        assert_eq!(buffer.interpolated_samples(), vec![0.0, 0.0]);
    }

    #[test]
    fn new_samples_clear_caches() {
        let buffer = SampleBuffer::new("a", 1.0);
        buffer.lock().cache_mut(7).drawn = Some(Arc::new(vec![1.0]));
        buffer.append(&[1.0]);
        assert!(buffer.lock().cache(7).is_some_and(|c| c.drawn().is_none()));
    }
}
