//! Background repaint scheduling.
//!
//! `invalidate()` only bumps a counter and wakes the scheduling thread;
//! the thread coalesces everything that arrived since the last repaint,
//! enforces the rate limit and asks the surface for one repaint.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::RenderSettings;
use crate::render::surface::RepaintSurface;

/// Rolling paint-duration statistics.
#[derive(Debug)]
pub(crate) struct PaintTiming {
    samples: VecDeque<Duration>,
    window: usize,
    regime_change_ratio: f64,
    overtime_ratio: f64,
    last_duration: Duration,
    last_start: Option<Instant>,
    last_end: Option<Instant>,
    interval: Option<Duration>,
    overtime: bool,
    paints: u64,
}

impl PaintTiming {
    pub(crate) fn new(settings: &RenderSettings) -> Self {
        Self {
            samples: VecDeque::with_capacity(settings.timing_window),
            window: settings.timing_window.max(1),
            regime_change_ratio: settings.regime_change_ratio,
            overtime_ratio: settings.overtime_ratio,
            last_duration: Duration::ZERO,
            last_start: None,
            last_end: None,
            interval: None,
            overtime: false,
            paints: 0,
        }
    }

    pub(crate) fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<Duration>() / self.samples.len() as u32)
    }

    pub(crate) fn record(&mut self, started: Instant, duration: Duration) {
        if let Some(previous) = self.last_start {
            self.interval = Some(started.saturating_duration_since(previous));
        }
        if let Some(average) = self.average() {
            // much faster than before: the old samples describe another workload
            if duration.as_secs_f64() < average.as_secs_f64() * self.regime_change_ratio {
                log::debug!("paint time dropped to {duration:?} (avg {average:?}), resetting average");
                self.samples.clear();
            }
        }
        self.samples.push_back(duration);
        while self.samples.len() > self.window {
            self.samples.pop_front();
        }
        self.overtime = self
            .interval
            .is_some_and(|i| duration.as_secs_f64() > i.as_secs_f64() * self.overtime_ratio);
        if self.overtime {
            log::trace!("paint overtime: {duration:?} of {:?}", self.interval);
        }
        self.last_duration = duration;
        self.last_start = Some(started);
        self.last_end = Some(started + duration);
        self.paints += 1;
    }

    /// Time still to wait before the next repaint request.
    pub(crate) fn rate_limit_delay(&self, factor: f64, cap: Duration, now: Instant) -> Duration {
        let Some(end) = self.last_end else { return Duration::ZERO };
        let limit = self.last_duration.mul_f64(factor.max(0.0)).min(cap);
        limit.saturating_sub(now.saturating_duration_since(end))
    }
}

/// Snapshot of the render scheduler's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PaintStats {
    pub paints: u64,
    pub average: Duration,
    pub last: Duration,
    /// Last paint took more than the configured share of the paint interval.
    pub overtime: bool,
    pub recursions: u64,
    pub repaint_requests: u64,
    pub pending: usize,
}

struct Shared {
    surface: Arc<dyn RepaintSurface>,
    settings: RenderSettings,
    pending: AtomicUsize,
    woken: Mutex<bool>,
    wake: Condvar,
    running: AtomicBool,
    painting: AtomicBool,
    timing: Mutex<PaintTiming>,
    repaint_requests: AtomicU64,
    recursions: AtomicU64,
}

impl Shared {
    fn woken(&self) -> MutexGuard<'_, bool> {
        self.woken.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn timing(&self) -> MutexGuard<'_, PaintTiming> {
        self.timing.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn signal(&self) {
        *self.woken() = true;
        self.wake.notify_one();
    }

    /// Wait for a wake signal or the timeout.
    fn wait_for_wake(&self, timeout: Duration) {
        let mut woken = self.woken();
        if !*woken {
            woken = match self.wake.wait_timeout(woken, timeout) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        *woken = false;
    }

    /// Sleep for `delay`, returning early on shutdown.
    fn sleep_unless_stopped(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        let mut woken = self.woken();
        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            woken = match self.wake.wait_timeout(woken, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn run(&self) {
        let timeout = Duration::from_millis(self.settings.wake_timeout_ms.max(1));
        let cap = Duration::from_millis(self.settings.max_rate_limit_ms);
        log::debug!("render scheduler started");
        while self.running.load(Ordering::Acquire) {
            self.wait_for_wake(timeout);
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            let coalesced = self.pending.swap(0, Ordering::AcqRel);
            if coalesced == 0 {
                continue;
            }
            let delay = self.timing().rate_limit_delay(self.settings.rate_limit_factor, cap, Instant::now());
            if !delay.is_zero() {
                self.sleep_unless_stopped(delay);
                if !self.running.load(Ordering::Acquire) {
                    break;
                }
            }
            log::trace!("repaint for {coalesced} invalidation(s)");
            self.repaint_requests.fetch_add(1, Ordering::Relaxed);
            self.surface.request_repaint();
        }
        log::debug!("render scheduler stopped");
    }
}

/// Held while a paint is in progress.
pub struct PaintGuard<'a> {
    painting: &'a AtomicBool,
}

impl Drop for PaintGuard<'_> {
    fn drop(&mut self) {
        self.painting.store(false, Ordering::Release);
    }
}

/// Decouples "something changed" from repaint work.
pub struct RenderScheduler {
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderScheduler").field("stats", &self.stats()).finish()
    }
}

impl RenderScheduler {
    /// Spawn the scheduling thread.
    pub fn start(surface: Arc<dyn RepaintSurface>, settings: RenderSettings) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            surface,
            timing: Mutex::new(PaintTiming::new(&settings)),
            settings,
            pending: AtomicUsize::new(0),
            woken: Mutex::new(false),
            wake: Condvar::new(),
            running: AtomicBool::new(true),
            painting: AtomicBool::new(false),
            repaint_requests: AtomicU64::new(0),
            recursions: AtomicU64::new(0),
        });
        let worker = shared.clone();
        let handle = thread::Builder::new()
            .name("scopeview-render".into())
            .spawn(move || worker.run())?;
        Ok(Self { shared, thread: Mutex::new(Some(handle)) })
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.shared.settings
    }

    /// Request a repaint. Dropped while the surface is not realised.
    pub fn invalidate(&self) {
        if !self.shared.surface.is_realized() {
            return;
        }
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        self.shared.signal();
    }

    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    /// Enter the paint section; `None` if a paint is already running.
    pub fn enter_paint(&self) -> Option<PaintGuard<'_>> {
        match self
            .shared
            .painting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Some(PaintGuard { painting: &self.shared.painting }),
            Err(_) => {
                self.shared.recursions.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn is_painting(&self) -> bool {
        self.shared.painting.load(Ordering::Acquire)
    }

    pub fn record_paint(&self, started: Instant, duration: Duration) {
        self.shared.timing().record(started, duration);
    }

    pub fn stats(&self) -> PaintStats {
        let timing = self.shared.timing();
        PaintStats {
            paints: timing.paints,
            average: timing.average().unwrap_or_default(),
            last: timing.last_duration,
            overtime: timing.overtime,
            recursions: self.shared.recursions.load(Ordering::Relaxed),
            repaint_requests: self.shared.repaint_requests.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    /// Stop and join the scheduling thread. Idempotent.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.signal();
        let handle = self.thread.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                log::warn!("render scheduler thread panicked");
            }
        }
    }
}

impl Drop for RenderScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
