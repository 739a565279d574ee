//! Views: independently configured displays of a sample buffer.
//!
//! A [`View`] owns its display parameters and dirty flags; its
//! [`CalculationCache`] lives in the bound buffer's DataLock.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, Weak};

use serde::{Deserialize, Serialize};

use crate::data::buffer::{SampleBuffer, ViewId};
use crate::data::cache::{CalculationCache, DirtyFlags, InvalidateLevel, Samples};
use crate::data::composite::{Composite, CompositeKind};
use crate::data::fft::{bin_frequency, FftWindow, MathOutput, MathPhase, SpectralFilter};
use crate::data::filter::FilterKind;
use crate::data::listeners::{ListenerId, ListenerList};
use crate::data::measurement::{format_value, DrawnExtents, TraceStats};
use crate::data::pipeline::{self, adjust_window, SampleWindow, StageContext, TriggerSamples};
use crate::data::trigger::TriggerMode;
use crate::render::paint::{PaintMode, PaintStrategy};

static NEXT_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// Upper bound on listener rounds triggered by one settings change.
const MAX_NOTIFY_ROUNDS: usize = 4;

/// Callback fired after a view's settings change.
pub type SettingsChanged = Arc<dyn Fn(&View, InvalidateLevel) + Send + Sync>;

/// Display parameters of a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    pub filter: FilterKind,
    pub spectral_filter: Option<SpectralFilter>,
    pub math_phase: MathPhase,
    pub math_output: MathOutput,
    pub fft_window: FftWindow,
    pub trigger_mode: TriggerMode,
    pub trigger_value: f64,
    /// Samples shown before the trigger edge.
    pub pre_trigger: usize,
    /// Visible fraction of the buffer (0, 1].
    pub zoom: f64,
    /// Shift of the visible window, as a fraction of the buffer.
    pub pan: f64,
    pub paint_mode: PaintMode,
    pub window: SampleWindow,
    /// Value unit label (e.g. "V").
    pub unit: Option<String>,
    pub visible: bool,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            filter: FilterKind::None,
            spectral_filter: None,
            math_phase: MathPhase::None,
            math_output: MathOutput::Magnitude,
            fft_window: FftWindow::Hann,
            trigger_mode: TriggerMode::None,
            trigger_value: 0.0,
            pre_trigger: 0,
            zoom: 1.0,
            pan: 0.0,
            paint_mode: PaintMode::Line,
            window: SampleWindow::default(),
            unit: None,
            visible: true,
        }
    }
}

impl ViewSettings {
    /// Strongest invalidation needed after moving from `old` to `self`.
    pub fn change_level(&self, old: &ViewSettings) -> Option<InvalidateLevel> {
        use InvalidateLevel::*;
        let mut level: Option<InvalidateLevel> = None;
        let mut raise = |l: InvalidateLevel| {
            level = Some(level.map_or(l, |cur| cur.stronger(l)));
        };

        if self.filter != old.filter || self.spectral_filter != old.spectral_filter || self.window != old.window {
            raise(BeforeZoom);
        }
        if self.math_phase != old.math_phase {
            if self.math_phase == MathPhase::BeforeZoom || old.math_phase == MathPhase::BeforeZoom {
                raise(BeforeZoom);
            } else {
                raise(AfterZoom);
            }
        }
        if self.math_output != old.math_output || self.fft_window != old.fft_window {
            match self.math_phase {
                MathPhase::BeforeZoom => raise(BeforeZoom),
                MathPhase::AfterZoom => raise(AfterZoom),
                MathPhase::None => {}
            }
        }
        if self.trigger_mode != old.trigger_mode
            || self.trigger_value != old.trigger_value
            || self.pre_trigger != old.pre_trigger
            || self.zoom != old.zoom
            || self.pan != old.pan
        {
            raise(AfterZoom);
        }
        if self.paint_mode != old.paint_mode {
            if self.paint_mode.holds_peaks() != old.paint_mode.holds_peaks() {
                // the accumulator needs a pass at its accumulation point
                raise(if self.math_phase == MathPhase::BeforeZoom { BeforeZoom } else { AfterZoom });
            } else {
                raise(Projection);
            }
        }
        if self.unit != old.unit || self.visible != old.visible {
            raise(Projection);
        }
        level
    }

    /// Peak envelope loses its meaning when leaving hold mode or changing the math.
    fn resets_peaks(&self, old: &ViewSettings) -> bool {
        (old.paint_mode.holds_peaks() && !self.paint_mode.holds_peaks())
            || self.math_phase != old.math_phase
            || self.math_output != old.math_output
            || (self.math_phase != MathPhase::None && self.fft_window != old.fft_window)
    }

    /// No transform configured: the raw buffer is the before-zoom result.
    pub fn renders_directly(&self) -> bool {
        self.filter.is_none()
            && self.spectral_filter.is_none()
            && self.math_phase == MathPhase::None
            && self.window.is_identity()
    }

    fn value_unit(&self) -> Option<&str> {
        if self.math_phase != MathPhase::None {
            let unit = self.math_output.unit();
            return (!unit.is_empty()).then_some(unit);
        }
        self.unit.as_deref()
    }
}

/// Min/max envelope aligned with `drawn`.
#[derive(Debug, Clone, PartialEq)]
pub struct PeakEnvelope {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

/// What the renderer paints for one view.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionSnapshot {
    pub drawn: Option<Samples>,
    pub drawn_start: usize,
    /// `true` if the drawn samples changed since the previous snapshot.
    pub recalculated: bool,
    pub peak: Option<PeakEnvelope>,
}

/// A callback this view registered somewhere else.
enum Subscription {
    Samples(Arc<SampleBuffer>, ListenerId),
    Settings(Weak<View>, ListenerId),
}

impl Subscription {
    fn release(self) {
        match self {
            Subscription::Samples(buffer, id) => {
                buffer.remove_samples_listener(id);
            }
            Subscription::Settings(view, id) => {
                if let Some(view) = view.upgrade() {
                    view.remove_settings_listener(id);
                }
            }
        }
    }
}

enum TriggerInput {
    Own,
    SameBuffer(ViewId),
    Other(Option<Samples>),
}

/// One bound, independently configured display of a sample buffer.
pub struct View {
    id: ViewId,
    name: String,
    buffer: Arc<SampleBuffer>,
    composite: Option<Composite>,
    settings: RwLock<ViewSettings>,
    painter: RwLock<PaintStrategy>,
    trigger_source: RwLock<Option<Arc<View>>>,
    flags: DirtyFlags,
    closed: AtomicBool,
    notifying: AtomicBool,
    pending_notify: AtomicU8,
    listeners: ListenerList<SettingsChanged>,
    subscriptions: Mutex<Vec<Subscription>>,
    /// Watch on the trigger source's buffer, when it differs from ours.
    trigger_watch: Mutex<Option<Subscription>>,
}

impl std::fmt::Debug for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("View")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("buffer", &self.buffer.name())
            .field("composite", &self.composite.is_some())
            .finish()
    }
}

struct NotifyGuard<'a>(&'a AtomicBool);

impl Drop for NotifyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl View {
    pub fn new(name: impl Into<String>, buffer: Arc<SampleBuffer>) -> Arc<View> {
        Self::with_settings(name, buffer, ViewSettings::default())
    }

    pub fn with_settings(name: impl Into<String>, buffer: Arc<SampleBuffer>, settings: ViewSettings) -> Arc<View> {
        let view = Arc::new(Self::build(name.into(), buffer, None, settings));
        let watch = view.watch_buffer(&view.buffer);
        view.keep(watch);
        view
    }

    /// Derived view combining the before-zoom results of `sources`.
    ///
    /// Its cache lives in a private buffer; it is invalidated whenever a
    /// source's buffer or before-zoom settings change.
    pub fn composite(name: impl Into<String>, kind: CompositeKind, sources: Vec<Arc<View>>) -> Arc<View> {
        let name = name.into();
        let rate = sources.first().map_or(1.0, |s| s.buffer.sample_rate_hz());
        let buffer = SampleBuffer::new(name.clone(), rate);
        let composite = Composite { kind, sources: sources.clone() };
        let view = Arc::new(Self::build(name, buffer, Some(composite), ViewSettings::default()));
        for source in &sources {
            let watch = view.watch_buffer(&source.buffer);
            view.keep(watch);
            let weak = Arc::downgrade(&view);
            let id = source.on_settings_changed(Arc::new(move |_: &View, level: InvalidateLevel| {
                if level == InvalidateLevel::Projection {
                    return;
                }
                if let Some(v) = weak.upgrade() {
                    v.invalidate(InvalidateLevel::BeforeZoom);
                }
            }));
            view.keep(Subscription::Settings(Arc::downgrade(source), id));
        }
        view
    }

    fn build(name: String, buffer: Arc<SampleBuffer>, composite: Option<Composite>, settings: ViewSettings) -> Self {
        Self {
            id: NEXT_VIEW_ID.fetch_add(1, Ordering::Relaxed),
            name,
            buffer,
            composite,
            painter: RwLock::new(PaintStrategy::for_mode(settings.paint_mode)),
            settings: RwLock::new(settings),
            trigger_source: RwLock::new(None),
            flags: DirtyFlags::default(),
            closed: AtomicBool::new(false),
            notifying: AtomicBool::new(false),
            pending_notify: AtomicU8::new(0),
            listeners: ListenerList::default(),
            subscriptions: Mutex::new(Vec::new()),
            trigger_watch: Mutex::new(None),
        }
    }

    /// Invalidate before-zoom whenever `buffer` changes.
    fn watch_buffer(self: &Arc<Self>, buffer: &Arc<SampleBuffer>) -> Subscription {
        let weak = Arc::downgrade(self);
        let id = buffer.on_samples_changed(Arc::new(move |_| {
            if let Some(view) = weak.upgrade() {
                view.invalidate(InvalidateLevel::BeforeZoom);
            }
        }));
        Subscription::Samples(buffer.clone(), id)
    }

    fn keep(&self, subscription: Subscription) {
        self.subscriptions.lock().unwrap_or_else(|p| p.into_inner()).push(subscription);
    }

    /// Unregister everything this view registered on buffers and other views.
    fn release_subscriptions(&self) {
        let mut released = std::mem::take(&mut *self.subscriptions.lock().unwrap_or_else(|p| p.into_inner()));
        released.extend(self.trigger_watch.lock().unwrap_or_else(|p| p.into_inner()).take());
        for subscription in released {
            subscription.release();
        }
    }

    pub fn id(&self) -> ViewId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buffer(&self) -> &Arc<SampleBuffer> {
        &self.buffer
    }

    pub fn flags(&self) -> &DirtyFlags {
        &self.flags
    }

    pub fn is_composite(&self) -> bool {
        self.composite.is_some()
    }

    pub fn composite_kind(&self) -> Option<CompositeKind> {
        self.composite.as_ref().map(|c| c.kind)
    }

    pub fn composite_sources(&self) -> Vec<Arc<View>> {
        self.composite.as_ref().map(|c| c.sources.clone()).unwrap_or_default()
    }

    /// `true` for a derived view whose sources all have samples.
    pub fn composite_sources_ready(&self) -> bool {
        self.composite.as_ref().is_some_and(|c| c.sources_have_data())
    }

    fn settings_read(&self) -> RwLockReadGuard<'_, ViewSettings> {
        self.settings.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn settings(&self) -> ViewSettings {
        self.settings_read().clone()
    }

    pub fn is_visible(&self) -> bool {
        self.settings_read().visible
    }

    /// Drawing strategy, selected when the paint mode last changed.
    pub fn painter(&self) -> PaintStrategy {
        *self.painter.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply a settings change and invalidate the stages it affects.
    pub fn update(&self, change: impl FnOnce(&mut ViewSettings)) {
        if self.is_closed() {
            return;
        }
        let (old, new) = {
            let mut settings = self.settings.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            let old = settings.clone();
            change(&mut settings);
            (old, settings.clone())
        };
        let Some(level) = new.change_level(&old) else { return };

        if new.resets_peaks(&old) {
            self.buffer.lock().cache_mut(self.id).peak_mut().clear();
        }
        if new.paint_mode != old.paint_mode {
            *self.painter.write().unwrap_or_else(|poisoned| poisoned.into_inner()) =
                PaintStrategy::for_mode(new.paint_mode);
        }
        log::debug!("view '{}': settings changed ({:?})", self.name, level);
        self.invalidate(level);
        self.notify_settings_changed(level);
    }

    pub fn set_zoom_pan(&self, zoom: f64, pan: f64) {
        self.update(|s| {
            s.zoom = zoom.clamp(f64::MIN_POSITIVE, 1.0);
            s.pan = pan.clamp(0.0, 1.0);
        });
    }

    pub fn set_trigger(&self, mode: TriggerMode, value: f64, pre_trigger: usize) {
        self.update(|s| {
            s.trigger_mode = mode;
            s.trigger_value = value;
            s.pre_trigger = pre_trigger;
        });
    }

    pub fn set_filter(&self, filter: FilterKind) {
        self.update(|s| s.filter = filter);
    }

    pub fn set_spectral_filter(&self, filter: Option<SpectralFilter>) {
        self.update(|s| s.spectral_filter = filter);
    }

    pub fn set_math(&self, phase: MathPhase, output: MathOutput) {
        self.update(|s| {
            s.math_phase = phase;
            s.math_output = output;
        });
    }

    pub fn set_paint_mode(&self, mode: PaintMode) {
        self.update(|s| s.paint_mode = mode);
    }

    pub fn set_window(&self, window: SampleWindow) {
        self.update(|s| s.window = window);
    }

    pub fn set_visible(&self, visible: bool) {
        self.update(|s| s.visible = visible);
    }

    /// Trigger off another view's before-zoom samples (`None`: own samples).
    pub fn set_trigger_source(self: &Arc<Self>, source: Option<&Arc<View>>) {
        if self.is_closed() {
            return;
        }
        let source = source.filter(|s| s.id != self.id).cloned();
        let watch = source
            .as_ref()
            .filter(|src| !Arc::ptr_eq(&src.buffer, &self.buffer))
            .map(|src| self.watch_buffer(&src.buffer));
        let previous = std::mem::replace(&mut *self.trigger_watch.lock().unwrap_or_else(|p| p.into_inner()), watch);
        if let Some(previous) = previous {
            previous.release();
        }
        *self.trigger_source.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = source;
        // the snapshot belongs to the previous source
        self.buffer.lock().cache_mut(self.id).trigger_snapshot = None;
        self.invalidate(InvalidateLevel::AfterZoom);
        self.notify_settings_changed(InvalidateLevel::AfterZoom);
    }

    pub fn trigger_source(&self) -> Option<Arc<View>> {
        self.trigger_source.read().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }

    pub fn on_settings_changed(&self, callback: SettingsChanged) -> ListenerId {
        self.listeners.add(callback)
    }

    pub fn remove_settings_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn settings_listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Notify listeners; a change made from inside a listener is folded
    /// into a bounded number of extra rounds instead of recursing.
    fn notify_settings_changed(&self, level: InvalidateLevel) {
        self.pending_notify.fetch_max(level.rank(), Ordering::AcqRel);
        if self.notifying.swap(true, Ordering::AcqRel) {
            log::trace!("view '{}': nested settings change queued", self.name);
            return;
        }
        let _guard = NotifyGuard(&self.notifying);
        for _ in 0..MAX_NOTIFY_ROUNDS {
            let Some(level) = InvalidateLevel::from_rank(self.pending_notify.swap(0, Ordering::AcqRel)) else {
                return;
            };
            let listeners = self.listeners.snapshot();
            for listener in &listeners {
                listener(self, level);
            }
        }
        if self.pending_notify.swap(0, Ordering::AcqRel) != 0 {
            log::warn!("view '{}': settings change chain cut after {} rounds", self.name, MAX_NOTIFY_ROUNDS);
        }
    }

    pub fn invalidate(&self, level: InvalidateLevel) {
        self.flags.mark(level);
    }

    /// Bring the cache up to date. No-op when nothing is dirty.
    pub fn calculate(&self) {
        if self.is_closed() || self.flags.is_calculated() {
            return;
        }
        let settings = self.settings();
        let ran_before = self.flags.take_before_zoom();

        // Other views' DataLocks are taken (one at a time) before our own.
        let composite_raw = if ran_before {
            self.composite.as_ref().map(|c| c.gather())
        } else {
            None
        };
        let trigger_input = self.trigger_input();

        let ctx = StageContext {
            view: &self.name,
            settings: &settings,
            sample_rate_hz: self.buffer.sample_rate_hz(),
        };
        let mut data = self.buffer.lock();

        if composite_raw == Some(None) {
            // a source has no input yet: draw nothing and retry next pass
            let cache = data.cache_mut(self.id);
            if cache.drawn.is_some() {
                self.flags.mark(InvalidateLevel::Projection);
            }
            cache.clear();
            self.flags.mark(InvalidateLevel::BeforeZoom);
            log::trace!("view '{}': waiting for composite sources", self.name);
            return;
        }

        if ran_before {
            let raw = match composite_raw.flatten() {
                Some(raw) => adjust_window(&raw, &settings.window),
                None => adjust_window(&data.interpolated(), &settings.window),
            };
            pipeline::before_zoom(&ctx, raw, data.cache_mut(self.id));
            self.flags.mark(InvalidateLevel::AfterZoom);
        }

        if self.flags.take_after_zoom() {
            let trigger = match trigger_input {
                TriggerInput::Own => TriggerSamples::Own,
                TriggerInput::SameBuffer(source) => {
                    let fresh = data.cache(source).and_then(|c| c.calculated_before_zoom.clone());
                    refresh_trigger_snapshot(data.cache_mut(self.id), fresh, ran_before)
                }
                TriggerInput::Other(fresh) => refresh_trigger_snapshot(data.cache_mut(self.id), fresh, ran_before),
            };
            if pipeline::after_zoom(&ctx, trigger, data.cache_mut(self.id)) {
                self.flags.mark(InvalidateLevel::Projection);
            }
        }
    }

    fn trigger_input(&self) -> TriggerInput {
        match self.trigger_source() {
            Some(source) if Arc::ptr_eq(&source.buffer, &self.buffer) => TriggerInput::SameBuffer(source.id),
            Some(source) => TriggerInput::Other(source.before_zoom_snapshot()),
            None => TriggerInput::Own,
        }
    }

    /// Read-and-clear the projection flag together with the drawn samples.
    pub fn snapshot_projection(&self) -> ProjectionSnapshot {
        let settings = self.settings();
        let data = self.buffer.lock();
        let recalculated = self.flags.take_projection();
        let Some(cache) = data.cache(self.id) else {
            return ProjectionSnapshot { drawn: None, drawn_start: 0, recalculated, peak: None };
        };

        let peak = if settings.paint_mode.holds_peaks() && !cache.peak().is_empty() {
            let offset = if settings.math_phase == MathPhase::BeforeZoom { cache.drawn_start } else { 0 };
            let len = cache.drawn.as_ref().map_or(0, |d| d.len());
            let (min, max) = (cache.peak().min(), cache.peak().max());
            let end = (offset + len).min(min.len());
            let start = offset.min(end);
            Some(PeakEnvelope { min: min[start..end].to_vec(), max: max[start..end].to_vec() })
        } else {
            None
        };

        ProjectionSnapshot {
            drawn: cache.drawn.clone(),
            drawn_start: cache.drawn_start,
            recalculated,
            peak,
        }
    }

    /// Current before-zoom result, read under the DataLock.
    pub fn before_zoom_snapshot(&self) -> Option<Samples> {
        self.buffer.lock().cache(self.id).and_then(|c| c.calculated_before_zoom.clone())
    }

    /// What a derived view reads from this view.
    pub fn composite_input(&self) -> Option<Samples> {
        if self.renders_directly() {
            let samples = self.buffer.interpolated_samples();
            (!samples.is_empty()).then(|| Arc::new(samples))
        } else {
            self.before_zoom_snapshot()
        }
    }

    /// Raw buffer samples are usable as-is (no transform, not derived).
    pub fn renders_directly(&self) -> bool {
        self.composite.is_none() && self.settings_read().renders_directly()
    }

    pub fn has_data(&self) -> bool {
        if self.renders_directly() {
            self.buffer.sample_count() > 0
        } else {
            self.buffer.lock().cache(self.id).is_some_and(|c| c.has_data())
        }
    }

    /// Horizontal extent of the drawn samples.
    pub fn drawn_extents(&self) -> Option<DrawnExtents> {
        let phase = self.settings_read().math_phase;
        let rate = self.buffer.sample_rate_hz();
        let data = self.buffer.lock();
        let cache = data.cache(self.id)?;
        let drawn = cache.drawn.as_ref().filter(|d| !d.is_empty())?;
        let left_index = cache.drawn_start;
        let right_index = cache.drawn_start + cache.drawn_span.max(1) - 1;

        let extents = match cache.spectrum_width {
            Some(width) => {
                let first_bin = if phase == MathPhase::BeforeZoom { cache.drawn_start } else { 0 };
                DrawnExtents {
                    left_index,
                    right_index,
                    left_value: bin_frequency(first_bin, width, rate),
                    right_value: bin_frequency(first_bin + drawn.len() - 1, width, rate),
                    unit: "Hz",
                }
            }
            None => DrawnExtents {
                left_index,
                right_index,
                left_value: left_index as f64 / rate,
                right_value: right_index as f64 / rate,
                unit: "s",
            },
        };
        Some(extents)
    }

    /// Tooltip text for a hover at `position` (0 = left edge, 1 = right edge).
    pub fn hover_statistics(&self, position: f64) -> String {
        let settings = self.settings();
        let snapshot = self.peek_drawn();
        let (Some(drawn), Some(extents)) = (snapshot, self.drawn_extents()) else {
            return format!("{}: no data", self.name);
        };
        let Some(stats) = TraceStats::of(&drawn) else {
            return format!("{}: no finite samples", self.name);
        };
        let last = drawn.len() - 1;
        let idx = (position.clamp(0.0, 1.0) * last as f64).round() as usize;
        let x = if last == 0 {
            extents.left_value
        } else {
            extents.left_value + (extents.right_value - extents.left_value) * idx as f64 / last as f64
        };
        let unit = settings.value_unit();
        format!(
            "{} @ {}: {} (min {}, max {}, mean {}, rms {})",
            self.name,
            format_value(x, Some(extents.unit)),
            format_value(drawn[idx], unit),
            format_value(stats.min, unit),
            format_value(stats.max, unit),
            format_value(stats.mean, unit),
            format_value(stats.rms, unit),
        )
    }

    /// One-line status text describing what is drawn and how.
    pub fn click_summary(&self) -> String {
        let settings = self.settings();
        let trigger_found = self.buffer.lock().cache(self.id).is_some_and(|c| c.trigger_found());
        let mut s = match (self.peek_drawn(), self.drawn_extents()) {
            (Some(drawn), Some(e)) => format!(
                "{}: {} samples [{}..{}] ({:.4} to {:.4} {})",
                self.name,
                drawn.len(),
                e.left_index,
                e.right_index,
                e.left_value,
                e.right_value,
                e.unit
            ),
            _ => format!("{}: no data", self.name),
        };
        if settings.trigger_mode != TriggerMode::None {
            let state = if trigger_found { "triggered" } else { "waiting" };
            s.push_str(&format!(
                "; trigger {} @ {} ({})",
                settings.trigger_mode.label(),
                format_value(settings.trigger_value, settings.unit.as_deref()),
                state
            ));
            if let Some(source) = self.trigger_source() {
                s.push_str(&format!(" from {}", source.name()));
            }
        }
        if let Some(composite) = &self.composite {
            s.push_str(&format!("; = {}", composite.describe()));
        }
        if !settings.filter.is_none() {
            s.push_str(&format!("; filter {}", settings.filter.describe()));
        }
        if let Some(spectral) = settings.spectral_filter {
            s.push_str(&format!("; {}", spectral.describe()));
        }
        if settings.math_phase != MathPhase::None {
            s.push_str(&format!("; FFT {:?} {:?} ({})", settings.math_output, settings.math_phase, settings.fft_window.label()));
        }
        s
    }

    fn peek_drawn(&self) -> Option<Samples> {
        self.buffer.lock().cache(self.id).and_then(|c| c.drawn.clone())
    }

    /// Drop the cache and every registration; the view never calculates again.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.release_subscriptions();
        self.buffer.lock().remove_cache(self.id);
        log::debug!("view '{}' closed", self.name);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.release_subscriptions();
        self.buffer.lock().remove_cache(self.id);
    }
}

fn refresh_trigger_snapshot(cache: &mut CalculationCache, fresh: Option<Samples>, new_generation: bool) -> TriggerSamples {
    if new_generation || cache.trigger_snapshot.is_none() {
        cache.trigger_snapshot = fresh;
    }
    TriggerSamples::External(cache.trigger_snapshot.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_change_is_after_zoom_only() {
        let old = ViewSettings::default();
        let new = ViewSettings { zoom: 0.5, ..Default::default() };
        assert_eq!(new.change_level(&old), Some(InvalidateLevel::AfterZoom));
    }

    #[test]
    fn filter_change_dominates() {
        let old = ViewSettings::default();
        let new = ViewSettings { zoom: 0.5, filter: FilterKind::MovingAverage { taps: 3 }, ..Default::default() };
        assert_eq!(new.change_level(&old), Some(InvalidateLevel::BeforeZoom));
    }

    #[test]
    fn cosmetic_changes_only_project() {
        let old = ViewSettings::default();
        let new = ViewSettings { paint_mode: PaintMode::Dots, unit: Some("V".into()), ..Default::default() };
        assert_eq!(new.change_level(&old), Some(InvalidateLevel::Projection));
        assert_eq!(old.change_level(&old.clone()), None);
    }

    #[test]
    fn leaving_peak_hold_resets_peaks() {
        let hold = ViewSettings { paint_mode: PaintMode::PeakHold, ..Default::default() };
        let line = ViewSettings::default();
        assert!(line.resets_peaks(&hold));
        assert!(!hold.resets_peaks(&line));
        let fft = ViewSettings { math_phase: MathPhase::AfterZoom, ..hold.clone() };
        assert!(fft.resets_peaks(&hold));
    }

    #[test]
    fn fft_window_change_resets_peaks_only_with_math() {
        let hold = ViewSettings { paint_mode: PaintMode::PeakHold, ..Default::default() };
        let rect = ViewSettings { fft_window: FftWindow::Rect, ..hold.clone() };
        assert!(!rect.resets_peaks(&hold));

        let spectrum = ViewSettings { math_phase: MathPhase::BeforeZoom, ..hold };
        let rect = ViewSettings { fft_window: FftWindow::Rect, ..spectrum.clone() };
        assert!(rect.resets_peaks(&spectrum));
    }

    #[test]
    fn math_output_change_depends_on_phase() {
        let old = ViewSettings::default();
        let new = ViewSettings { math_output: MathOutput::Phase, ..Default::default() };
        assert_eq!(new.change_level(&old), None);
        let old = ViewSettings { math_phase: MathPhase::AfterZoom, ..Default::default() };
        let new = ViewSettings { math_output: MathOutput::Phase, ..old.clone() };
        assert_eq!(new.change_level(&old), Some(InvalidateLevel::AfterZoom));
    }
}
