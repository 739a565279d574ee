use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scopeview::data::view::PeakEnvelope;
use scopeview::{
    CompositeKind, FilterKind, InvalidateLevel, MathOutput, MathPhase, PaintMode, SampleBuffer, SampleWindow,
    TriggerMode, View,
};

fn drawn(view: &View) -> Option<Vec<f64>> {
    view.snapshot_projection().drawn.map(|d| d.to_vec())
}

fn generation(view: &View) -> u64 {
    view.buffer()
        .lock()
        .cache(view.id())
        .map_or(0, |c| c.before_zoom_generation())
}

#[test]
fn drawn_follows_adjusted_sample_count() {
    let buffer = SampleBuffer::new("ch1", 100.0);
    let view = View::new("ch1", buffer.clone());

    view.calculate();
    assert!(view.flags().is_calculated());
    assert_eq!(drawn(&view), None);

    buffer.append(&[1.0, 2.0, 3.0]);
    assert!(!view.flags().is_calculated());
    view.calculate();
    assert_eq!(drawn(&view), Some(vec![1.0, 2.0, 3.0]));

    // window past the end of the buffer leaves nothing to draw
    view.set_window(SampleWindow { offset: 10, ..Default::default() });
    view.calculate();
    assert_eq!(drawn(&view), None);

    view.set_window(SampleWindow { offset: -1, length: Some(2), ..Default::default() });
    view.calculate();
    assert_eq!(drawn(&view), Some(vec![0.0, 1.0]));
}

#[test]
fn manual_trigger_freezes_until_edge() {
    let buffer = SampleBuffer::new("ch1", 1.0);
    buffer.append(&[0.0, 0.0, 0.0]);
    let view = View::new("ch1", buffer.clone());
    view.set_trigger(TriggerMode::Rising, 0.5, 0);
    view.calculate();
    assert_eq!(drawn(&view), None);
    assert!(view.flags().is_calculated());

    buffer.replace(vec![0.0, 0.0, 1.0, 2.0]);
    view.calculate();
    assert_eq!(drawn(&view), Some(vec![1.0, 2.0]));

    // no edge in the new generation: the last triggered trace stays
    view.set_zoom_pan(1.0, 0.0);
    view.set_trigger(TriggerMode::Rising, 5.0, 0);
    view.calculate();
    let snap = view.snapshot_projection();
    assert!(!snap.recalculated);
    assert_eq!(snap.drawn.map(|d| d.to_vec()), Some(vec![1.0, 2.0]));
}

#[test]
fn second_snapshot_is_not_recalculated() {
    let buffer = SampleBuffer::new("ch1", 1.0);
    buffer.append(&[4.0, 5.0, 6.0]);
    let view = View::new("ch1", buffer);
    view.calculate();

    let first = view.snapshot_projection();
    let second = view.snapshot_projection();
    assert!(first.recalculated);
    assert!(!second.recalculated);
    assert_eq!(first.drawn, second.drawn);
    assert_eq!(first.drawn_start, second.drawn_start);

    // nothing dirty: calculate is a no-op
    view.calculate();
    assert!(!view.snapshot_projection().recalculated);
}

#[test]
fn rising_auto_trigger_with_pre_trigger() {
    let buffer = SampleBuffer::new("ch1", 1.0);
    buffer.append(&[0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]);
    let view = View::new("ch1", buffer);
    view.set_trigger(TriggerMode::RisingAuto, 0.5, 1);
    view.calculate();

    let snap = view.snapshot_projection();
    assert_eq!(snap.drawn_start, 1);
    assert_eq!(snap.drawn.map(|d| d.to_vec()), Some(vec![0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]));
    assert!(view.click_summary().contains("triggered"));
}

#[test]
fn zoom_reuses_before_zoom_result() {
    let buffer = SampleBuffer::new("ch1", 10.0);
    buffer.append(&(0..100).map(f64::from).collect::<Vec<_>>());
    let view = View::new("ch1", buffer);
    view.calculate();
    let snap = view.snapshot_projection();
    assert_eq!(snap.drawn_start, 0);
    assert_eq!(snap.drawn.map(|d| d.len()), Some(100));
    let before = generation(&view);

    view.set_zoom_pan(0.5, 0.0);
    assert!(!view.flags().before_zoom_required());
    assert!(view.flags().after_zoom_required());
    view.calculate();
    assert_eq!(drawn(&view).map(|d| d.len()), Some(50));
    assert_eq!(generation(&view), before);

    let extents = view.drawn_extents().unwrap();
    assert_eq!((extents.left_index, extents.right_index), (0, 49));
    assert_eq!(extents.unit, "s");
    assert!((extents.right_value - 4.9).abs() < 1e-9);
}

#[test]
fn peak_hold_spans_passes_and_resets_on_mode_toggle() {
    let buffer = SampleBuffer::new("ch1", 1.0);
    let view = View::new("ch1", buffer.clone());
    view.set_paint_mode(PaintMode::PeakHold);

    for samples in [vec![1.0, 2.0, 3.0], vec![2.0, 1.0, 4.0], vec![3.0, 0.0, 5.0]] {
        buffer.replace(samples);
        view.calculate();
    }
    let snap = view.snapshot_projection();
    assert_eq!(
        snap.peak,
        Some(PeakEnvelope { min: vec![1.0, 0.0, 3.0], max: vec![3.0, 2.0, 5.0] })
    );

    view.set_paint_mode(PaintMode::Line);
    view.calculate();
    assert_eq!(view.snapshot_projection().peak, None);
    assert!(buffer.lock().cache(view.id()).unwrap().peak().is_empty());

    view.set_paint_mode(PaintMode::PeakHold);
    view.calculate();
    let peak = view.snapshot_projection().peak.unwrap();
    assert_eq!(peak.max, vec![3.0, 0.0, 5.0]);
    assert_eq!(buffer.lock().cache(view.id()).unwrap().peak().passes(), 1);
}

#[test]
fn trigger_source_on_another_buffer() {
    let clock = SampleBuffer::new("clock", 1.0);
    clock.append(&[0.0, 0.0, 0.0, 1.0, 1.0]);
    let data = SampleBuffer::new("data", 1.0);
    data.append(&[10.0, 11.0, 12.0, 13.0, 14.0]);

    let source = View::new("clock", clock.clone());
    let follower = View::new("data", data);
    follower.set_trigger_source(Some(&source));
    follower.set_trigger(TriggerMode::Rising, 0.5, 0);

    source.calculate();
    follower.calculate();
    let snap = follower.snapshot_projection();
    assert_eq!(snap.drawn_start, 3);
    assert_eq!(snap.drawn.map(|d| d.to_vec()), Some(vec![13.0, 14.0]));

    // a new clock generation re-positions the follower
    clock.replace(vec![0.0, 1.0, 1.0, 1.0, 1.0]);
    assert!(follower.flags().before_zoom_required());
    source.calculate();
    follower.calculate();
    assert_eq!(follower.snapshot_projection().drawn_start, 1);
}

#[test]
fn composite_combines_sources() {
    let a = SampleBuffer::new("a", 1.0);
    let b = SampleBuffer::new("b", 1.0);
    a.append(&[1.0, 2.0, 3.0]);
    b.append(&[10.0, 20.0]);
    let va = View::new("a", a.clone());
    let vb = View::new("b", b);
    let sum = View::composite("a+b", CompositeKind::Sum, vec![va.clone(), vb.clone()]);

    va.calculate();
    vb.calculate();
    sum.calculate();
    assert_eq!(drawn(&sum), Some(vec![11.0, 22.0]));
    assert!(sum.click_summary().contains("a + b"));

    a.replace(vec![0.0, 0.0, 0.0]);
    assert!(sum.flags().before_zoom_required());
    va.calculate();
    sum.calculate();
    assert_eq!(drawn(&sum), Some(vec![10.0, 20.0]));

    // a filtered source contributes its before-zoom result
    va.set_filter(FilterKind::MovingAverage { taps: 1 });
    assert!(sum.flags().before_zoom_required());
    va.calculate();
    sum.calculate();
    assert_eq!(drawn(&sum), Some(vec![10.0, 20.0]));
}

#[test]
fn fft_before_zoom_draws_spectrum() {
    let buffer = SampleBuffer::new("sine", 64.0);
    let samples: Vec<f64> = (0..64)
        .map(|i| (2.0 * std::f64::consts::PI * 4.0 * i as f64 / 64.0).sin())
        .collect();
    buffer.append(&samples);
    let view = View::new("sine", buffer);
    view.set_math(MathPhase::BeforeZoom, MathOutput::Magnitude);
    view.calculate();

    let spectrum = drawn(&view).unwrap();
    assert_eq!(spectrum.len(), 32);
    let peak_bin = spectrum
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i);
    assert_eq!(peak_bin, Some(4));

    let extents = view.drawn_extents().unwrap();
    assert_eq!(extents.unit, "Hz");
    assert_eq!(extents.left_value, 0.0);
    assert_eq!(extents.right_value, 31.0);
    assert!(view.hover_statistics(0.0).contains("0.0000 Hz"));
}

#[test]
fn nested_settings_changes_are_bounded() {
    let view = View::new("ch1", SampleBuffer::new("ch1", 1.0));
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    view.on_settings_changed(Arc::new(move |v: &View, level: InvalidateLevel| {
        assert_eq!(level, InvalidateLevel::AfterZoom);
        counter.fetch_add(1, Ordering::SeqCst);
        let zoom = v.settings().zoom;
        v.set_zoom_pan(zoom * 0.5, 0.0);
    }));
    view.set_zoom_pan(0.5, 0.0);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[test]
fn closed_view_stops_calculating() {
    let buffer = SampleBuffer::new("ch1", 1.0);
    buffer.append(&[1.0]);
    let view = View::new("ch1", buffer.clone());
    view.calculate();
    view.close();
    buffer.append(&[2.0]);
    view.calculate();
    assert!(view.is_closed());
    assert_eq!(drawn(&view), None);
    assert!(buffer.lock().cache(view.id()).is_none());
}

#[test]
fn hover_text_reports_statistics() {
    let buffer = SampleBuffer::new("ch1", 2.0);
    buffer.append(&[-1.0, 1.0, -1.0, 1.0]);
    let view = View::new("ch1", buffer);
    view.update(|s| s.unit = Some("V".into()));
    view.calculate();
    let text = view.hover_statistics(1.0);
    assert!(text.starts_with("ch1 @ 1.5000 s: 1.0000 V"), "{text}");
    assert!(text.contains("mean 0.0000 V"));
    assert!(text.contains("rms 1.0000 V"));
}

#[test]
fn listeners_are_released_on_close_drop_and_source_switch() {
    let clock = SampleBuffer::new("clock", 1.0);
    let data = SampleBuffer::new("data", 1.0);
    let source = View::new("clock", clock.clone());
    let follower = View::new("data", data.clone());
    assert_eq!((clock.listener_count(), data.listener_count()), (1, 1));

    for _ in 0..100 {
        follower.set_trigger_source(Some(&source));
        follower.set_trigger_source(None);
    }
    assert_eq!(clock.listener_count(), 1);
    follower.set_trigger_source(Some(&source));
    assert_eq!(clock.listener_count(), 2);

    for _ in 0..100 {
        View::new("closed", data.clone()).close();
        drop(View::new("dropped", data.clone()));
    }
    assert_eq!(data.listener_count(), 1);

    let sum = View::composite("sum", CompositeKind::Sum, vec![source.clone(), follower.clone()]);
    assert_eq!(source.settings_listener_count(), 1);
    assert_eq!((clock.listener_count(), data.listener_count()), (3, 2));
    drop(sum);
    assert_eq!(source.settings_listener_count(), 0);
    assert_eq!(follower.settings_listener_count(), 0);
    assert_eq!((clock.listener_count(), data.listener_count()), (2, 1));

    follower.close();
    assert_eq!((clock.listener_count(), data.listener_count()), (1, 0));
}

#[test]
fn closed_view_ignores_later_edits() {
    let buffer = SampleBuffer::new("ch1", 1.0);
    buffer.append(&[1.0, 2.0]);
    let view = View::new("ch1", buffer.clone());
    let other = View::new("other", SampleBuffer::new("other", 1.0));
    view.set_paint_mode(PaintMode::PeakHold);
    view.calculate();
    view.close();

    // leaving peak hold would clear the envelope; the cache must stay gone
    view.set_paint_mode(PaintMode::Line);
    view.set_trigger_source(Some(&other));
    assert!(buffer.lock().cache(view.id()).is_none());
    assert!(view.trigger_source().is_none());
    assert_eq!(view.settings().paint_mode, PaintMode::PeakHold);
}

#[test]
fn changing_fft_window_clears_spectrum_peaks() {
    let buffer = SampleBuffer::new("sine", 16.0);
    let samples: Vec<f64> = (0..16).map(|i| (i as f64 * 0.7).sin()).collect();
    buffer.append(&samples);
    let view = View::new("sine", buffer.clone());
    view.set_math(MathPhase::BeforeZoom, MathOutput::Magnitude);
    view.set_paint_mode(PaintMode::PeakHold);
    view.calculate();
    assert_eq!(buffer.lock().cache(view.id()).unwrap().peak().passes(), 1);

    view.update(|s| s.fft_window = scopeview::FftWindow::Rect);
    assert!(buffer.lock().cache(view.id()).unwrap().peak().is_empty());
    view.calculate();
    assert_eq!(buffer.lock().cache(view.id()).unwrap().peak().passes(), 1);
}
