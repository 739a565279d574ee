use std::sync::Arc;

use scopeview::{CompositeKind, DependencyScheduler, PaintMode, SampleBuffer, Tier, TriggerMode, View};

struct Scene {
    a: Arc<SampleBuffer>,
    b: Arc<SampleBuffer>,
    va: Arc<View>,
    vb: Arc<View>,
    follower: Arc<View>,
    sum: Arc<View>,
}

impl Scene {
    fn new() -> Self {
        let a = SampleBuffer::new("a", 1.0);
        let b = SampleBuffer::new("b", 1.0);
        let c = SampleBuffer::new("c", 1.0);
        c.append(&[5.0, 6.0, 7.0, 8.0]);
        let va = View::new("a", a.clone());
        let vb = View::new("b", b.clone());
        let follower = View::new("c", c);
        follower.set_trigger_source(Some(&va));
        follower.set_trigger(TriggerMode::RisingAuto, 0.5, 0);
        let sum = View::composite("a+b", CompositeKind::Sum, vec![va.clone(), vb.clone()]);
        Scene { a, b, va, vb, follower, sum }
    }

    fn views(&self) -> Vec<Arc<View>> {
        // deliberately listed out of dependency order
        vec![self.sum.clone(), self.follower.clone(), self.vb.clone(), self.va.clone()]
    }
}

#[test]
fn composite_with_empty_sources_is_deferred() {
    let scene = Scene::new();
    let scheduler = DependencyScheduler::new();

    let plan = scheduler.plan(&scene.views());
    assert_eq!(plan.tier_of(scene.sum.id()), Some(Tier::Deferred));
    assert_eq!(plan.tier_of(scene.follower.id()), Some(Tier::Triggered));
    assert_eq!(plan.tier_of(scene.va.id()), Some(Tier::Independent));

    let report = scheduler.run(&scene.views());
    assert_eq!(report.per_tier, [2, 1, 0, 1]);
    assert_eq!(report.deferred, 1);
    assert!(scene.sum.snapshot_projection().drawn.is_none());
}

#[test]
fn populated_composite_runs_after_triggered_views() {
    let scene = Scene::new();
    let scheduler = DependencyScheduler::with_threads(4).unwrap();
    scheduler.run(&scene.views());

    scene.a.append(&[0.0, 1.0, 1.0]);
    scene.b.append(&[1.0, 1.0, 1.0]);
    assert_eq!(scheduler.plan(&scene.views()).tier_of(scene.sum.id()), Some(Tier::Composite));

    let report = scheduler.run(&scene.views());
    assert_eq!(report.per_tier, [2, 1, 1, 0]);
    assert_eq!(report.total(), 4);
    let sum_at = report.position(scene.sum.id()).unwrap();
    for earlier in [&scene.va, &scene.vb, &scene.follower] {
        assert!(report.position(earlier.id()).unwrap() < sum_at);
    }
    let follower_at = report.position(scene.follower.id()).unwrap();
    assert!(report.position(scene.va.id()).unwrap() < follower_at);

    assert_eq!(
        scene.sum.snapshot_projection().drawn.map(|d| d.to_vec()),
        Some(vec![1.0, 2.0, 2.0])
    );
    // the follower saw its source's edge at index 1
    assert_eq!(scene.follower.snapshot_projection().drawn_start, 1);
}

#[test]
fn repeated_pass_is_idle() {
    let scene = Scene::new();
    scene.a.append(&[1.0]);
    scene.b.append(&[1.0]);
    let scheduler = DependencyScheduler::new();
    scheduler.run(&scene.views());
    for view in scene.views() {
        assert!(view.flags().is_calculated(), "{} still dirty", view.name());
    }
    // every view is visited, but nothing is recomputed
    let generation = |v: &View| v.buffer().lock().cache(v.id()).map(|c| c.before_zoom_generation());
    let before: Vec<_> = scene.views().iter().map(|v| generation(v)).collect();
    scheduler.run(&scene.views());
    let after: Vec<_> = scene.views().iter().map(|v| generation(v)).collect();
    assert_eq!(before, after);
}

#[test]
fn composite_draws_nothing_until_every_source_has_data() {
    let a = SampleBuffer::new("a", 1.0);
    let b = SampleBuffer::new("b", 1.0);
    b.append(&[1.0, 2.0]);
    let va = View::new("a", a.clone());
    let vb = View::new("b", b);
    let diff = View::composite("a-b", CompositeKind::Difference, vec![va.clone(), vb.clone()]);
    diff.set_paint_mode(PaintMode::PeakHold);
    let views = vec![va, vb, diff.clone()];
    let scheduler = DependencyScheduler::new();

    let report = scheduler.run(&views);
    assert_eq!(report.per_tier, [2, 0, 0, 1]);
    let snap = diff.snapshot_projection();
    assert_eq!(snap.drawn, None);
    assert_eq!(snap.peak, None);
    // still pending, so the next pass retries
    assert!(diff.flags().before_zoom_required());

    a.append(&[5.0, 7.0]);
    let report = scheduler.run(&views);
    assert_eq!(report.per_tier, [2, 0, 1, 0]);
    assert_eq!(diff.snapshot_projection().drawn.map(|d| d.to_vec()), Some(vec![4.0, 5.0]));
    assert!(diff.flags().is_calculated());
}
