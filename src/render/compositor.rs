//! Paints trace groups into one frame.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use egui::{pos2, vec2, Color32, Pos2, Rect};
use rayon::prelude::*;
use tiny_skia::{Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform};

use crate::data::group::{GroupSet, TraceGroup};
use crate::error::RenderError;
use crate::render::paint::{PlotArea, TraceFrame, TracePainter};
use crate::render::style::Style;

const MARGIN: f32 = 4.0;
const LABEL_HEIGHT: f32 = 14.0;
const GRID_DIVISIONS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    /// Trace name.
    Label,
    /// Failure text drawn in place of a group.
    Diagnostic,
    Warning,
}

/// Text the host draws on top of the pixmap.
#[derive(Debug, Clone, PartialEq)]
pub struct TextAnnotation {
    pub pos: Pos2,
    pub text: String,
    pub color: Color32,
    pub kind: AnnotationKind,
}

/// Composited pixels plus text overlays.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixmap: Pixmap,
    pub annotations: Vec<TextAnnotation>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Result<Self, RenderError> {
        let pixmap = Pixmap::new(width, height).ok_or(RenderError::SurfaceAllocation { width, height })?;
        Ok(Self { pixmap, annotations: Vec::new() })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn diagnostics(&self) -> impl Iterator<Item = &TextAnnotation> {
        self.annotations.iter().filter(|a| a.kind != AnnotationKind::Label)
    }

    /// Overlay a warning line at the top left.
    pub fn push_warning(&mut self, text: impl Into<String>, color: Color32) {
        let row = self.annotations.iter().filter(|a| a.kind == AnnotationKind::Warning).count();
        self.annotations.push(TextAnnotation {
            pos: pos2(MARGIN, MARGIN + row as f32 * LABEL_HEIGHT),
            text: text.into(),
            color,
            kind: AnnotationKind::Warning,
        });
    }

    /// Pixels as an egui image, ready for `Context::load_texture`.
    pub fn to_color_image(&self) -> egui::ColorImage {
        egui::ColorImage::from_rgba_premultiplied([self.width() as usize, self.height() as usize], self.pixmap.data())
    }
}

/// Result of one compositing pass.
#[derive(Debug, Clone)]
pub struct ComposeOutcome {
    pub frame: Frame,
    /// A group's extents changed while painting; another pass is due.
    pub layout_changed: bool,
    pub painted_groups: usize,
    pub skipped_groups: usize,
    pub failed_groups: usize,
}

struct GroupOutcome {
    layout_changed: bool,
    failed: bool,
}

/// Paints visible groups into a frame, optionally in parallel.
#[derive(Debug, Clone)]
pub struct Compositor {
    style: Style,
    group_parallel: bool,
}

impl Compositor {
    pub fn new(style: Style, group_parallel: bool) -> Self {
        Self { style, group_parallel }
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn group_parallel(&self) -> bool {
        self.group_parallel
    }

    pub fn compose(&self, groups: &GroupSet, width: u32, height: u32) -> Result<ComposeOutcome, RenderError> {
        self.compose_with(groups, width, height, |group, pixmap, transform, size, labels| {
            self.paint_group(group, pixmap, transform, size, labels)
        })
    }

    /// [`compose`](Self::compose) with a replacement for the per-group painter.
    pub(crate) fn compose_with<F>(&self, groups: &GroupSet, width: u32, height: u32, paint: F) -> Result<ComposeOutcome, RenderError>
    where
        F: Fn(&TraceGroup, &mut Pixmap, Transform, egui::Vec2, &mut Vec<TextAnnotation>) -> Result<(), RenderError> + Sync,
    {
        let mut frame = Frame::new(width, height)?;
        frame.pixmap.fill(skia_color(self.style.background));
        let viewport = Rect::from_min_size(Pos2::ZERO, vec2(width as f32, height as f32));

        let (on_screen, off_screen): (Vec<_>, Vec<_>) = groups
            .layout(viewport)
            .into_iter()
            .partition(|(_, rect)| rect.intersects(viewport) && rect.width() >= 1.0 && rect.height() >= 1.0);
        for (group, _) in &on_screen {
            // this layout already accounts for earlier changes
            group.take_layout_dirty();
        }
        if !off_screen.is_empty() {
            log::trace!("{} group(s) off-screen", off_screen.len());
        }

        let outcomes: Vec<GroupOutcome> = if self.group_parallel {
            let canvas = Mutex::new(&mut frame);
            on_screen
                .par_iter()
                .map(|(group, rect)| self.paint_isolated(group, *rect, &canvas, &paint))
                .collect()
        } else {
            on_screen
                .iter()
                .map(|(group, rect)| self.paint_direct(group, *rect, &mut frame, &paint))
                .collect()
        };

        Ok(ComposeOutcome {
            frame,
            layout_changed: outcomes.iter().any(|o| o.layout_changed),
            painted_groups: outcomes.iter().filter(|o| !o.failed).count(),
            skipped_groups: off_screen.len(),
            failed_groups: outcomes.iter().filter(|o| o.failed).count(),
        })
    }

    /// Paint into a private pixmap, then copy it into the shared canvas.
    fn paint_isolated<F>(&self, group: &Arc<TraceGroup>, rect: Rect, canvas: &Mutex<&mut Frame>, paint: &F) -> GroupOutcome
    where
        F: Fn(&TraceGroup, &mut Pixmap, Transform, egui::Vec2, &mut Vec<TextAnnotation>) -> Result<(), RenderError>,
    {
        let (width, height) = (rect.width().round().max(1.0) as u32, rect.height().round().max(1.0) as u32);
        let mut labels = Vec::new();
        let result = guarded(group, || {
            let mut private = Pixmap::new(width, height).ok_or(RenderError::SurfaceAllocation { width, height })?;
            private.fill(skia_color(self.style.background));
            paint(&**group, &mut private, Transform::identity(), rect.size(), &mut labels)?;
            Ok(private)
        });

        let mut canvas = canvas.lock().unwrap_or_else(|p| p.into_inner());
        match result {
            Ok(private) => {
                canvas.pixmap.draw_pixmap(
                    rect.left().round() as i32,
                    rect.top().round() as i32,
                    private.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    None,
                );
                canvas.annotations.extend(labels.into_iter().map(|a| offset(a, rect.min)));
                GroupOutcome { layout_changed: group.take_layout_dirty(), failed: false }
            }
            Err(e) => {
                canvas.annotations.push(self.diagnostic(rect, &e));
                GroupOutcome { layout_changed: group.take_layout_dirty(), failed: true }
            }
        }
    }

    fn paint_direct<F>(&self, group: &Arc<TraceGroup>, rect: Rect, frame: &mut Frame, paint: &F) -> GroupOutcome
    where
        F: Fn(&TraceGroup, &mut Pixmap, Transform, egui::Vec2, &mut Vec<TextAnnotation>) -> Result<(), RenderError>,
    {
        let transform = Transform::from_translate(rect.left(), rect.top());
        let mut labels = Vec::new();
        let result = guarded(group, || paint(&**group, &mut frame.pixmap, transform, rect.size(), &mut labels));
        match result {
            Ok(()) => {
                frame.annotations.extend(labels.into_iter().map(|a| offset(a, rect.min)));
                GroupOutcome { layout_changed: group.take_layout_dirty(), failed: false }
            }
            Err(e) => {
                // wipe whatever was drawn before the failure
                if let Some(r) = tiny_skia::Rect::from_xywh(rect.left(), rect.top(), rect.width(), rect.height()) {
                    frame.pixmap.fill_rect(r, &solid(self.style.background), Transform::identity(), None);
                }
                frame.annotations.push(self.diagnostic(rect, &e));
                GroupOutcome { layout_changed: group.take_layout_dirty(), failed: true }
            }
        }
    }

    /// Paint one group in group-local coordinates.
    pub(crate) fn paint_group(
        &self,
        group: &TraceGroup,
        pixmap: &mut Pixmap,
        transform: Transform,
        size: egui::Vec2,
        labels: &mut Vec<TextAnnotation>,
    ) -> Result<(), RenderError> {
        let views = group.visible_views();
        let mut traces = Vec::with_capacity(views.len());
        for view in &views {
            // anything invalidated since the dependency pass
            view.calculate();
            traces.push((view.clone(), view.painter(), view.snapshot_projection()));
        }

        let (lo, hi) = traces
            .iter()
            .flat_map(|(_, _, snap)| {
                let drawn = snap.drawn.iter().flat_map(|d| d.iter());
                let peak = snap.peak.iter().flat_map(|p| p.min.iter().chain(p.max.iter()));
                drawn.chain(peak).copied().collect::<Vec<_>>()
            })
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        group.fit_scale(lo, hi);
        let scale = group.scale();

        let plot = Rect::from_min_max(pos2(MARGIN, MARGIN), pos2(size.x - MARGIN, size.y - MARGIN));
        if plot.width() <= 0.0 || plot.height() <= 0.0 {
            return Ok(());
        }
        let area = PlotArea { rect: plot, min: scale.min, max: scale.max };
        self.paint_grid(pixmap, transform, &area);

        for (index, (view, painter, snap)) in traces.iter().enumerate() {
            let color = self.style.trace_color(index);
            labels.push(TextAnnotation {
                pos: pos2(MARGIN * 2.0, MARGIN + index as f32 * LABEL_HEIGHT),
                text: view.name().to_string(),
                color,
                kind: AnnotationKind::Label,
            });
            let Some(drawn) = &snap.drawn else { continue };
            let trace = TraceFrame { drawn: drawn.as_slice(), peak: snap.peak.as_ref(), color };
            painter.paint(pixmap, transform, &area, &trace, &self.style)?;
        }
        Ok(())
    }

    fn paint_grid(&self, pixmap: &mut Pixmap, transform: Transform, area: &PlotArea) {
        let mut pb = PathBuilder::new();
        for i in 0..=GRID_DIVISIONS {
            let y = area.rect.top() + area.rect.height() * i as f32 / GRID_DIVISIONS as f32;
            pb.move_to(area.rect.left(), y);
            pb.line_to(area.rect.right(), y);
            let x = area.rect.left() + area.rect.width() * i as f32 / GRID_DIVISIONS as f32;
            pb.move_to(x, area.rect.top());
            pb.line_to(x, area.rect.bottom());
        }
        if let Some(path) = pb.finish() {
            let stroke = Stroke { width: 1.0, ..Default::default() };
            pixmap.stroke_path(&path, &solid(self.style.grid), &stroke, transform, None);
        }
    }

    fn diagnostic(&self, rect: Rect, error: &RenderError) -> TextAnnotation {
        log::warn!("{error}");
        TextAnnotation {
            pos: rect.min + vec2(MARGIN, MARGIN),
            text: error.to_string(),
            color: self.style.diagnostic,
            kind: AnnotationKind::Diagnostic,
        }
    }
}

/// Run `paint`, turning a panic into a [`RenderError::GroupPaint`].
fn guarded<T>(group: &TraceGroup, paint: impl FnOnce() -> Result<T, RenderError>) -> Result<T, RenderError> {
    match panic::catch_unwind(AssertUnwindSafe(paint)) {
        Ok(Err(RenderError::GroupPaint { group, reason })) => Err(RenderError::GroupPaint { group, reason }),
        Ok(Err(other)) => Err(RenderError::GroupPaint { group: group.name().to_string(), reason: other.to_string() }),
        Ok(Ok(value)) => Ok(value),
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "panic".to_string());
            Err(RenderError::GroupPaint { group: group.name().to_string(), reason })
        }
    }
}

fn offset(mut annotation: TextAnnotation, origin: Pos2) -> TextAnnotation {
    annotation.pos += origin.to_vec2();
    annotation
}

fn skia_color(color: Color32) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba8(color.r(), color.g(), color.b(), color.a())
}

fn solid(color: Color32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(skia_color(color));
    paint
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::buffer::SampleBuffer;
    use crate::data::view::View;

    fn groups_with(values: &[f64]) -> GroupSet {
        let buffer = SampleBuffer::new("a", 10.0);
        buffer.append(values);
        let group = TraceGroup::new("g");
        group.add_view(View::new("v", buffer));
        let set = GroupSet::new();
        set.add(group);
        set
    }

    #[test]
    fn parallel_and_direct_agree() {
        let set = groups_with(&[0.0, 1.0, -1.0, 0.5]);
        let direct = Compositor::new(Style::dark(), false).compose(&set, 64, 32).unwrap();
        let set = groups_with(&[0.0, 1.0, -1.0, 0.5]);
        let parallel = Compositor::new(Style::dark(), true).compose(&set, 64, 32).unwrap();
        assert_eq!(direct.painted_groups, 1);
        assert_eq!(direct.frame.pixmap.data(), parallel.frame.pixmap.data());
        assert_eq!(direct.frame.annotations, parallel.frame.annotations);
    }

    #[test]
    fn failing_group_leaves_the_others_intact() {
        for parallel in [true, false] {
            let set = groups_with(&[0.0, 1.0, -1.0, 0.5]);
            let broken = TraceGroup::new("broken");
            broken.add_view(View::new("w", SampleBuffer::new("b", 10.0)));
            set.add(broken);

            let compositor = Compositor::new(Style::dark(), parallel);
            let outcome = compositor
                .compose_with(&set, 64, 64, |group, pixmap, transform, size, labels| {
                    if group.name() == "broken" {
                        panic!("painter failed");
                    }
                    compositor.paint_group(group, pixmap, transform, size, labels)
                })
                .unwrap();

            assert_eq!((outcome.painted_groups, outcome.failed_groups), (1, 1));
            let frame = &outcome.frame;
            let labels: Vec<_> = frame.annotations.iter().filter(|a| a.kind == AnnotationKind::Label).collect();
            assert_eq!(labels.len(), 1);
            assert_eq!(labels[0].text, "v");
            let diagnostics: Vec<_> = frame.diagnostics().collect();
            assert_eq!(diagnostics.len(), 1);
            assert_eq!(diagnostics[0].kind, AnnotationKind::Diagnostic);
            assert!(diagnostics[0].text.contains("painter failed"));
            assert!(diagnostics[0].pos.y >= 32.0);

            // top half painted, bottom half left as background
            let background = skia_color(Style::dark().background).premultiply().to_color_u8();
            let top = (0..32).flat_map(|y| (0..64).map(move |x| (x, y)));
            assert!(top.filter_map(|(x, y)| frame.pixmap.pixel(x, y)).any(|p| p != background));
            let bottom = (32..64).flat_map(|y| (0..64).map(move |x| (x, y)));
            assert!(bottom.filter_map(|(x, y)| frame.pixmap.pixel(x, y)).all(|p| p == background));
        }
    }

    #[test]
    fn zero_size_frame_is_an_error() {
        let set = GroupSet::new();
        let err = Compositor::new(Style::dark(), true).compose(&set, 0, 10).unwrap_err();
        assert_eq!(err, RenderError::SurfaceAllocation { width: 0, height: 10 });
    }

    #[test]
    fn panics_become_diagnostics() {
        let group = TraceGroup::new("broken");
        let err = guarded(&group, || -> Result<(), RenderError> { panic!("boom") }).unwrap_err();
        assert_eq!(err, RenderError::GroupPaint { group: "broken".into(), reason: "boom".into() });
    }
}
