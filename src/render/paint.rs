//! Per-trace drawing strategies.

use egui::Color32;
use serde::{Deserialize, Serialize};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

use crate::data::view::PeakEnvelope;
use crate::error::RenderError;
use crate::render::style::Style;

/// How a view's drawn samples are painted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PaintMode {
    #[default]
    Line,
    Dots,
    Bars,
    /// Min/max envelope accumulated across passes, plus the current trace.
    PeakHold,
}

impl PaintMode {
    pub const ALL: [PaintMode; 4] = [PaintMode::Line, PaintMode::Dots, PaintMode::Bars, PaintMode::PeakHold];

    pub fn holds_peaks(&self) -> bool {
        matches!(self, PaintMode::PeakHold)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PaintMode::Line => "Line",
            PaintMode::Dots => "Dots",
            PaintMode::Bars => "Bars",
            PaintMode::PeakHold => "Peak hold",
        }
    }
}

/// Plot rectangle (in pixmap pixels) and the value range it maps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotArea {
    pub rect: egui::Rect,
    pub min: f64,
    pub max: f64,
}

impl PlotArea {
    pub fn x(&self, index: usize, count: usize) -> f32 {
        if count <= 1 {
            return self.rect.center().x;
        }
        self.rect.left() + self.rect.width() * index as f32 / (count - 1) as f32
    }

    pub fn y(&self, value: f64) -> f32 {
        let span = self.max - self.min;
        let t = if span.abs() < f64::EPSILON { 0.5 } else { (value - self.min) / span };
        self.rect.bottom() - self.rect.height() * t.clamp(0.0, 1.0) as f32
    }
}

/// One trace ready to be painted.
#[derive(Debug, Clone, Copy)]
pub struct TraceFrame<'a> {
    pub drawn: &'a [f64],
    pub peak: Option<&'a PeakEnvelope>,
    pub color: Color32,
}

/// Common interface of the drawing strategies.
pub trait TracePainter {
    fn paint(
        &self,
        pixmap: &mut Pixmap,
        transform: Transform,
        area: &PlotArea,
        frame: &TraceFrame<'_>,
        style: &Style,
    ) -> Result<(), RenderError>;
}

fn solid(color: Color32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r(), color.g(), color.b(), color.a());
    paint.anti_alias = true;
    paint
}

/// Polyline through the finite samples; non-finite values break the line.
fn polyline(values: &[f64], area: &PlotArea) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    let mut pen_down = false;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            pen_down = false;
            continue;
        }
        let (x, y) = (area.x(i, values.len()), area.y(v));
        if pen_down {
            pb.line_to(x, y);
        } else {
            pb.move_to(x, y);
            pen_down = true;
        }
    }
    pb.finish()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinePainter;

impl TracePainter for LinePainter {
    fn paint(&self, pixmap: &mut Pixmap, transform: Transform, area: &PlotArea, frame: &TraceFrame<'_>, style: &Style) -> Result<(), RenderError> {
        if let Some(path) = polyline(frame.drawn, area) {
            let stroke = Stroke { width: style.line_width, ..Default::default() };
            pixmap.stroke_path(&path, &solid(frame.color), &stroke, transform, None);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DotPainter;

impl TracePainter for DotPainter {
    fn paint(&self, pixmap: &mut Pixmap, transform: Transform, area: &PlotArea, frame: &TraceFrame<'_>, style: &Style) -> Result<(), RenderError> {
        let radius = (style.line_width * 1.5).max(1.0);
        let mut pb = PathBuilder::new();
        for (i, &v) in frame.drawn.iter().enumerate().filter(|(_, v)| v.is_finite()) {
            pb.push_circle(area.x(i, frame.drawn.len()), area.y(v), radius);
        }
        if let Some(path) = pb.finish() {
            pixmap.fill_path(&path, &solid(frame.color), FillRule::Winding, transform, None);
        }
        Ok(())
    }
}

/// Vertical bars from the zero line (or the nearest range edge).
#[derive(Debug, Clone, Copy, Default)]
pub struct BarPainter;

impl TracePainter for BarPainter {
    fn paint(&self, pixmap: &mut Pixmap, transform: Transform, area: &PlotArea, frame: &TraceFrame<'_>, _style: &Style) -> Result<(), RenderError> {
        let n = frame.drawn.len();
        if n == 0 {
            return Ok(());
        }
        let base = area.y(0.0_f64.clamp(area.min, area.max));
        let width = (area.rect.width() / n as f32 * 0.8).max(1.0);
        let paint = solid(frame.color);
        for (i, &v) in frame.drawn.iter().enumerate().filter(|(_, v)| v.is_finite()) {
            let x = area.x(i, n) - width / 2.0;
            let y = area.y(v);
            let (top, height) = if y < base { (y, base - y) } else { (base, y - base) };
            if let Some(rect) = tiny_skia::Rect::from_xywh(x, top, width, height.max(1.0)) {
                pixmap.fill_rect(rect, &paint, transform, None);
            }
        }
        Ok(())
    }
}

/// Translucent min/max band with the current trace on top.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakHoldPainter;

impl TracePainter for PeakHoldPainter {
    fn paint(&self, pixmap: &mut Pixmap, transform: Transform, area: &PlotArea, frame: &TraceFrame<'_>, style: &Style) -> Result<(), RenderError> {
        if let Some(peak) = frame.peak {
            let n = peak.max.len().min(peak.min.len());
            let mut pb = PathBuilder::new();
            let points = |i: usize, v: f64| (area.x(i, n), area.y(v));
            let mut upper = (0..n).filter(|&i| peak.max[i].is_finite() && peak.min[i].is_finite());
            if let Some(first) = upper.next() {
                let (x, y) = points(first, peak.max[first]);
                pb.move_to(x, y);
                for i in upper {
                    let (x, y) = points(i, peak.max[i]);
                    pb.line_to(x, y);
                }
                for i in (0..n).rev().filter(|&i| peak.max[i].is_finite() && peak.min[i].is_finite()) {
                    let (x, y) = points(i, peak.min[i]);
                    pb.line_to(x, y);
                }
                pb.close();
            }
            if let Some(path) = pb.finish() {
                let band = frame.color.gamma_multiply(0.35);
                pixmap.fill_path(&path, &solid(band), FillRule::Winding, transform, None);
            }
        }
        LinePainter.paint(pixmap, transform, area, frame, style)
    }
}

/// Drawing strategy chosen once per paint-mode change.
#[derive(Debug, Clone, Copy)]
pub enum PaintStrategy {
    Line(LinePainter),
    Dots(DotPainter),
    Bars(BarPainter),
    PeakHold(PeakHoldPainter),
}

impl PaintStrategy {
    pub fn for_mode(mode: PaintMode) -> Self {
        match mode {
            PaintMode::Line => PaintStrategy::Line(LinePainter),
            PaintMode::Dots => PaintStrategy::Dots(DotPainter),
            PaintMode::Bars => PaintStrategy::Bars(BarPainter),
            PaintMode::PeakHold => PaintStrategy::PeakHold(PeakHoldPainter),
        }
    }

    fn painter(&self) -> &dyn TracePainter {
        match self {
            PaintStrategy::Line(p) => p,
            PaintStrategy::Dots(p) => p,
            PaintStrategy::Bars(p) => p,
            PaintStrategy::PeakHold(p) => p,
        }
    }
}

impl TracePainter for PaintStrategy {
    fn paint(&self, pixmap: &mut Pixmap, transform: Transform, area: &PlotArea, frame: &TraceFrame<'_>, style: &Style) -> Result<(), RenderError> {
        self.painter().paint(pixmap, transform, area, frame, style)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area() -> PlotArea {
        PlotArea { rect: egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(100.0, 50.0)), min: -1.0, max: 1.0 }
    }

    #[test]
    fn area_maps_values_upwards() {
        let a = area();
        assert_eq!(a.y(-1.0), 50.0);
        assert_eq!(a.y(1.0), 0.0);
        assert_eq!(a.x(0, 11), 0.0);
        assert_eq!(a.x(10, 11), 100.0);
    }

    #[test]
    fn strategies_paint_pixels() {
        let style = Style::dark();
        let frame = TraceFrame { drawn: &[-1.0, 0.5, f64::NAN, 1.0], peak: None, color: Color32::WHITE };
        for mode in PaintMode::ALL {
            let mut pixmap = Pixmap::new(100, 50).unwrap();
            PaintStrategy::for_mode(mode)
                .paint(&mut pixmap, Transform::identity(), &area(), &frame, &style)
                .unwrap();
            assert!(pixmap.pixels().iter().any(|p| p.alpha() > 0), "{mode:?} drew nothing");
        }
    }

    #[test]
    fn only_peak_hold_holds_peaks() {
        assert!(PaintMode::PeakHold.holds_peaks());
        assert!(!PaintMode::Bars.holds_peaks());
    }
}
