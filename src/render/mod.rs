//! Rendering: paint strategies, styles, compositing and repaint scheduling.
//!
//! [`Renderer::paint`] is the host's paint callback. It runs one tiered
//! calculation pass over the visible views, composites every visible group
//! and hands back a [`Frame`].

pub mod compositor;
pub mod paint;
pub mod scheduler;
pub mod style;
pub mod surface;

use std::sync::{Arc, Mutex};
use std::time::Instant;

pub use compositor::{AnnotationKind, ComposeOutcome, Compositor, Frame, TextAnnotation};
pub use paint::{PaintMode, PaintStrategy, PlotArea, TraceFrame, TracePainter};
pub use scheduler::{PaintGuard, PaintStats, RenderScheduler};
pub use style::Style;
pub use surface::RepaintSurface;

use crate::config::ViewerConfig;
use crate::data::group::GroupSet;
use crate::error::RenderError;
use crate::scheduler::{DependencyScheduler, PassReport};

/// Text overlaid on the previous frame when a paint is requested re-entrantly.
pub const RECURSION_WARNING: &str = "paint recursion: showing previous frame";

/// What one call to [`Renderer::paint`] produced.
#[derive(Debug, Clone)]
pub struct PaintResult {
    pub frame: Frame,
    /// The call was nested inside another paint and returned the previous frame.
    pub recursion: bool,
    pub pass: Option<PassReport>,
    pub layout_changed: bool,
}

/// Ties the groups, the dependency pass, the compositor and the render scheduler together.
pub struct Renderer {
    groups: Arc<GroupSet>,
    dependencies: DependencyScheduler,
    compositor: Compositor,
    scheduler: RenderScheduler,
    last_frame: Mutex<Option<Frame>>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("dependencies", &self.dependencies)
            .field("compositor", &self.compositor)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Renderer {
    pub fn new(groups: Arc<GroupSet>, surface: Arc<dyn RepaintSurface>, config: &ViewerConfig) -> Result<Self, RenderError> {
        let settings = config.render.clone();
        let dependencies = if settings.calc_threads == 0 {
            DependencyScheduler::new()
        } else {
            DependencyScheduler::with_threads(settings.calc_threads).map_err(|e| RenderError::Startup(e.to_string()))?
        };
        let compositor = Compositor::new(config.style(), settings.group_parallel);
        let scheduler = RenderScheduler::start(surface, settings).map_err(|e| RenderError::Startup(e.to_string()))?;
        Ok(Self { groups, dependencies, compositor, scheduler, last_frame: Mutex::new(None) })
    }

    pub fn groups(&self) -> &Arc<GroupSet> {
        &self.groups
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    pub fn style(&self) -> &Style {
        self.compositor.style()
    }

    /// Something changed; a repaint will follow (rate-limited).
    pub fn invalidate(&self) {
        self.scheduler.invalidate();
    }

    pub fn stats(&self) -> PaintStats {
        self.scheduler.stats()
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.last_frame.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Paint callback.
    pub fn paint(&self, width: u32, height: u32) -> Result<PaintResult, RenderError> {
        self.paint_using(width, height, |compositor, groups, width, height| compositor.compose(groups, width, height))
    }

    fn paint_using(
        &self,
        width: u32,
        height: u32,
        compose: impl FnOnce(&Compositor, &GroupSet, u32, u32) -> Result<ComposeOutcome, RenderError>,
    ) -> Result<PaintResult, RenderError> {
        let Some(_guard) = self.scheduler.enter_paint() else {
            return self.recursion_frame(width, height);
        };

        let started = Instant::now();
        let pass = self.dependencies.run(&self.groups.visible_views());
        let composed = compose(&self.compositor, &self.groups, width, height);
        self.scheduler.record_paint(started, started.elapsed());
        let outcome = composed?;

        if outcome.failed_groups > 0 {
            log::debug!("{} group(s) painted as diagnostics", outcome.failed_groups);
        }
        *self.last_frame.lock().unwrap_or_else(|p| p.into_inner()) = Some(outcome.frame.clone());
        if outcome.layout_changed {
            self.scheduler.invalidate();
        }
        Ok(PaintResult {
            frame: outcome.frame,
            recursion: false,
            pass: Some(pass),
            layout_changed: outcome.layout_changed,
        })
    }

    /// Previous frame with a warning overlay; re-arms the pending repaint.
    fn recursion_frame(&self, width: u32, height: u32) -> Result<PaintResult, RenderError> {
        log::debug!("paint requested while painting, deferring");
        let mut frame = match self.last_frame() {
            Some(frame) => frame,
            None => {
                let mut blank = Frame::new(width, height)?;
                let bg = self.style().background;
                blank.pixmap.fill(tiny_skia::Color::from_rgba8(bg.r(), bg.g(), bg.b(), bg.a()));
                blank
            }
        };
        frame.push_warning(RECURSION_WARNING, self.style().diagnostic);
        self.scheduler.invalidate();
        Ok(PaintResult { frame, recursion: true, pass: None, layout_changed: false })
    }
}
