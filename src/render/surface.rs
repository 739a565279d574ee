//! The UI surface the render scheduler asks to repaint.

/// Host side of the repaint handshake.
pub trait RepaintSurface: Send + Sync {
    /// `false` until the host window exists; invalidations are dropped until then.
    fn is_realized(&self) -> bool;

    /// Ask the host to call back into [`Renderer::paint`](crate::render::Renderer::paint) soon.
    fn request_repaint(&self);
}

impl RepaintSurface for egui::Context {
    fn is_realized(&self) -> bool {
        // realised once the host has run at least one pass
        self.cumulative_pass_nr() > 0
    }

    fn request_repaint(&self) {
        egui::Context::request_repaint(self);
    }
}
