//! scopeview crate root: re-exports and module wiring.
//!
//! Core of a multi-trace signal viewer:
//! - `data`: sample buffers, views and their dirty-flag gated calculation pipeline
//! - `scheduler`: tiered, parallel recalculation of dependent views
//! - `render`: paint strategies, group compositing and rate-limited repaint scheduling
//! - `config`: persisted viewer configuration

pub mod config;
pub mod data;
pub mod error;
pub mod render;
pub mod scheduler;

pub use config::{RenderSettings, ViewerConfig};
pub use data::buffer::{SampleBuffer, ViewId};
pub use data::cache::{InvalidateLevel, Samples};
pub use data::composite::CompositeKind;
pub use data::fft::{FftWindow, MathOutput, MathPhase, SpectralBand, SpectralFilter};
pub use data::filter::{Filter, FilterKind};
pub use data::group::{GroupSet, TraceGroup, VerticalScale};
pub use data::measurement::DrawnExtents;
pub use data::pipeline::{PadPolicy, SampleWindow};
pub use data::trigger::TriggerMode;
pub use data::view::{ProjectionSnapshot, View, ViewSettings};
pub use error::{ConfigError, RenderError, TransformError};
pub use render::{Frame, PaintMode, PaintResult, Renderer, RepaintSurface, Style};
pub use scheduler::{DependencyScheduler, PassReport, Tier};
