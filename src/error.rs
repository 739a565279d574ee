//! Error types for transforms, rendering and configuration.
//!
//! None of these are fatal to the viewer: transform errors degrade to
//! pass-through at the stage boundary and render errors become inline
//! diagnostics for the affected group.

use thiserror::Error;

/// Failures of a filter or FFT stage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Filter name not recognised.
    #[error("Unknown filter: {0}")]
    UnknownFilter(String),

    /// A filter or FFT parameter is out of range.
    #[error("Invalid {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// The FFT engine was planned for a different width.
    #[error("FFT width mismatch: planned={planned}, input={input}")]
    WidthMismatch { planned: usize, input: usize },

    /// Transform requires at least one sample.
    #[error("Empty input")]
    EmptyInput,
}

/// Failures while compositing a trace group.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// Offscreen surface could not be allocated (zero or oversized area).
    #[error("Cannot allocate {width}x{height} surface")]
    SurfaceAllocation { width: u32, height: u32 },

    /// A group painter failed.
    #[error("Group '{group}' failed to paint: {reason}")]
    GroupPaint { group: String, reason: String },

    /// Worker pool or scheduling thread could not be started.
    #[error("Failed to start renderer: {0}")]
    Startup(String),
}

/// Failures loading or saving a [`ViewerConfig`](crate::config::ViewerConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HOME env var not set")]
    NoHome,
}

/// Result type for transform stages
pub type TransformResult<T> = Result<T, TransformError>;
