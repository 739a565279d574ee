//! Sample buffers, views and the per-view calculation pipeline.

pub mod buffer;
pub mod cache;
pub mod composite;
pub mod fft;
pub mod filter;
pub mod group;
pub mod listeners;
pub mod measurement;
pub mod peak;
pub mod pipeline;
pub mod trigger;
pub mod view;
