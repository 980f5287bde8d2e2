//! Application Layer
//!
//! Settings shared by the renderer and the binary.

pub mod config;

pub use config::{OnscreenControls, Settings};
