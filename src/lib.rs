//! Stream Renderer Library
//!
//! Decode-and-present pipeline for a low-latency game stream client.

pub mod app;
pub mod media;
pub mod utils;

pub use app::Settings;
pub use media::{DecoderRenderer, RendererOptions, SubmitStatus, VideoFormat};
