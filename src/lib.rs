//! Stellar Tracer - a progressive GPU path tracer
//!
//! A compute shader traces a small solar system made of spheres. While the
//! camera and parameters hold still, each frame is blended into a running
//! average kept in two ping-ponged `Rgba32Float` surfaces, so the image keeps
//! converging. Any change that alters the picture restarts the average.
//!
//! # Features
//! - Native (winit + wgpu) and web (WebGPU) builds from one code path
//! - Free-fly camera with pointer lock and keyboard parameter bindings
//! - Throughput benchmark reporting rays per second
//! - PNG export of the accumulated image
//!
//! The frame logic lives in [`frame::RenderContext`], which drives any
//! [`frame::FrameBackend`]; [`gpu::GpuTracer`] is the wgpu implementation.

pub mod accumulation;
pub mod app;
pub mod benchmark;
pub mod camera;
pub mod error;
pub mod export;
pub mod frame;
pub mod gpu;
pub mod layout;
pub mod params;
pub mod scene;
pub mod uniforms;

// Web-specific modules
#[cfg(target_arch = "wasm32")]
pub mod web;

#[cfg(target_arch = "wasm32")]
mod web_main;

pub use error::{ExportError, TracerError, TracerResult};
pub use frame::{FrameBackend, RenderContext};
pub use gpu::GpuTracer;

use gpu::shaders::ShaderSource;
use std::path::PathBuf;

/// Configuration for starting the tracer
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Window title; frame stats are appended to it
    pub title: String,
    /// Initial window width
    pub width: u32,
    /// Initial window height
    pub height: u32,
    /// Enable vsync
    pub vsync: bool,
    /// Where the WGSL programs are loaded from
    pub shader_source: ShaderSource,
    /// Directory exported images are written to (native only)
    pub output_dir: PathBuf,
    /// Compute-only frames submitted per benchmark run
    pub benchmark_frames: u32,
    /// Background stars added after the fixed catalog
    pub star_count: usize,
    /// Frames between two stats updates
    pub stats_interval: u32,
    /// Fixed seed for the scene and per-frame sampling
    pub seed: Option<u64>,
    /// Run one benchmark after startup and exit (native only)
    pub benchmark_on_start: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            title: "Stellar Tracer".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            shader_source: ShaderSource::Embedded,
            output_dir: PathBuf::from("."),
            benchmark_frames: benchmark::DEFAULT_BENCHMARK_FRAMES,
            star_count: scene::DEFAULT_STAR_COUNT,
            stats_interval: frame::DEFAULT_STATS_INTERVAL,
            seed: None,
            benchmark_on_start: false,
        }
    }
}

// Web initialization helper
#[cfg(target_arch = "wasm32")]
pub fn init_web_logging() {
    // Set up panic hook for better error messages in console
    console_error_panic_hook::set_once();
    // A second init (page hot reload) is harmless
    let _ = console_log::init_with_level(log::Level::Info);
}
