//! Error types for the tracer
//!
//! Initialization failures and device loss are fatal for the session; export
//! failures are reported and otherwise ignored by the frame loop.

use thiserror::Error;

/// Tracer error type
#[derive(Error, Debug)]
pub enum TracerError {
    #[error("Output surface element `{0}` was not found")]
    SurfaceMissing(String),
    #[error("Failed to create event loop: {0}")]
    EventLoop(String),
    #[error("Failed to create window: {0}")]
    WindowCreation(String),
    #[error("Failed to create surface: {0}")]
    SurfaceCreationFailed(String),
    #[error("No compatible GPU adapter found: {0}")]
    NoAdapter(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to load shader `{name}`: {message}")]
    ShaderLoad { name: String, message: String },
    #[error("SHADER ERROR in `{program}`: {message}")]
    ShaderCompilation { program: String, message: String },
    #[error("Pipeline Error in `{pipeline}`: {message}")]
    PipelineValidation { pipeline: String, message: String },
    #[error("Surface lost")]
    SurfaceLost,
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost: {0}")]
    DeviceLost(String),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

impl TracerError {
    /// Whether the error only costs the current frame.
    pub fn is_transient(&self) -> bool {
        matches!(self, TracerError::SurfaceLost)
    }
}

pub type TracerResult<T> = Result<T, TracerError>;

/// Errors raised while packing a fixed-layout record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LayoutError {
    #[error("{layout}: expected {expected} values, got {actual}")]
    ValueCount {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{layout}: field `{field}` expects {expected}, got {actual}")]
    KindMismatch {
        layout: &'static str,
        field: &'static str,
        expected: &'static str,
        actual: &'static str,
    },
    #[error("{layout}: output of {actual} bytes is smaller than the {expected} byte stride")]
    OutputTooSmall {
        layout: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Image export error type
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Nothing has been rendered yet")]
    NothingRendered,
    #[error("Failed to map staging buffer: {0}")]
    MapFailed(String),
    #[error("Staging buffer holds {actual} bytes, expected at least {expected}")]
    ShortReadback { expected: usize, actual: usize },
    #[error("Failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Failed to write image: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to deliver image: {0}")]
    Delivery(String),
}

pub type ExportResult<T> = Result<T, ExportError>;
