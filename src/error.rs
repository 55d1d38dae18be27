//! Error types for the confirmation export pipeline

use thiserror::Error;

/// Errors from the render tree.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The handle does not refer to an attached node
    #[error("Node {0} is not attached to the document")]
    NotAttached(u64),

    /// Taffy rejected the layout tree
    #[error("Layout failed: {0}")]
    Layout(#[from] taffy::TaffyError),
}

/// Errors raised while turning a captured surface into pixels.
#[derive(Error, Debug)]
pub enum RasterError {
    /// The surface has no paintable area
    #[error("Surface has no area ({width}x{height})")]
    EmptySurface { width: f32, height: f32 },

    /// The pixel buffer could not be allocated
    #[error("Could not allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },

    /// Rasterizer-specific failure
    #[error("Rasterization failed: {0}")]
    Other(String),
}

/// Failures of a started export. These are reported to the user, never
/// propagated out of [`crate::export::ExportPipeline::export`].
#[derive(Error, Debug)]
pub enum ExportError {
    /// The capture clone could not be laid out or read back
    #[error("Capture context unavailable: {0}")]
    Context(#[from] DocumentError),

    #[error(transparent)]
    Raster(#[from] RasterError),

    /// Resampling or PNG encoding failed
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    /// The download sink refused the file
    #[error("Delivery failed: {0}")]
    Delivery(#[from] std::io::Error),
}

/// Invalid export configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read config '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON for [`crate::config::ExportConfig`]
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range
    #[error("Invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}
