//! Error types for the annotation editor.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a persistence gateway call.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// I/O error while reading or writing the backing store
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Update or delete referenced an annotation the store does not know
    #[error("Annotation not found: {id}")]
    NotFound {
        /// The missing annotation ID
        id: String,
    },

    /// The gateway worker went away before answering
    #[error("Gateway disconnected")]
    Disconnected,
}

impl GatewayError {
    /// Create a not-found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }
}

/// Errors while loading the editor configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Viewport dimensions must be positive
    #[error("Invalid viewport {width}x{height}")]
    InvalidViewport { width: f32, height: f32 },

    /// Zoom limits must be positive, finite and ordered
    #[error("Invalid zoom range {min}..{max}")]
    InvalidZoom { min: f32, max: f32 },

    #[error("Invalid fit margin {0}, expected a value in (0, 1]")]
    InvalidFitMargin(f32),
}

/// Errors while preloading the image to annotate.
#[derive(Error, Debug)]
pub enum PreloadError {
    #[error("Failed to decode {path:?}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Image decoded but has no pixels, so no fit transform exists
    #[error("Image {path:?} has zero width or height")]
    ZeroSized { path: PathBuf },

    #[error("Failed to spawn preload thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Preload thread disconnected")]
    Disconnected,
}
