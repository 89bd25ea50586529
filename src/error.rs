//! Error types for layout, classification and data loading.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, VizError>;

/// Everything the layout engine, the colorizer and the data adapters can reject.
#[derive(Debug, Error)]
pub enum VizError {
    /// A layer descriptor or the layer ordering is invalid.
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// Weights reference a layer key or unit that the current layout does not have.
    #[error("dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Layer key or edge the mismatch was found on.
        context: String,
        /// What the layout provides.
        expected: String,
        /// What the weights supplied.
        actual: String,
    },

    /// A result computed for an older layout was offered to the renderer.
    #[error("stale layout: result belongs to generation {result}, current is {current}")]
    StaleLayout { result: u64, current: u64 },

    /// Output units stay attached.
    #[error("node {layer}:{unit} is an output unit and cannot be ablated")]
    NotAblatable { layer: usize, unit: usize },

    /// The network has no such unit.
    #[error("node {layer}:{unit} is not part of the network")]
    UnknownNode { layer: usize, unit: usize },

    /// Style, threshold or other configuration value out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl VizError {
    pub(crate) fn mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::DimensionMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
