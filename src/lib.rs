//! Layout and activity coloring for neural network ablation views.
//!
//! [`layout::TopologyLayoutEngine`] packs conv and dense units into columns,
//! [`colorize::WeightColorizer`] marks the connections whose weights (or
//! weight changes between epochs) stand out, and [`session::VizSession`]
//! keeps both in step with shape, viewport and ablation changes. Drawing is
//! left to the caller; [`geometry`] turns the abstract layout into pixels.

pub mod ablation;
pub mod colorize;
pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod model;
pub mod session;
pub mod shape;
pub mod weights;

pub use ablation::{AblationRequest, AblationSet};
pub use colorize::{
    ActivityColor, Classification, ClassifyMode, ColorClassification, WeightColorizer,
};
pub use config::{LayoutStyle, ThresholdPair, Thresholds, VizConfig};
pub use error::{Result, VizError};
pub use geometry::{Point, Viewport};
pub use layout::{
    EdgeKey, Layout, LayoutEdge, LayoutNode, NodeKey, TopologyLayoutEngine, compute_layout,
};
pub use session::{EpochSlider, VizSession};
pub use shape::{LayerDescriptor, LayerKind, NetworkShape};
pub use weights::{WeightHistory, WeightSet};
