//! Activity classification of edges and nodes.
//!
//! Each edge's value is normalized against the range of its layer and
//! bucketed by a [`ThresholdPair`]. In absolute mode the value is the weight
//! itself; in delta mode it is the magnitude of the change since the previous
//! epoch, so the connections that moved the most light up. Nodes average the
//! activity of their classified incident edges.

use std::collections::HashMap;

use log::debug;
use serde::Serialize;

use crate::config::{ThresholdPair, Thresholds};
use crate::error::Result;
use crate::layout::{EdgeKey, Layout, NodeKey};
use crate::weights::WeightSet;

/// Activity bucket, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum ActivityColor {
    #[default]
    Default,
    LowActivity,
    HighActivity,
}

impl ActivityColor {
    pub fn activity(self) -> f32 {
        match self {
            ActivityColor::Default => 0.0,
            ActivityColor::LowActivity => 0.5,
            ActivityColor::HighActivity => 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ColorClassification {
    pub color: ActivityColor,
    /// In `[0, 1]`. For nodes, the mean over classified incident edges.
    pub activity: f32,
}

impl ColorClassification {
    pub fn bucket(color: ActivityColor) -> Self {
        Self {
            color,
            activity: color.activity(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.color == ActivityColor::Default
    }

    /// Opacity for drawing a node: unclassified nodes stay fully opaque.
    pub fn opacity(&self) -> f32 {
        if self.is_default() { 1.0 } else { self.activity }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ClassifyMode {
    /// Position of each weight inside its layer's range.
    Absolute,
    /// Position of `|weight - previous|` inside its layer's range of changes.
    Delta,
}

/// A layer whose values were all equal, so no edge in it could be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DegenerateRange {
    pub layer: usize,
}

/// Per-bucket edge counts of a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ActivitySummary {
    pub default: usize,
    pub low: usize,
    pub high: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub mode: ClassifyMode,
    pub edges: HashMap<EdgeKey, ColorClassification>,
    pub nodes: HashMap<NodeKey, ColorClassification>,
    pub degenerate: Vec<DegenerateRange>,
}

impl Classification {
    pub fn edge(&self, key: EdgeKey) -> ColorClassification {
        self.edges.get(&key).copied().unwrap_or_default()
    }

    pub fn node(&self, key: NodeKey) -> ColorClassification {
        self.nodes.get(&key).copied().unwrap_or_default()
    }

    pub fn summary(&self) -> ActivitySummary {
        let mut summary = ActivitySummary::default();
        for class in self.edges.values() {
            match class.color {
                ActivityColor::Default => summary.default += 1,
                ActivityColor::LowActivity => summary.low += 1,
                ActivityColor::HighActivity => summary.high += 1,
            }
        }
        summary
    }
}

/// Buckets a normalized value. Values exactly on a threshold take the upper bucket.
pub fn bucket(percentage: f32, thresholds: ThresholdPair) -> ActivityColor {
    if percentage >= thresholds.high {
        ActivityColor::HighActivity
    } else if percentage >= thresholds.low {
        ActivityColor::LowActivity
    } else {
        ActivityColor::Default
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WeightColorizer {
    thresholds: Thresholds,
}

#[derive(Clone, Copy)]
struct Range {
    min: f32,
    max: f32,
}

impl Range {
    fn widen(range: Option<Range>, value: f32) -> Range {
        match range {
            None => Range {
                min: value,
                max: value,
            },
            Some(r) => Range {
                min: r.min.min(value),
                max: r.max.max(value),
            },
        }
    }

    fn normalize(&self, value: f32) -> Option<f32> {
        let span = self.max - self.min;
        (span.is_finite() && span > 0.0).then(|| (value - self.min) / span)
    }
}

#[derive(Default)]
struct NodeTally {
    sum: f32,
    count: usize,
    color: ActivityColor,
}

impl NodeTally {
    fn add(&mut self, class: ColorClassification) {
        self.sum += class.activity;
        self.count += 1;
        self.color = self.color.max(class.color);
    }
}

impl WeightColorizer {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Classifies every edge and node of `layout`.
    ///
    /// With `previous` the classification runs in delta mode. Edges missing
    /// from either weight set stay `Default`. Weights that reference edges
    /// outside the layout are rejected.
    pub fn classify(
        &self,
        layout: &Layout,
        weights: &WeightSet,
        previous: Option<&WeightSet>,
    ) -> Result<Classification> {
        weights.validate_against(layout)?;
        if let Some(previous) = previous {
            previous.validate_against(layout)?;
        }

        let (mode, thresholds) = match previous {
            None => (ClassifyMode::Absolute, self.thresholds.absolute),
            Some(_) => (ClassifyMode::Delta, self.thresholds.delta),
        };
        let sample = |key: EdgeKey| -> Option<f32> {
            let value = weights.get(key)?;
            let sample = match previous {
                None => value,
                Some(previous) => (value - previous.get(key)?).abs(),
            };
            sample.is_finite().then_some(sample)
        };

        let mut ranges: HashMap<usize, Range> = HashMap::new();
        for edge in &layout.edges {
            if let Some(value) = sample(edge.key()) {
                let range = ranges.get(&edge.layer_index).copied();
                ranges.insert(edge.layer_index, Range::widen(range, value));
            }
        }

        let mut degenerate: Vec<DegenerateRange> = ranges
            .iter()
            .filter(|(_, r)| r.normalize(r.max).is_none())
            .map(|(&layer, _)| DegenerateRange { layer })
            .collect();
        degenerate.sort_by_key(|d| d.layer);
        for d in &degenerate {
            debug!("layer {} has a degenerate {mode:?} range, leaving it unclassified", d.layer);
        }

        let mut edges = HashMap::with_capacity(layout.edges.len());
        let mut tallies: HashMap<NodeKey, NodeTally> = HashMap::new();
        for edge in &layout.edges {
            let key = edge.key();
            let color = sample(key)
                .zip(ranges.get(&edge.layer_index))
                .and_then(|(value, range)| range.normalize(value))
                .map_or(ActivityColor::Default, |p| bucket(p, thresholds));
            let class = ColorClassification::bucket(color);
            if !class.is_default() {
                tallies.entry(key.source_node()).or_default().add(class);
                tallies.entry(key.target_node()).or_default().add(class);
            }
            edges.insert(key, class);
        }

        let nodes = layout
            .nodes
            .iter()
            .map(|node| {
                let class = tallies.get(&node.key()).map_or_else(
                    ColorClassification::default,
                    |t| ColorClassification {
                        color: t.color,
                        activity: t.sum / t.count as f32,
                    },
                );
                (node.key(), class)
            })
            .collect();

        Ok(Classification {
            mode,
            edges,
            nodes,
            degenerate,
        })
    }
}
