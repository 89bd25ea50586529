//! Style constants and classification thresholds.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VizError};

/// Sizes used to pack units into columns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutStyle {
    /// Side of the square tile drawn for a conv unit.
    pub conv_tile_size: f32,
    /// Radius of the circle drawn for a dense unit.
    pub node_radius: f32,
    /// Gap between neighbouring tiles or circles.
    pub unit_gutter: f32,
}

impl Default for LayoutStyle {
    fn default() -> Self {
        Self {
            conv_tile_size: 20.0,
            node_radius: 10.0,
            unit_gutter: 5.0,
        }
    }
}

impl LayoutStyle {
    pub fn new(conv_tile_size: f32, node_radius: f32, unit_gutter: f32) -> Self {
        Self {
            conv_tile_size,
            node_radius,
            unit_gutter,
        }
    }

    /// Diameter of a dense unit.
    pub fn dense_tile_size(&self) -> f32 {
        2.0 * self.node_radius
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("convTileSize", self.conv_tile_size),
            ("nodeRadius", self.node_radius),
            ("unitGutter", self.unit_gutter),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(VizError::InvalidConfig(format!(
                    "{name} must be a finite, non-negative size, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Lower and upper percentage bounds of the two activity buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub low: f32,
    pub high: f32,
}

impl ThresholdPair {
    pub const ABSOLUTE: ThresholdPair = ThresholdPair {
        low: 0.85,
        high: 0.90,
    };
    pub const DELTA: ThresholdPair = ThresholdPair {
        low: 0.6,
        high: 0.9,
    };

    pub fn validate(&self, name: &str) -> Result<()> {
        let in_unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
        if !in_unit(self.low) || !in_unit(self.high) || self.low > self.high {
            return Err(VizError::InvalidConfig(format!(
                "{name} thresholds must satisfy 0 <= low <= high <= 1, got ({}, {})",
                self.low, self.high
            )));
        }
        Ok(())
    }
}

/// Threshold pairs for both classification modes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub absolute: ThresholdPair,
    pub delta: ThresholdPair,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            absolute: ThresholdPair::ABSOLUTE,
            delta: ThresholdPair::DELTA,
        }
    }
}

/// Everything a visualization session can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VizConfig {
    pub style: LayoutStyle,
    pub thresholds: Thresholds,
    /// Quiet period before a resize triggers a relayout.
    pub resize_debounce_ms: u64,
}

impl Default for VizConfig {
    fn default() -> Self {
        Self {
            style: LayoutStyle::default(),
            thresholds: Thresholds::default(),
            resize_debounce_ms: 500,
        }
    }
}

impl VizConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: VizConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.style.validate()?;
        self.thresholds.absolute.validate("absolute")?;
        self.thresholds.delta.validate("delta")?;
        Ok(())
    }

    pub fn resize_debounce(&self) -> Duration {
        Duration::from_millis(self.resize_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_layer_view_settings() {
        let config = VizConfig::default();
        assert_eq!(config.style.conv_tile_size, 20.0);
        assert_eq!(config.style.node_radius, 10.0);
        assert_eq!(config.style.unit_gutter, 5.0);
        assert_eq!(config.style.dense_tile_size(), 20.0);
        assert_eq!(config.resize_debounce(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            VizConfig::from_json_str(r#"{ "style": { "nodeRadius": 6 }, "resizeDebounceMs": 200 }"#)
                .unwrap();
        assert_eq!(config.style.node_radius, 6.0);
        assert_eq!(config.style.conv_tile_size, 20.0);
        assert_eq!(config.thresholds, Thresholds::default());
        assert_eq!(config.resize_debounce_ms, 200);
    }

    #[test]
    fn rejects_negative_style() {
        let err = VizConfig::from_json_str(r#"{ "style": { "unitGutter": -1 } }"#).unwrap_err();
        assert!(matches!(err, VizError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let json = r#"{ "thresholds": { "delta": { "low": 0.95, "high": 0.5 } } }"#;
        assert!(matches!(
            VizConfig::from_json_str(json),
            Err(VizError::InvalidConfig(_))
        ));
    }

    #[test]
    fn malformed_json_is_a_json_error() {
        assert!(matches!(
            VizConfig::from_json_str("{ style: "),
            Err(VizError::Json(_))
        ));
    }
}
