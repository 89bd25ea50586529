use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::shape::NetworkShape;
use crate::weights::WeightHistory;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvLayerInfo {
    #[serde(rename = "outChannel")]
    pub out_channel: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub layer_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayerInfo {
    #[serde(rename = "unitCount")]
    pub unit_count: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activation: Option<String>,
}

/// Class count of the backend's classifier head.
pub const DEFAULT_OUTPUT_UNITS: i64 = 10;

fn default_output_units() -> i64 {
    DEFAULT_OUTPUT_UNITS
}

/// Network topology as served by the backend. `layers` lists the hidden
/// layers only; the output layer of `output_units` units follows them. An
/// `outputUnits` of 0 means `layers` already ends with the output layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyInfo {
    #[serde(default)]
    pub conv_layers: Vec<ConvLayerInfo>,
    #[serde(default)]
    pub layers: Vec<DenseLayerInfo>,
    #[serde(rename = "outputUnits", default = "default_output_units")]
    pub output_units: i64,
}

impl Default for TopologyInfo {
    fn default() -> Self {
        Self {
            conv_layers: Vec::new(),
            layers: Vec::new(),
            output_units: DEFAULT_OUTPUT_UNITS,
        }
    }
}

impl TopologyInfo {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn to_shape(&self) -> Result<NetworkShape> {
        let conv: Vec<i64> = self.conv_layers.iter().map(|l| l.out_channel).collect();
        let mut dense: Vec<i64> = self.layers.iter().map(|l| l.unit_count).collect();
        if self.output_units != 0 {
            dense.push(self.output_units);
        }
        NetworkShape::from_signed(&conv, &dense)
    }
}

/// Reads a weight history file for `shape`.
pub fn load_weight_history(shape: &NetworkShape, path: impl AsRef<Path>) -> Result<WeightHistory> {
    WeightHistory::from_json_str(shape, &std::fs::read_to_string(path)?)
}
