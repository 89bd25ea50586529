//! User-toggled ablated units and the request that reports them to the backend.

use serde::{Deserialize, Serialize};

use crate::layout::{LayoutEdge, NodeKey};

/// Units the user detached from the network. Node counts stay in the low
/// hundreds, so membership is a linear scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AblationSet {
    nodes: Vec<NodeKey>,
}

impl AblationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `key` if absent, removes it otherwise.
    pub fn toggle(&mut self, key: NodeKey) -> &AblationSet {
        match self.nodes.iter().position(|n| *n == key) {
            Some(i) => {
                self.nodes.remove(i);
            }
            None => self.nodes.push(key),
        }
        self
    }

    pub fn is_ablated(&self, key: NodeKey) -> bool {
        self.nodes.contains(&key)
    }

    /// Whether either endpoint of `edge` is ablated.
    pub fn touches_edge(&self, edge: &LayoutEdge) -> bool {
        let key = edge.key();
        self.is_ablated(key.source_node()) || self.is_ablated(key.target_node())
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeKey> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Groups the ablated units by layer, both sorted ascending.
    pub fn to_request(&self, network_id: impl Into<String>) -> AblationRequest {
        let mut keys = self.nodes.clone();
        keys.sort();
        let mut nodes: Vec<AblatedLayer> = Vec::new();
        for key in keys {
            match nodes.last_mut() {
                Some(last) if last.layer_number == key.layer => last.ablated_units.push(key.unit),
                _ => nodes.push(AblatedLayer {
                    layer_number: key.layer,
                    ablated_units: vec![key.unit],
                }),
            }
        }
        AblationRequest {
            network_id: network_id.into(),
            nodes,
        }
    }
}

/// Body of the backend's ablation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AblationRequest {
    #[serde(rename = "networkID")]
    pub network_id: String,
    pub nodes: Vec<AblatedLayer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AblatedLayer {
    #[serde(rename = "layerNumber")]
    pub layer_number: usize,
    #[serde(rename = "ablatedWeights")]
    pub ablated_units: Vec<usize>,
}
