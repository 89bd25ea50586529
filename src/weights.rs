//! Flattens the data provider's per-layer weight matrices into edge-keyed maps.

use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::error::{Result, VizError};
use crate::layout::{EdgeKey, Layout};
use crate::shape::NetworkShape;

/// Weight matrices of one epoch, `matrix[target][source]`, keyed as
/// described on [`NetworkShape::weight_key`].
pub type LayerWeights = BTreeMap<String, Vec<Vec<f32>>>;

/// Key the provider uses for weights coming from the raw input.
pub const INPUT_KEY: &str = "input";

/// One scalar per edge for a single epoch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightSet {
    values: HashMap<EdgeKey, f32>,
}

impl WeightSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens per-layer matrices against `shape`.
    ///
    /// The `input` matrix connects the raw input, which has no units in the
    /// layout, and the self-loop matrix of the last hidden layer has no edges
    /// to draw. Both are skipped.
    pub fn from_layer_map(shape: &NetworkShape, layers: &LayerWeights) -> Result<Self> {
        let self_loop = shape.self_loop_key();
        let mut values = HashMap::new();
        for (key, matrix) in layers {
            if key == INPUT_KEY {
                debug!("skipping weights from the raw input");
                continue;
            }
            if self_loop.as_deref() == Some(key.as_str()) {
                debug!("skipping '{key}', it maps the last hidden layer onto itself");
                continue;
            }
            let source_layer = shape.weight_source_for_key(key).ok_or_else(|| {
                VizError::mismatch(
                    format!("layer key '{key}'"),
                    format!("one of {:?}", known_keys(shape)),
                    key,
                )
            })?;

            let target_layer = source_layer + 1;
            let targets = shape.layers()[target_layer].unit_count;
            let sources = shape.layers()[source_layer].unit_count;
            if matrix.len() != targets {
                return Err(VizError::mismatch(
                    format!("rows of '{key}'"),
                    targets,
                    matrix.len(),
                ));
            }
            for (target, row) in matrix.iter().enumerate() {
                if row.len() != sources {
                    return Err(VizError::mismatch(
                        format!("row {target} of '{key}'"),
                        sources,
                        row.len(),
                    ));
                }
                for (source, &value) in row.iter().enumerate() {
                    values.insert(EdgeKey::new(source_layer, source, target), value);
                }
            }
        }
        Ok(Self { values })
    }

    pub fn insert(&mut self, key: EdgeKey, value: f32) -> Option<f32> {
        self.values.insert(key, value)
    }

    pub fn get(&self, key: EdgeKey) -> Option<f32> {
        self.values.get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EdgeKey, f32)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }

    /// Rejects weights that reference edges the layout's network does not
    /// have, which happens when weights of one network are paired with
    /// another's layout. Edges of layers left unplaced at the current
    /// viewport size are still part of the network.
    pub fn validate_against(&self, layout: &Layout) -> Result<()> {
        let stray = self
            .values
            .keys()
            .filter(|key| !layout.spans_edge(**key))
            .min();
        if let Some(key) = stray {
            let expected = layout
                .layer(key.layer)
                .zip(layout.layer(key.layer + 1))
                .map_or_else(
                    || format!("{} layers", layout.layers.len()),
                    |(from, to)| format!("{}x{} units", from.unit_count, to.unit_count),
                );
            return Err(VizError::mismatch(
                format!("weights of layer {}", key.layer),
                expected,
                format!("edge {}->{}", key.source, key.target),
            ));
        }
        Ok(())
    }
}

impl FromIterator<(EdgeKey, f32)> for WeightSet {
    fn from_iter<I: IntoIterator<Item = (EdgeKey, f32)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn known_keys(shape: &NetworkShape) -> Vec<String> {
    (0..shape.len()).filter_map(|i| shape.weight_key(i)).collect()
}

/// Weight sets of consecutive training epochs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightHistory {
    epochs: Vec<WeightSet>,
    labels: Vec<String>,
}

impl WeightHistory {
    /// Orders the provider's epoch map and flattens every epoch.
    ///
    /// Epoch keys are sorted by their trailing number, so `"10"` comes after
    /// `"9"` and `"epoch_2"` after `"epoch_1"`; keys without a number keep
    /// their lexical order after the numbered ones.
    pub fn from_epoch_map(
        shape: &NetworkShape,
        epochs: &BTreeMap<String, LayerWeights>,
    ) -> Result<Self> {
        let mut ordered: Vec<(&String, &LayerWeights)> = epochs.iter().collect();
        ordered.sort_by_key(|(label, _)| (epoch_number(label).is_none(), epoch_number(label)));

        let mut history = Self::default();
        for (label, layers) in ordered {
            history.push(label.clone(), WeightSet::from_layer_map(shape, layers)?);
        }
        Ok(history)
    }

    /// Parses `{ "<epoch>": { "<layer key>": [[f32]] } }`.
    pub fn from_json_str(shape: &NetworkShape, json: &str) -> Result<Self> {
        let epochs: BTreeMap<String, LayerWeights> = serde_json::from_str(json)?;
        Self::from_epoch_map(shape, &epochs)
    }

    pub fn push(&mut self, label: impl Into<String>, weights: WeightSet) {
        self.labels.push(label.into());
        self.epochs.push(weights);
    }

    pub fn epoch(&self, index: usize) -> Option<&WeightSet> {
        self.epochs.get(index)
    }

    /// Epoch before `index`, the baseline of delta classification.
    pub fn previous(&self, index: usize) -> Option<&WeightSet> {
        index.checked_sub(1).and_then(|i| self.epochs.get(i))
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WeightSet> {
        self.epochs.iter()
    }
}

fn epoch_number(label: &str) -> Option<u64> {
    let digits = label.len() - label.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    label[label.len() - digits..].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: usize, cols: usize, base: f32) -> Vec<Vec<f32>> {
        (0..rows)
            .map(|r| (0..cols).map(|c| base + (r * cols + c) as f32).collect())
            .collect()
    }

    #[test]
    fn flattens_destination_major_matrices() {
        let shape = NetworkShape::new(&[2], &[3, 4]);
        let mut layers = LayerWeights::new();
        layers.insert("input".into(), matrix(2, 784, 0.0));
        layers.insert("c1".into(), matrix(3, 2, 100.0));
        layers.insert("h1".into(), matrix(3, 3, 0.0));
        layers.insert("output".into(), matrix(4, 3, 200.0));

        let weights = WeightSet::from_layer_map(&shape, &layers).unwrap();
        assert_eq!(weights.len(), 3 * 2 + 4 * 3);
        // c1[target 2][source 1] = 100 + 2 * 2 + 1
        assert_eq!(weights.get(EdgeKey::new(0, 1, 2)), Some(105.0));
        // output[target 3][source 0] = 200 + 3 * 3
        assert_eq!(weights.get(EdgeKey::new(1, 0, 3)), Some(209.0));
        assert_eq!(weights.get(EdgeKey::new(2, 0, 0)), None);
    }

    #[test]
    fn reads_backend_mlp_weights() {
        // Hidden layers [3, 2] plus the 10-unit output layer.
        let shape = NetworkShape::new(&[], &[3, 2, 10]);
        let mut layers = LayerWeights::new();
        layers.insert("input".into(), matrix(3, 784, 0.0));
        layers.insert("h1".into(), matrix(2, 3, 10.0));
        layers.insert("h2".into(), matrix(2, 2, 0.0));
        layers.insert("output".into(), matrix(10, 2, 50.0));

        let weights = WeightSet::from_layer_map(&shape, &layers).unwrap();
        assert_eq!(weights.len(), 2 * 3 + 10 * 2);
        // h1[target 1][source 2] = 10 + 1 * 3 + 2
        assert_eq!(weights.get(EdgeKey::new(0, 2, 1)), Some(15.0));
        // output[target 9][source 1] = 50 + 9 * 2 + 1
        assert_eq!(weights.get(EdgeKey::new(1, 1, 9)), Some(69.0));

        let mut hidden_only = LayerWeights::new();
        hidden_only.insert("h1".into(), matrix(2, 3, 0.0));
        let weights = WeightSet::from_layer_map(&shape, &hidden_only).unwrap();
        assert_eq!(weights.len(), 6);
        assert!(weights.iter().all(|(key, _)| key.layer == 0));
    }

    #[test]
    fn unknown_layer_key_is_a_mismatch() {
        let shape = NetworkShape::new(&[], &[3, 4]);
        let mut layers = LayerWeights::new();
        layers.insert("h7".into(), matrix(3, 2, 0.0));
        let err = WeightSet::from_layer_map(&shape, &layers).unwrap_err();
        assert!(matches!(err, VizError::DimensionMismatch { .. }));
    }

    #[test]
    fn wrong_matrix_size_is_a_mismatch() {
        let shape = NetworkShape::new(&[], &[3, 4]);
        let mut rows = LayerWeights::new();
        rows.insert("output".into(), matrix(5, 3, 0.0));
        assert!(WeightSet::from_layer_map(&shape, &rows).is_err());

        let mut cols = LayerWeights::new();
        cols.insert("output".into(), matrix(4, 2, 0.0));
        assert!(WeightSet::from_layer_map(&shape, &cols).is_err());
    }

    #[test]
    fn epochs_sort_numerically() {
        let shape = NetworkShape::new(&[], &[1, 1]);
        let json = r#"{
            "10": { "output": [[10.0]] },
            "2":  { "output": [[2.0]] },
            "1":  { "output": [[1.0]] }
        }"#;
        let history = WeightHistory::from_json_str(&shape, json).unwrap();
        assert_eq!(history.len(), 3);
        let firsts: Vec<f32> = history
            .iter()
            .map(|w| w.get(EdgeKey::new(0, 0, 0)).unwrap())
            .collect();
        assert_eq!(firsts, [1.0, 2.0, 10.0]);
        assert_eq!(history.label(2), Some("10"));
        assert!(history.previous(0).is_none());
        assert_eq!(history.previous(2).unwrap().get(EdgeKey::new(0, 0, 0)), Some(2.0));
    }

    #[test]
    fn epoch_labels_with_prefix() {
        assert_eq!(epoch_number("epoch_12"), Some(12));
        assert_eq!(epoch_number("7"), Some(7));
        assert_eq!(epoch_number("final"), None);
    }

    #[test]
    fn validate_against_detects_stale_weights() {
        use crate::config::LayoutStyle;
        use crate::geometry::Viewport;
        use crate::layout::compute_layout;

        let small = NetworkShape::new(&[], &[2, 2]);
        let viewport = Viewport::new(400.0, 400.0);
        let layout = compute_layout(&small, viewport, LayoutStyle::default()).unwrap();

        let ok: WeightSet = [(EdgeKey::new(0, 1, 1), 0.5)].into_iter().collect();
        assert!(ok.validate_against(&layout).is_ok());

        let stale: WeightSet = [(EdgeKey::new(0, 0, 2), 0.5)].into_iter().collect();
        assert!(matches!(
            stale.validate_against(&layout),
            Err(VizError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn weights_of_unplaced_layers_are_valid() {
        use crate::config::LayoutStyle;
        use crate::geometry::Viewport;
        use crate::layout::compute_layout;

        let shape = NetworkShape::new(&[2], &[3, 2]);
        let style = LayoutStyle::new(40.0, 5.0, 2.0);
        let layout = compute_layout(&shape, Viewport::new(30.0, 30.0), style).unwrap();
        assert_eq!(layout.nodes_in_layer(0).count(), 0);

        let mut layers = LayerWeights::new();
        layers.insert("c1".into(), matrix(3, 2, 0.0));
        let weights = WeightSet::from_layer_map(&shape, &layers).unwrap();
        assert!(weights.validate_against(&layout).is_ok());
    }
}
