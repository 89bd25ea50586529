//! Declared network shape: conv layers followed by dense layers.

use serde::{Deserialize, Serialize};

use crate::error::{Result, VizError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    /// Convolutional or pooling layer, drawn as square tiles.
    Conv,
    /// Fully connected layer, drawn as circles.
    Dense { is_output: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub kind: LayerKind,
    pub unit_count: usize,
}

impl LayerDescriptor {
    pub fn conv(unit_count: usize) -> Self {
        Self {
            kind: LayerKind::Conv,
            unit_count,
        }
    }

    pub fn dense(unit_count: usize, is_output: bool) -> Self {
        Self {
            kind: LayerKind::Dense { is_output },
            unit_count,
        }
    }

    pub fn is_conv(&self) -> bool {
        self.kind == LayerKind::Conv
    }

    pub fn is_output(&self) -> bool {
        self.kind == LayerKind::Dense { is_output: true }
    }
}

/// Ordered layer descriptors. Always conv layers first, then dense layers
/// ending in exactly one output layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetworkShape {
    layers: Vec<LayerDescriptor>,
}

impl NetworkShape {
    /// Builds a shape from plain unit counts. The last dense layer becomes the output.
    pub fn new(conv: &[usize], dense: &[usize]) -> Self {
        let mut layers: Vec<_> = conv.iter().map(|&n| LayerDescriptor::conv(n)).collect();
        layers.extend(
            dense
                .iter()
                .enumerate()
                .map(|(i, &n)| LayerDescriptor::dense(n, i + 1 == dense.len())),
        );
        Self { layers }
    }

    /// Like [`NetworkShape::new`] but for counts that came from untyped JSON.
    pub fn from_signed(conv: &[i64], dense: &[i64]) -> Result<Self> {
        let to_count = |kind: &str, index: usize, n: i64| {
            usize::try_from(n).map_err(|_| {
                VizError::InvalidShape(format!("{kind} layer {index} has unit count {n}"))
            })
        };
        let conv = conv
            .iter()
            .enumerate()
            .map(|(i, &n)| to_count("conv", i, n))
            .collect::<Result<Vec<_>>>()?;
        let dense = dense
            .iter()
            .enumerate()
            .map(|(i, &n)| to_count("dense", i, n))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(&conv, &dense))
    }

    pub fn from_descriptors(layers: Vec<LayerDescriptor>) -> Result<Self> {
        let shape = Self { layers };
        shape.validate()?;
        Ok(shape)
    }

    /// Checks the ordering invariants.
    pub fn validate(&self) -> Result<()> {
        let first_dense = self
            .layers
            .iter()
            .position(|l| !l.is_conv())
            .unwrap_or(self.layers.len());
        if let Some(i) = self.layers[first_dense..].iter().position(|l| l.is_conv()) {
            return Err(VizError::InvalidShape(format!(
                "conv layer at index {} follows a dense layer",
                first_dense + i
            )));
        }

        let dense = &self.layers[first_dense..];
        if let Some((last, hidden)) = dense.split_last() {
            if !last.is_output() {
                return Err(VizError::InvalidShape(
                    "the last dense layer must be the output layer".into(),
                ));
            }
            if let Some(i) = hidden.iter().position(|l| l.is_output()) {
                return Err(VizError::InvalidShape(format!(
                    "dense layer at index {} is marked as output but is not last",
                    first_dense + i
                )));
            }
        }
        Ok(())
    }

    /// Fails for an empty shape, for callers that need a network to show.
    pub fn require_populated(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(VizError::InvalidShape("network has no layers".into()));
        }
        Ok(())
    }

    pub fn layers(&self) -> &[LayerDescriptor] {
        &self.layers
    }

    pub fn layer(&self, index: usize) -> Option<&LayerDescriptor> {
        self.layers.get(index)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn conv_count(&self) -> usize {
        self.layers.iter().filter(|l| l.is_conv()).count()
    }

    pub fn dense_count(&self) -> usize {
        self.layers.len() - self.conv_count()
    }

    pub fn total_units(&self) -> usize {
        self.layers.iter().map(|l| l.unit_count).sum()
    }

    /// Dense layers before the output layer.
    pub fn hidden_count(&self) -> usize {
        self.dense_count().saturating_sub(1)
    }

    /// Name the data provider uses for the weights leaving layer `source`:
    /// `c<N>` out of the N-th conv layer, `h<N>` out of the N-th hidden layer
    /// into the next hidden one, and `output` for the weights into the output
    /// layer. `None` for the last layer, which has no outgoing weights.
    pub fn weight_key(&self, source: usize) -> Option<String> {
        let target = self.layers.get(source.checked_add(1)?)?;
        let key = if target.is_output() {
            "output".to_string()
        } else if self.layers[source].is_conv() {
            format!("c{}", source + 1)
        } else {
            format!("h{}", source - self.conv_count() + 1)
        };
        Some(key)
    }

    /// Source layer of the weights named `key`, the inverse of [`NetworkShape::weight_key`].
    pub fn weight_source_for_key(&self, key: &str) -> Option<usize> {
        if key == "output" {
            let output = self.layers.iter().position(|l| l.is_output())?;
            return output.checked_sub(1);
        }
        let (prefix, number) = key.split_at_checked(1)?;
        let n: usize = number.parse().ok()?;
        let source = match prefix {
            "c" if (1..=self.conv_count()).contains(&n) => n - 1,
            "h" if n >= 1 => self.conv_count().checked_add(n - 1)?,
            _ => return None,
        };
        (self.weight_key(source)? == key).then_some(source)
    }

    /// Key of the square matrix the backend keeps after the last hidden
    /// layer. It maps that layer onto itself and has no edges in the view.
    pub fn self_loop_key(&self) -> Option<String> {
        let hidden = self.hidden_count();
        (hidden > 0).then(|| format!("h{hidden}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_marks_last_dense_as_output() {
        let shape = NetworkShape::new(&[4, 8], &[6, 10]);
        assert_eq!(shape.len(), 4);
        assert_eq!(shape.conv_count(), 2);
        assert_eq!(shape.dense_count(), 2);
        assert!(shape.layers()[3].is_output());
        assert!(!shape.layers()[2].is_output());
        assert!(shape.validate().is_ok());
        assert_eq!(shape.total_units(), 28);
    }

    #[test]
    fn negative_unit_count_is_invalid() {
        let err = NetworkShape::from_signed(&[4], &[-1, 10]).unwrap_err();
        assert!(matches!(err, VizError::InvalidShape(_)));
    }

    #[test]
    fn conv_after_dense_is_invalid() {
        let layers = vec![
            LayerDescriptor::dense(4, false),
            LayerDescriptor::conv(3),
            LayerDescriptor::dense(10, true),
        ];
        assert!(NetworkShape::from_descriptors(layers).is_err());
    }

    #[test]
    fn output_must_be_last_and_unique() {
        let missing = vec![LayerDescriptor::conv(2), LayerDescriptor::dense(4, false)];
        assert!(NetworkShape::from_descriptors(missing).is_err());

        let early = vec![
            LayerDescriptor::dense(4, true),
            LayerDescriptor::dense(10, true),
        ];
        assert!(NetworkShape::from_descriptors(early).is_err());

        let conv_only = vec![LayerDescriptor::conv(2), LayerDescriptor::conv(3)];
        assert!(NetworkShape::from_descriptors(conv_only).is_ok());
    }

    #[test]
    fn empty_shape_is_valid_but_not_populated() {
        let shape = NetworkShape::default();
        assert!(shape.validate().is_ok());
        assert!(shape.require_populated().is_err());
    }

    #[test]
    fn weight_keys_name_the_source_layer() {
        let shape = NetworkShape::new(&[4, 8], &[6, 5, 10]);
        let keys: Vec<_> = (0..shape.len()).map(|i| shape.weight_key(i)).collect();
        assert_eq!(
            keys,
            [
                Some("c1".to_string()),
                Some("c2".to_string()),
                Some("h1".to_string()),
                Some("output".to_string()),
                None
            ]
        );
        for (i, key) in keys.iter().flatten().enumerate() {
            assert_eq!(shape.weight_source_for_key(key), Some(i));
        }
        assert_eq!(shape.hidden_count(), 2);
        assert_eq!(shape.self_loop_key().as_deref(), Some("h2"));
        assert_eq!(shape.weight_source_for_key("h2"), None);
        assert_eq!(shape.weight_source_for_key("c0"), None);
        assert_eq!(shape.weight_source_for_key("c3"), None);
        assert_eq!(shape.weight_source_for_key("h01"), None);
        assert_eq!(shape.weight_source_for_key("input"), None);
    }

    #[test]
    fn last_conv_feeds_the_output_without_hidden_layers() {
        let shape = NetworkShape::new(&[3], &[10]);
        assert_eq!(shape.weight_key(0).as_deref(), Some("output"));
        assert_eq!(shape.weight_source_for_key("output"), Some(0));
        assert_eq!(shape.weight_source_for_key("c1"), None);
        assert_eq!(shape.self_loop_key(), None);

        let output_only = NetworkShape::new(&[], &[10]);
        assert_eq!(output_only.weight_source_for_key("output"), None);
    }
}
