//! Column packing of network units.
//!
//! The engine turns a [`NetworkShape`] and a viewport into abstract
//! coordinates: each unit gets a layer index, a column index and the vertical
//! spacing of its column. Pixel positions are left to [`crate::geometry`].
//!
//! Layers are packed into the largest centered square of the viewport. A
//! column holds `floor((side + gutter) / (tile + gutter))` units; the units
//! that do not fit spill into further columns, numbered from
//! [`first_column`]. Full columns spread their units over the whole side, and
//! so does the last column when it is only partially filled, which makes its
//! spacing wider.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::LayoutStyle;
use crate::error::Result;
use crate::geometry::Viewport;
use crate::shape::NetworkShape;

/// Identifies one unit of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey {
    pub layer: usize,
    pub unit: usize,
}

impl NodeKey {
    pub fn new(layer: usize, unit: usize) -> Self {
        Self { layer, unit }
    }
}

/// Identifies the connection from `source` in `layer` to `target` in `layer + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub layer: usize,
    pub source: usize,
    pub target: usize,
}

impl EdgeKey {
    pub fn new(layer: usize, source: usize, target: usize) -> Self {
        Self {
            layer,
            source,
            target,
        }
    }

    pub fn source_node(&self) -> NodeKey {
        NodeKey::new(self.layer, self.source)
    }

    pub fn target_node(&self) -> NodeKey {
        NodeKey::new(self.layer + 1, self.target)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutNode {
    pub layer_index: usize,
    pub unit_index: usize,
    pub column: i32,
    pub unit_spacing: f32,
    pub units_per_column: usize,
    pub is_output: bool,
    pub is_conv: bool,
}

impl LayoutNode {
    pub fn key(&self) -> NodeKey {
        NodeKey::new(self.layer_index, self.unit_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayoutEdge {
    pub layer_index: usize,
    pub source_unit_index: usize,
    pub target_unit_index: usize,
    pub source_column: i32,
    pub target_column: i32,
    pub source_unit_spacing: f32,
    pub target_unit_spacing: f32,
    /// Units per column of the source layer.
    pub units_per_column: usize,
    pub target_units_per_column: usize,
}

impl LayoutEdge {
    pub fn key(&self) -> EdgeKey {
        EdgeKey::new(
            self.layer_index,
            self.source_unit_index,
            self.target_unit_index,
        )
    }
}

/// Per-layer packing result, everything needed to place the layer's units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LayerGeometry {
    pub layer_index: usize,
    pub unit_count: usize,
    pub is_conv: bool,
    pub is_output: bool,
    /// Side of a conv tile or diameter of a dense circle.
    pub tile_size: f32,
    /// 0 when the tile does not fit the viewport; such a layer has no nodes.
    pub units_per_column: usize,
    pub total_columns: usize,
    pub first_column: i32,
    /// Spacing of full columns.
    pub unit_spacing: f32,
    /// Spacing of the last column, wider when it is only partially filled.
    pub last_column_spacing: f32,
}

impl LayerGeometry {
    fn pack(
        layer_index: usize,
        unit_count: usize,
        is_conv: bool,
        is_output: bool,
        tile_size: f32,
        gutter: f32,
        min_dimension: f32,
    ) -> Self {
        let units_per_column = pack_column(min_dimension, tile_size, gutter);
        let total_columns = total_columns(unit_count, units_per_column);
        let (unit_spacing, last_column_spacing) = if units_per_column == 0 {
            (0.0, 0.0)
        } else {
            let standard = min_dimension / units_per_column as f32;
            let remainder = unit_count % units_per_column;
            let last = if remainder == 0 {
                standard
            } else {
                min_dimension / remainder as f32
            };
            (standard, last)
        };

        Self {
            layer_index,
            unit_count,
            is_conv,
            is_output,
            tile_size,
            units_per_column,
            total_columns,
            first_column: first_column(total_columns),
            unit_spacing,
            last_column_spacing,
        }
    }

    /// Whether units of this layer can be placed at all.
    pub fn is_placeable(&self) -> bool {
        self.units_per_column > 0
    }

    pub fn column_of(&self, unit: usize) -> i32 {
        match self.units_per_column {
            0 => self.first_column,
            n => self.first_column + (unit / n) as i32,
        }
    }

    /// Position of the unit inside its column, counted from the top.
    pub fn row_of(&self, unit: usize) -> usize {
        match self.units_per_column {
            0 => 0,
            n => unit % n,
        }
    }

    pub fn spacing_of(&self, unit: usize) -> f32 {
        if self.units_per_column == 0 {
            return 0.0;
        }
        let last = self.first_column + self.total_columns as i32 - 1;
        if self.column_of(unit) == last {
            self.last_column_spacing
        } else {
            self.unit_spacing
        }
    }

    /// Horizontal offset of `column` from the layer axis, in tile widths.
    /// The columns of a layer map onto offsets symmetric around zero.
    pub fn centered_offset(&self, column: i32) -> f32 {
        let half_span = (self.total_columns as f32 - 1.0) / 2.0;
        (column - self.first_column) as f32 - half_span
    }
}

/// Output of [`TopologyLayoutEngine::compute`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Layout {
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
    pub layers: Vec<LayerGeometry>,
    pub layer_spacing: f32,
    pub min_dimension: f32,
    pub top_margin: f32,
    pub left_margin: f32,
    /// Gap between tiles, needed to turn column offsets into pixels.
    pub unit_gutter: f32,
}

impl Layout {
    pub fn layer(&self, index: usize) -> Option<&LayerGeometry> {
        self.layers.get(index)
    }

    pub fn node(&self, key: NodeKey) -> Option<&LayoutNode> {
        self.nodes.iter().find(|n| n.key() == key)
    }

    /// Whether the edge is placed in this layout.
    pub fn contains_edge(&self, key: EdgeKey) -> bool {
        self.edge_count_between(key.layer) > 0
            && self.placeable_units(key.layer) > key.source
            && self.placeable_units(key.layer + 1) > key.target
    }

    /// Whether the network behind this layout has the edge, placed or not.
    pub fn spans_edge(&self, key: EdgeKey) -> bool {
        let units = |layer: usize| self.layers.get(layer).map_or(0, |g| g.unit_count);
        key.source < units(key.layer) && key.target < units(key.layer + 1)
    }

    /// Whether the network behind this layout has the unit, placed or not.
    pub fn spans_node(&self, key: NodeKey) -> bool {
        self.layers.get(key.layer).is_some_and(|g| key.unit < g.unit_count)
    }

    pub fn nodes_in_layer(&self, layer: usize) -> impl Iterator<Item = &LayoutNode> {
        self.nodes.iter().filter(move |n| n.layer_index == layer)
    }

    /// Number of edges from `layer` to `layer + 1`.
    pub fn edge_count_between(&self, layer: usize) -> usize {
        self.placeable_units(layer) * self.placeable_units(layer + 1)
    }

    fn placeable_units(&self, layer: usize) -> usize {
        self.layers
            .get(layer)
            .filter(|g| g.is_placeable())
            .map_or(0, |g| g.unit_count)
    }
}

/// `floor((min_dimension + gutter) / (tile_size + gutter))`, or 0 when nothing fits.
pub fn pack_column(min_dimension: f32, tile_size: f32, gutter: f32) -> usize {
    let step = tile_size + gutter;
    if !min_dimension.is_finite() || min_dimension <= 0.0 || !step.is_finite() || step <= 0.0 {
        return 0;
    }
    ((min_dimension + gutter) / step).floor() as usize
}

/// `ceil(unit_count / units_per_column)`, never less than 1.
pub fn total_columns(unit_count: usize, units_per_column: usize) -> usize {
    match units_per_column {
        0 => 1,
        n => unit_count.div_ceil(n).max(1),
    }
}

/// Index of the leftmost column of a layer with `total_columns` columns.
///
/// Odd counts start at `-(n / 2) - 1`, even counts at `-((n - 1) / 2) - 1`:
///
/// | columns | indices |
/// |---|---|
/// | 1 | -1 |
/// | 2 | -1, 0 |
/// | 3 | -2, -1, 0 |
/// | 4 | -2, -1, 0, 1 |
pub fn first_column(total_columns: usize) -> i32 {
    let n = total_columns as i32;
    if n % 2 == 1 {
        -(n / 2) - 1
    } else {
        -((n - 1) / 2) - 1
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TopologyLayoutEngine {
    style: LayoutStyle,
}

impl TopologyLayoutEngine {
    pub fn new(style: LayoutStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &LayoutStyle {
        &self.style
    }

    /// Packs every layer of `shape` into `viewport`. The result is recomputed
    /// from scratch on every call.
    pub fn compute(&self, shape: &NetworkShape, viewport: Viewport) -> Result<Layout> {
        self.style.validate()?;
        shape.validate()?;

        let width = sanitize(viewport.width);
        let height = sanitize(viewport.height);
        let min_dimension = width.min(height);
        if min_dimension == 0.0 && !shape.is_empty() {
            debug!("viewport {width}x{height} has no area, laying out zero nodes");
        }

        let gutter = self.style.unit_gutter;
        let layers: Vec<LayerGeometry> = shape
            .layers()
            .iter()
            .enumerate()
            .map(|(i, layer)| {
                let tile = if layer.is_conv() {
                    self.style.conv_tile_size
                } else {
                    self.style.dense_tile_size()
                };
                LayerGeometry::pack(
                    i,
                    layer.unit_count,
                    layer.is_conv(),
                    layer.is_output(),
                    tile,
                    gutter,
                    min_dimension,
                )
            })
            .collect();

        if min_dimension > 0.0 {
            for g in layers.iter().filter(|g| !g.is_placeable() && g.unit_count > 0) {
                warn!(
                    "layer {} tile of {}px does not fit into {}px, skipping its {} units",
                    g.layer_index, g.tile_size, min_dimension, g.unit_count
                );
            }
        }

        let nodes = place_nodes(&layers);
        let edges = connect_layers(&layers);
        let layer_spacing = if layers.is_empty() {
            0.0
        } else {
            min_dimension / layers.len() as f32
        };

        debug!(
            "layout: {} layers, {} nodes, {} edges, layer spacing {layer_spacing}",
            layers.len(),
            nodes.len(),
            edges.len()
        );

        Ok(Layout {
            nodes,
            edges,
            layers,
            layer_spacing,
            min_dimension,
            top_margin: (height - min_dimension) / 2.0,
            left_margin: (width - min_dimension) / 2.0,
            unit_gutter: gutter,
        })
    }
}

/// Shorthand for `TopologyLayoutEngine::new(style).compute(shape, viewport)`.
pub fn compute_layout(
    shape: &NetworkShape,
    viewport: Viewport,
    style: LayoutStyle,
) -> Result<Layout> {
    TopologyLayoutEngine::new(style).compute(shape, viewport)
}

fn sanitize(side: f32) -> f32 {
    if side.is_finite() && side > 0.0 { side } else { 0.0 }
}

fn place_nodes(layers: &[LayerGeometry]) -> Vec<LayoutNode> {
    layers
        .iter()
        .filter(|g| g.is_placeable())
        .flat_map(|g| {
            (0..g.unit_count).map(move |unit| LayoutNode {
                layer_index: g.layer_index,
                unit_index: unit,
                column: g.column_of(unit),
                unit_spacing: g.spacing_of(unit),
                units_per_column: g.units_per_column,
                is_output: g.is_output,
                is_conv: g.is_conv,
            })
        })
        .collect()
}

fn connect_layers(layers: &[LayerGeometry]) -> Vec<LayoutEdge> {
    let mut edges = Vec::new();
    for pair in layers.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        if !from.is_placeable() || !to.is_placeable() {
            continue;
        }
        edges.reserve(from.unit_count * to.unit_count);
        for source in 0..from.unit_count {
            for target in 0..to.unit_count {
                edges.push(LayoutEdge {
                    layer_index: from.layer_index,
                    source_unit_index: source,
                    target_unit_index: target,
                    source_column: from.column_of(source),
                    target_column: to.column_of(target),
                    source_unit_spacing: from.spacing_of(source),
                    target_unit_spacing: to.spacing_of(target),
                    units_per_column: from.units_per_column,
                    target_units_per_column: to.units_per_column,
                });
            }
        }
    }
    edges
}
