//! Pixel placement of an abstract [`Layout`], for renderers.

use serde::{Deserialize, Serialize};

use crate::layout::{Layout, LayoutEdge, LayoutNode, NodeKey};

/// Size of the drawing area in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    fn distance_sq(self, other: Point) -> f32 {
        let (dx, dy) = (self.x - other.x, self.y - other.y);
        dx * dx + dy * dy
    }
}

/// Horizontal center of layer `layer`.
pub fn layer_axis(layout: &Layout, layer: usize) -> f32 {
    layout.left_margin + layout.layer_spacing * layer as f32 + layout.layer_spacing / 2.0
}

/// Center of a unit placed by the layout engine, `None` if the unit is not in the layout.
pub fn unit_center(layout: &Layout, layer: usize, unit: usize) -> Option<Point> {
    let geometry = layout.layer(layer).filter(|g| g.is_placeable())?;
    if unit >= geometry.unit_count {
        return None;
    }
    let column = geometry.column_of(unit);
    let spacing = geometry.spacing_of(unit);
    let step = geometry.tile_size + layout.unit_gutter;
    let x = layer_axis(layout, layer) + geometry.centered_offset(column) * step;
    let y = layout.top_margin + geometry.row_of(unit) as f32 * spacing + spacing / 2.0;
    Some(Point::new(x, y))
}

pub fn node_center(layout: &Layout, node: &LayoutNode) -> Option<Point> {
    unit_center(layout, node.layer_index, node.unit_index)
}

pub fn edge_endpoints(layout: &Layout, edge: &LayoutEdge) -> Option<(Point, Point)> {
    let from = unit_center(layout, edge.layer_index, edge.source_unit_index)?;
    let to = unit_center(layout, edge.layer_index + 1, edge.target_unit_index)?;
    Some((from, to))
}

/// Topmost node whose tile contains `point`. Conv tiles are squares, dense
/// units circles; `scale` multiplies both, for zoomed views.
pub fn node_at(layout: &Layout, point: Point, scale: f32) -> Option<NodeKey> {
    layout
        .nodes
        .iter()
        .rev()
        .find(|node| {
            let Some(geometry) = layout.layer(node.layer_index) else {
                return false;
            };
            let Some(center) = node_center(layout, node) else {
                return false;
            };
            let half = geometry.tile_size * scale / 2.0;
            if node.is_conv {
                (point.x - center.x).abs() <= half && (point.y - center.y).abs() <= half
            } else {
                point.distance_sq(center) <= half * half
            }
        })
        .map(LayoutNode::key)
}

/// Distance from `p` to the segment `a`-`b`.
pub fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let ab_len = abx * abx + aby * aby;
    if ab_len == 0.0 {
        return p.distance_sq(a).sqrt();
    }
    let t = ((p.x - a.x) * abx + (p.y - a.y) * aby) / ab_len;
    let t = t.clamp(0.0, 1.0);
    let proj = Point::new(a.x + abx * t, a.y + aby * t);
    p.distance_sq(proj).sqrt()
}

/// Edge closest to `point` within `tolerance` pixels.
pub fn edge_at(layout: &Layout, point: Point, tolerance: f32) -> Option<&LayoutEdge> {
    layout
        .edges
        .iter()
        .filter_map(|edge| {
            let (a, b) = edge_endpoints(layout, edge)?;
            let d = distance_to_segment(point, a, b);
            (d <= tolerance).then_some((edge, d))
        })
        .min_by(|(_, d1), (_, d2)| d1.total_cmp(d2))
        .map(|(edge, _)| edge)
}
