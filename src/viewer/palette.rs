use egui::Color32;

use nn_ablation_viz::{ActivityColor, ColorClassification};

pub const BACKGROUND: Color32 = Color32::from_rgb(0x21, 0x21, 0x21);
pub const FRAME: Color32 = Color32::DARK_GRAY;
pub const EDGE_DEFAULT: Color32 = Color32::from_rgb(0x37, 0x37, 0x37);
pub const EDGE_LOW: Color32 = Color32::from_rgb(0xEF, 0x9A, 0x9A);
pub const EDGE_HIGH: Color32 = Color32::from_rgb(0xEF, 0x53, 0x50);
pub const UNIT_BASE: Color32 = Color32::from_rgb(0x3D, 0x59, 0xAB);
pub const UNIT_ACTIVE: Color32 = Color32::from_rgb(229, 115, 115);
pub const UNIT_ABLATED: Color32 = Color32::from_rgb(0x37, 0x37, 0x37);
pub const ABLATED_OPACITY: f32 = 0.25;
pub const INFO_BOX: Color32 = Color32::from_rgb(255, 255, 220);

pub fn edge_color(class: ColorClassification, ablated: bool) -> Color32 {
    if ablated {
        return EDGE_DEFAULT.gamma_multiply(ABLATED_OPACITY);
    }
    match class.color {
        ActivityColor::Default => EDGE_DEFAULT,
        ActivityColor::LowActivity => EDGE_LOW,
        ActivityColor::HighActivity => EDGE_HIGH,
    }
}

pub fn node_color(class: ColorClassification, ablated: bool) -> Color32 {
    if ablated {
        UNIT_ABLATED.gamma_multiply(ABLATED_OPACITY)
    } else if class.is_default() {
        UNIT_BASE
    } else {
        UNIT_ACTIVE.gamma_multiply(class.opacity())
    }
}

/// Edges are drawn thicker the more active they are.
pub fn edge_width(class: ColorClassification) -> f32 {
    1.0 + 1.5 * class.activity
}
