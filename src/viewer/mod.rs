mod demo;
mod palette;

pub use demo::generate as generate_demo;

use std::time::{Duration, Instant};

use egui_plot::{Legend, Line, Plot, PlotPoints, VLine};
use log::{info, warn};

use nn_ablation_viz::colorize::ActivitySummary;
use nn_ablation_viz::geometry::{self, Point};
use nn_ablation_viz::{
    Classification, ClassifyMode, EdgeKey, EpochSlider, NetworkShape, NodeKey, Result, Viewport,
    VizConfig, VizError, VizSession, WeightHistory, WeightSet,
};

/// Time each epoch stays on screen while playing.
const EPOCH_INTERVAL: Duration = Duration::from_millis(600);
const EDGE_PICK_TOLERANCE: f32 = 4.0;

pub struct AblationApp {
    status: String,
    network_id: String,
    session: VizSession,
    history: WeightHistory,
    slider: EpochSlider,
    delta_mode: bool,
    classification: Option<Classification>,
    summaries: Vec<ActivitySummary>,
    last_tick: Instant,

    selected_edge: Option<EdgeKey>,
    show_request: bool,
    sized: bool,

    // Zoom and pan state
    zoom: f32,
    pan: egui::Vec2,
    is_panning: bool,
    last_pan_pos: Option<egui::Pos2>,
}

impl AblationApp {
    pub fn new(
        config: &VizConfig,
        shape: NetworkShape,
        history: WeightHistory,
        network_id: String,
    ) -> Result<Self> {
        // The real size is known on the first frame; this one is replaced then.
        let mut session = VizSession::new(config, Viewport::new(800.0, 600.0))?;
        session.set_shape(shape)?;
        let slider = EpochSlider::new(history.len());
        let mut app = Self {
            status: format!("Loaded {} epochs", history.len()),
            network_id,
            session,
            history,
            slider,
            delta_mode: false,
            classification: None,
            summaries: Vec::new(),
            last_tick: Instant::now(),
            selected_edge: None,
            show_request: false,
            sized: false,
            zoom: 1.0,
            pan: egui::Vec2::ZERO,
            is_panning: false,
            last_pan_pos: None,
        };
        app.refresh_summaries();
        app.reclassify();
        Ok(app)
    }

    /// Previous epoch to diff against, when delta mode applies.
    fn baseline(&self, epoch: usize) -> Option<&WeightSet> {
        if self.delta_mode {
            self.history.previous(epoch)
        } else {
            None
        }
    }

    fn reclassify(&mut self) {
        let epoch = self.slider.current();
        let Some(weights) = self.history.epoch(epoch) else {
            self.classification = None;
            return;
        };
        let previous = self.baseline(epoch);
        let result = self
            .session
            .classify(weights, previous)
            .and_then(|stamped| self.session.accept(stamped));
        match result {
            Ok(classification) => {
                if self.delta_mode && classification.mode == ClassifyMode::Absolute {
                    self.status = "First epoch has no predecessor, showing absolute weights".into();
                }
                self.classification = Some(classification);
            }
            Err(e) => {
                warn!("classification failed: {e}");
                self.status = format!("Cannot color epoch {epoch}: {e}");
                self.classification = None;
            }
        }
    }

    fn refresh_summaries(&mut self) {
        self.summaries = (0..self.history.len())
            .filter_map(|epoch| {
                let weights = self.history.epoch(epoch)?;
                let stamped = self.session.classify(weights, self.baseline(epoch)).ok()?;
                Some(stamped.classification.summary())
            })
            .collect();
    }

    fn toggle_node(&mut self, key: NodeKey) {
        match self.session.toggle_ablation(key) {
            Ok(true) => {
                self.status = format!("Detached unit {} of layer {}", key.unit, key.layer);
            }
            Ok(false) => {
                self.status = format!("Reattached unit {} of layer {}", key.unit, key.layer);
            }
            Err(VizError::NotAblatable { .. }) => {
                self.status = "Output units cannot be detached".into();
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    fn layer_label(&self, layer: usize) -> String {
        let shape = self.session.shape();
        match shape.layer(layer) {
            Some(l) if l.is_conv() => format!("Conv {}", layer + 1),
            Some(l) if l.is_output() => "Output".to_string(),
            Some(_) => format!("Dense {}", layer + 1 - shape.conv_count()),
            None => String::new(),
        }
    }

    fn node_info(&self, key: NodeKey) -> String {
        let mut s = format!("{}\nUnit: {}\n", self.layer_label(key.layer), key.unit);
        if let Some(class) = self.classification.as_ref().map(|c| c.node(key)) {
            s.push_str(&format!("Activity: {:?}\n", class.color));
            s.push_str(&format!("Opacity: {:.2}\n", class.opacity()));
        }
        if self.session.ablated().is_ablated(key) {
            s.push_str("Detached\n");
        }
        s
    }

    fn edge_info(&self, key: EdgeKey) -> String {
        let epoch = self.slider.current();
        let weight = self.history.epoch(epoch).and_then(|w| w.get(key));
        let mut s = format!(
            "Edge\nLayer: {}\nFrom: {}\nTo: {}\n",
            self.layer_label(key.layer),
            key.source,
            key.target
        );
        if let Some(weight) = weight {
            s.push_str(&format!("Weight: {weight:.4}\n"));
        }
        if let Some(previous) = self.history.previous(epoch).and_then(|w| w.get(key)) {
            s.push_str(&format!("Previous: {previous:.4}\n"));
        }
        if let Some(class) = self.classification.as_ref().map(|c| c.edge(key)) {
            s.push_str(&format!("Activity: {:?}\n", class.color));
        }
        s
    }

    fn tick(&mut self, ctx: &egui::Context) {
        if self.slider.is_playing() {
            if self.last_tick.elapsed() >= EPOCH_INTERVAL {
                self.last_tick = Instant::now();
                self.slider.advance();
                self.reclassify();
            }
            ctx.request_repaint_after(EPOCH_INTERVAL);
        }
    }

    fn draw_controls(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let play_label = if self.slider.is_playing() { "Pause" } else { "Play" };
            if ui.button(play_label).clicked() {
                self.slider.toggle_play();
                self.last_tick = Instant::now();
            }
            let mut epoch = self.slider.current();
            let max = self.slider.max();
            let label = self.history.label(epoch).unwrap_or("-").to_string();
            if ui
                .add(egui::Slider::new(&mut epoch, 0..=max).text(format!("epoch {label}")))
                .changed()
            {
                self.slider.set(epoch);
                self.reclassify();
            }
            if ui.checkbox(&mut self.delta_mode, "Changes since previous epoch").changed() {
                self.refresh_summaries();
                self.reclassify();
            }
            ui.separator();
            if ui.button("-").clicked() {
                self.zoom = (self.zoom * 0.9).max(0.2);
            }
            if ui.button("+").clicked() {
                self.zoom = (self.zoom * 1.1).min(5.0);
            }
            ui.label(format!("Zoom: {:.2}x", self.zoom));
            if ui.button("Reset View").clicked() {
                self.zoom = 1.0;
                self.pan = egui::Vec2::ZERO;
            }
            ui.separator();
            if ui.button("Reattach all").clicked() {
                let ablated: Vec<NodeKey> = self.session.ablated().iter().copied().collect();
                for key in ablated {
                    self.toggle_node(key);
                }
                self.status = "All units reattached".into();
            }
            ui.toggle_value(&mut self.show_request, "Ablation request");
        });
    }

    fn draw_activity_plot(&self, ui: &mut egui::Ui) {
        ui.heading("Active connections");
        let series = |pick: fn(&ActivitySummary) -> usize| -> PlotPoints {
            self.summaries
                .iter()
                .enumerate()
                .map(|(i, s)| [i as f64, pick(s) as f64])
                .collect::<Vec<_>>()
                .into()
        };
        Plot::new("activity_per_epoch")
            .height(220.0)
            .legend(Legend::default())
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.line(Line::new(series(|s| s.high)).name("High").color(palette::EDGE_HIGH));
                plot_ui.line(Line::new(series(|s| s.low)).name("Low").color(palette::EDGE_LOW));
                plot_ui.vline(VLine::new(self.slider.current() as f64));
            });

        if self.show_request {
            ui.separator();
            let request = self.session.ablated().to_request(self.network_id.clone());
            match serde_json::to_string_pretty(&request) {
                Ok(json) => {
                    ui.monospace(json);
                }
                Err(e) => {
                    ui.label(format!("Cannot encode request: {e}"));
                }
            }
        }
    }

    fn handle_viewport(&mut self, rect: egui::Rect, ctx: &egui::Context) {
        let viewport = Viewport::new(rect.width(), rect.height());
        let now = Instant::now();
        if !self.sized || self.session.layout().nodes.is_empty() {
            // first frame, or recovering from a zero-sized window
            if viewport != self.session.viewport() || !self.sized {
                self.sized = true;
                self.apply_resize(|session| session.resize_now(viewport).map(|_| true));
            }
            return;
        }
        self.session.request_resize(viewport, now);
        self.apply_resize(|session| session.poll(now));
        if self.session.has_pending_resize() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }

    fn apply_resize(&mut self, f: impl FnOnce(&mut VizSession) -> Result<bool>) {
        match f(&mut self.session) {
            Ok(true) => {
                self.selected_edge = None;
                self.reclassify();
            }
            Ok(false) => {}
            Err(e) => {
                warn!("relayout failed: {e}");
                self.status = e.to_string();
            }
        }
    }

    fn draw_network(&mut self, ui: &mut egui::Ui) {
        let rect = ui.available_rect_before_wrap();
        self.handle_viewport(rect, ui.ctx());
        let origin = rect.min;

        // Mouse wheel zoom
        if let Some(pos) = ui.input(|i| i.pointer.hover_pos()) {
            if rect.contains(pos) {
                let scroll = ui.input(|i| i.raw_scroll_delta.y);
                if scroll != 0.0 {
                    let zoom_factor = 1.15_f32;
                    let old_zoom = self.zoom;
                    let new_zoom = (self.zoom * zoom_factor.powf(scroll.signum())).clamp(0.2, 5.0);
                    let before = (pos - origin - self.pan) / old_zoom;
                    self.zoom = new_zoom;
                    self.pan = (pos - origin) - before * self.zoom;
                }
            }
        }
        // Mouse drag pan, click to detach
        let resp = ui.interact(rect, egui::Id::new("network"), egui::Sense::click_and_drag());
        if resp.drag_started() {
            self.is_panning = true;
            self.last_pan_pos = resp.interact_pointer_pos();
        }
        if self.is_panning && resp.dragged() {
            if let (Some(last), Some(cur)) = (self.last_pan_pos, resp.interact_pointer_pos()) {
                self.pan += cur - last;
                self.last_pan_pos = Some(cur);
            }
        }
        if resp.drag_stopped() {
            self.is_panning = false;
            self.last_pan_pos = None;
        }

        let zoom = self.zoom;
        let pan = self.pan;
        let to_screen = move |p: Point| origin + egui::vec2(p.x, p.y) * zoom + pan;
        let to_world = move |p: egui::Pos2| {
            let w = (p - origin - pan) / zoom;
            Point::new(w.x, w.y)
        };

        let hovered_node = resp
            .hover_pos()
            .and_then(|p| geometry::node_at(self.session.layout(), to_world(p), 1.0));
        if resp.clicked() {
            let clicked = resp.interact_pointer_pos().map(to_world);
            if let Some(point) = clicked {
                let layout = self.session.layout();
                if let Some(key) = geometry::node_at(layout, point, 1.0) {
                    self.toggle_node(key);
                } else {
                    let tolerance = EDGE_PICK_TOLERANCE / zoom;
                    self.selected_edge =
                        geometry::edge_at(layout, point, tolerance).map(|e| e.key());
                }
            }
        }

        let painter = ui.painter_at(rect);
        painter.rect_filled(rect, 0.0, palette::BACKGROUND);
        painter.rect_stroke(
            rect,
            0.0,
            egui::Stroke::new(2.0, palette::FRAME),
            egui::StrokeKind::Inside,
        );

        let layout = self.session.layout();
        if layout.nodes.is_empty() {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                "Nothing to show at this size",
                egui::FontId::proportional(14.0),
                egui::Color32::WHITE,
            );
            return;
        }
        let ablated = self.session.ablated();
        let classification = self.classification.as_ref();

        // Connections first, units on top
        for edge in &layout.edges {
            let Some((from, to)) = geometry::edge_endpoints(layout, edge) else {
                continue;
            };
            let class = classification.map(|c| c.edge(edge.key())).unwrap_or_default();
            let color = palette::edge_color(class, ablated.touches_edge(edge));
            let width = palette::edge_width(class) * zoom.sqrt();
            let stroke = egui::Stroke::new(width, color);
            painter.line_segment([to_screen(from), to_screen(to)], stroke);
        }
        if let Some(key) = self.selected_edge {
            if let Some(edge) = layout.edges.iter().find(|e| e.key() == key) {
                if let Some((from, to)) = geometry::edge_endpoints(layout, edge) {
                    painter.line_segment(
                        [to_screen(from), to_screen(to)],
                        egui::Stroke::new(3.0, egui::Color32::YELLOW),
                    );
                }
            }
        }

        for node in &layout.nodes {
            let Some(center) = geometry::node_center(layout, node) else {
                continue;
            };
            let Some(layer) = layout.layer(node.layer_index) else {
                continue;
            };
            let tile = layer.tile_size * zoom;
            let class = classification.map(|c| c.node(node.key())).unwrap_or_default();
            let mut color = palette::node_color(class, ablated.is_ablated(node.key()));
            if hovered_node == Some(node.key()) {
                color = egui::Color32::YELLOW;
            }
            let center = to_screen(center);
            if node.is_conv {
                let square = egui::Rect::from_center_size(center, egui::vec2(tile, tile));
                painter.rect_filled(square, 2.0, color);
            } else {
                painter.circle_filled(center, tile / 2.0, color);
            }
        }

        // Layer labels along the top of the packed square
        for layer in 0..layout.layers.len() {
            let x = geometry::layer_axis(layout, layer);
            let pos = to_screen(Point::new(x, layout.top_margin)) + egui::vec2(0.0, 12.0);
            painter.text(
                pos,
                egui::Align2::CENTER_CENTER,
                self.layer_label(layer),
                egui::FontId::proportional(14.0),
                egui::Color32::WHITE,
            );
        }

        if let Some(key) = hovered_node {
            if let Some(center) = layout.node(key).and_then(|n| geometry::node_center(layout, n)) {
                draw_info_box(ui, &painter, rect, to_screen(center), &self.node_info(key));
            }
        } else if let Some(key) = self.selected_edge {
            let mid = layout
                .edges
                .iter()
                .find(|e| e.key() == key)
                .and_then(|e| geometry::edge_endpoints(layout, e))
                .map(|(a, b)| Point::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0));
            if let Some(mid) = mid {
                draw_info_box(ui, &painter, rect, to_screen(mid), &self.edge_info(key));
            }
        }
    }
}

impl eframe::App for AblationApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.tick(ctx);
        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.label(&self.status);
            ui.separator();
            self.draw_controls(ui);
        });
        egui::SidePanel::right("activity").default_width(320.0).show(ctx, |ui| {
            self.draw_activity_plot(ui);
        });
        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_network(ui);
        });
    }
}

/// Draws `info` in a box next to `anchor`, kept inside `bounds`.
fn draw_info_box(
    ui: &egui::Ui,
    painter: &egui::Painter,
    bounds: egui::Rect,
    anchor: egui::Pos2,
    info: &str,
) {
    let lines: Vec<&str> = info.lines().collect();
    let line_height = 16.0;
    let vertical_padding = 16.0;
    let horizontal_padding = 16.0;
    let font = egui::FontId::proportional(13.0);
    let mut max_line_width: f32 = 0.0;
    for line in &lines {
        let galley = ui
            .painter()
            .layout_no_wrap(line.to_string(), font.clone(), egui::Color32::BLACK);
        max_line_width = max_line_width.max(galley.size().x);
    }
    let box_size = egui::vec2(
        max_line_width + 2.0 * horizontal_padding,
        lines.len() as f32 * line_height + 2.0 * vertical_padding,
    );
    let margin = 10.0;
    // Right of the anchor unless that leaves the frame
    let mut box_pos = anchor + egui::vec2(30.0, -40.0);
    let min = bounds.left_top();
    let max = bounds.right_bottom() - box_size;
    if box_pos.x > max.x {
        box_pos.x = anchor.x - box_size.x - 30.0;
    }
    if box_pos.x < min.x {
        box_pos.x = min.x + margin;
    }
    if box_pos.y > max.y {
        box_pos.y = max.y - margin;
    }
    if box_pos.y < min.y {
        box_pos.y = min.y + margin;
    }
    let rect_box = egui::Rect::from_min_size(box_pos, box_size);
    painter.rect_filled(rect_box, 8.0, palette::INFO_BOX.gamma_multiply(0.9));
    let start_y = rect_box.top() + vertical_padding + line_height / 2.0;
    for (i, line) in lines.iter().enumerate() {
        painter.text(
            egui::pos2(rect_box.center().x, start_y + i as f32 * line_height),
            egui::Align2::CENTER_CENTER,
            *line,
            font.clone(),
            egui::Color32::BLACK,
        );
    }
}

/// Loads the network and weights to show, or generates a demo network.
pub fn load_inputs(
    topology: Option<&std::path::Path>,
    weights: Option<&std::path::Path>,
    seed: u64,
    epochs: usize,
) -> Result<(NetworkShape, WeightHistory)> {
    let Some(topology) = topology else {
        info!("no topology given, generating a demo network (seed {seed})");
        return generate_demo(seed, epochs);
    };
    let shape = nn_ablation_viz::model::TopologyInfo::load(topology)?.to_shape()?;
    let history = match weights {
        Some(path) => nn_ablation_viz::model::load_weight_history(&shape, path)?,
        None => WeightHistory::default(),
    };
    info!("loaded {} epochs for {} layers", history.len(), shape.len());
    Ok((shape, history))
}
