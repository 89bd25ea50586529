//! Keeps layout, classification and ablation state consistent across events.
//!
//! Every layout gets a generation number. Classifications are stamped with
//! the generation they were computed against and are refused once a newer
//! layout exists, so a renderer never pairs weights with the wrong shape.

use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::ablation::AblationSet;
use crate::colorize::{Classification, WeightColorizer};
use crate::config::VizConfig;
use crate::error::{Result, VizError};
use crate::geometry::Viewport;
use crate::layout::{Layout, NodeKey, TopologyLayoutEngine};
use crate::shape::NetworkShape;
use crate::weights::WeightSet;

/// A classification tied to the layout generation it was computed for.
#[derive(Debug, Clone)]
pub struct StampedClassification {
    pub generation: u64,
    pub classification: Classification,
}

pub struct VizSession {
    engine: TopologyLayoutEngine,
    colorizer: WeightColorizer,
    debounce: Duration,
    shape: NetworkShape,
    viewport: Viewport,
    layout: Layout,
    generation: u64,
    pending_resize: Option<(Viewport, Instant)>,
    ablated: AblationSet,
}

impl VizSession {
    pub fn new(config: &VizConfig, viewport: Viewport) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine: TopologyLayoutEngine::new(config.style),
            colorizer: WeightColorizer::new(config.thresholds),
            debounce: config.resize_debounce(),
            shape: NetworkShape::default(),
            viewport,
            layout: Layout::default(),
            generation: 0,
            pending_resize: None,
            ablated: AblationSet::new(),
        })
    }

    /// Shows a new network. Ablations of the previous network are dropped.
    pub fn set_shape(&mut self, shape: NetworkShape) -> Result<&Layout> {
        shape.require_populated()?;
        let layout = self.engine.compute(&shape, self.viewport)?;
        info!(
            "showing network with {} layers and {} units",
            shape.len(),
            shape.total_units()
        );
        self.shape = shape;
        self.ablated.clear();
        Ok(self.install(layout))
    }

    /// Applies a viewport change immediately.
    pub fn resize_now(&mut self, viewport: Viewport) -> Result<&Layout> {
        self.pending_resize = None;
        self.viewport = viewport;
        let layout = self.engine.compute(&self.shape, viewport)?;
        Ok(self.install(layout))
    }

    /// Records a viewport change to apply once no further change arrives
    /// within the debounce interval. Later requests replace earlier ones.
    pub fn request_resize(&mut self, viewport: Viewport, now: Instant) {
        if self.pending_resize.is_none() && viewport == self.viewport {
            return;
        }
        self.pending_resize = Some((viewport, now));
    }

    /// Applies a pending resize whose quiet period has elapsed. Returns
    /// whether the layout changed.
    pub fn poll(&mut self, now: Instant) -> Result<bool> {
        match self.pending_resize {
            Some((viewport, requested)) if now.duration_since(requested) >= self.debounce => {
                if viewport == self.viewport {
                    self.pending_resize = None;
                    return Ok(false);
                }
                debug!("applying resize to {}x{}", viewport.width, viewport.height);
                self.resize_now(viewport)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn has_pending_resize(&self) -> bool {
        self.pending_resize.is_some()
    }

    fn install(&mut self, layout: Layout) -> &Layout {
        self.generation += 1;
        self.layout = layout;
        &self.layout
    }

    pub fn classify(
        &self,
        weights: &WeightSet,
        previous: Option<&WeightSet>,
    ) -> Result<StampedClassification> {
        let classification = self.colorizer.classify(&self.layout, weights, previous)?;
        Ok(StampedClassification {
            generation: self.generation,
            classification,
        })
    }

    /// Unwraps a classification if it still belongs to the current layout.
    pub fn accept(&self, stamped: StampedClassification) -> Result<Classification> {
        if stamped.generation != self.generation {
            warn!(
                "dropping classification of generation {}, current is {}",
                stamped.generation, self.generation
            );
            return Err(VizError::StaleLayout {
                result: stamped.generation,
                current: self.generation,
            });
        }
        Ok(stamped.classification)
    }

    /// Toggles ablation of a hidden or conv unit and returns its new state.
    /// Units of layers not placed at the current size can still be toggled.
    pub fn toggle_ablation(&mut self, key: NodeKey) -> Result<bool> {
        let (layer, unit) = (key.layer, key.unit);
        match self.shape.layer(layer) {
            Some(l) if unit < l.unit_count && l.is_output() => {
                Err(VizError::NotAblatable { layer, unit })
            }
            Some(l) if unit < l.unit_count => {
                let ablated = self.ablated.toggle(key).is_ablated(key);
                debug!("unit {layer}:{unit} ablated: {ablated}");
                Ok(ablated)
            }
            _ => Err(VizError::UnknownNode { layer, unit }),
        }
    }

    pub fn ablated(&self) -> &AblationSet {
        &self.ablated
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn shape(&self) -> &NetworkShape {
        &self.shape
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Epoch selection with play/pause, 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EpochSlider {
    current: usize,
    count: usize,
    playing: bool,
}

impl EpochSlider {
    pub fn new(count: usize) -> Self {
        Self {
            current: 0,
            count,
            playing: false,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Index of the last epoch, 0 when there is none.
    pub fn max(&self) -> usize {
        self.count.saturating_sub(1)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn set(&mut self, epoch: usize) {
        self.current = epoch.min(self.max());
    }

    /// Steps to the next epoch, wrapping to the first after the last.
    pub fn advance(&mut self) -> usize {
        self.current = if self.current >= self.max() {
            0
        } else {
            self.current + 1
        };
        self.current
    }

    pub fn toggle_play(&mut self) -> bool {
        self.playing = !self.playing && self.count > 1;
        self.playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayoutStyle;
    use crate::layout::EdgeKey;

    fn session() -> VizSession {
        let viewport = Viewport::new(400.0, 400.0);
        let mut session = VizSession::new(&VizConfig::default(), viewport).unwrap();
        session.set_shape(NetworkShape::new(&[2], &[3, 2])).unwrap();
        session
    }

    fn weights() -> WeightSet {
        (0..2)
            .flat_map(|s| (0..3).map(move |t| (EdgeKey::new(0, s, t), (s * 3 + t) as f32)))
            .collect()
    }

    #[test]
    fn empty_shape_is_rejected() {
        let mut session = session();
        assert!(matches!(
            session.set_shape(NetworkShape::default()),
            Err(VizError::InvalidShape(_))
        ));
        assert_eq!(session.layout().nodes.len(), 7);
    }

    #[test]
    fn new_shape_clears_ablations_and_bumps_generation() {
        let mut session = session();
        let generation = session.generation();
        assert!(session.toggle_ablation(NodeKey::new(0, 1)).unwrap());
        session.set_shape(NetworkShape::new(&[], &[4, 2])).unwrap();
        assert!(session.ablated().is_empty());
        assert_eq!(session.generation(), generation + 1);
    }

    #[test]
    fn output_units_cannot_be_ablated() {
        let mut session = session();
        assert!(matches!(
            session.toggle_ablation(NodeKey::new(2, 0)),
            Err(VizError::NotAblatable { layer: 2, unit: 0 })
        ));
        assert!(matches!(
            session.toggle_ablation(NodeKey::new(9, 0)),
            Err(VizError::UnknownNode { layer: 9, unit: 0 })
        ));
        assert!(matches!(
            session.toggle_ablation(NodeKey::new(1, 3)),
            Err(VizError::UnknownNode { .. })
        ));
        assert!(session.toggle_ablation(NodeKey::new(1, 2)).unwrap());
        assert!(!session.toggle_ablation(NodeKey::new(1, 2)).unwrap());
    }

    #[test]
    fn units_of_unplaced_layers_can_be_ablated() {
        let config = VizConfig {
            style: LayoutStyle::new(40.0, 5.0, 2.0),
            ..VizConfig::default()
        };
        let mut session = VizSession::new(&config, Viewport::new(30.0, 30.0)).unwrap();
        session.set_shape(NetworkShape::new(&[2], &[3, 2])).unwrap();
        assert!(session.layout().node(NodeKey::new(0, 1)).is_none());

        assert!(session.toggle_ablation(NodeKey::new(0, 1)).unwrap());
        assert!(session.ablated().is_ablated(NodeKey::new(0, 1)));
    }

    #[test]
    fn stale_classification_is_refused() {
        let mut session = session();
        let stamped = session.classify(&weights(), None).unwrap();
        assert!(session.accept(stamped.clone()).is_ok());

        session.resize_now(Viewport::new(200.0, 200.0)).unwrap();
        assert!(matches!(
            session.accept(stamped),
            Err(VizError::StaleLayout { .. })
        ));
    }

    #[test]
    fn weights_for_another_shape_are_rejected() {
        let mut session = session();
        session.set_shape(NetworkShape::new(&[], &[1, 1])).unwrap();
        assert!(matches!(
            session.classify(&weights(), None),
            Err(VizError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn resize_is_debounced() {
        let mut session = session();
        let start = Instant::now();
        let generation = session.generation();

        session.request_resize(Viewport::new(300.0, 300.0), start);
        session.request_resize(Viewport::new(200.0, 100.0), start + Duration::from_millis(100));
        assert!(!session.poll(start + Duration::from_millis(500)).unwrap());
        assert!(session.has_pending_resize());

        assert!(session.poll(start + Duration::from_millis(600)).unwrap());
        assert!(!session.has_pending_resize());
        assert_eq!(session.viewport(), Viewport::new(200.0, 100.0));
        assert_eq!(session.layout().min_dimension, 100.0);
        assert_eq!(session.generation(), generation + 1);
    }

    #[test]
    fn resize_back_to_current_viewport_is_a_no_op() {
        let mut session = session();
        let start = Instant::now();
        session.request_resize(Viewport::new(400.0, 400.0), start);
        assert!(!session.has_pending_resize());

        session.request_resize(Viewport::new(300.0, 300.0), start);
        session.request_resize(Viewport::new(400.0, 400.0), start);
        assert!(!session.poll(start + Duration::from_secs(1)).unwrap());
        assert!(!session.has_pending_resize());
    }

    #[test]
    fn epoch_slider_wraps_and_clamps() {
        let mut slider = EpochSlider::new(3);
        assert_eq!(slider.advance(), 1);
        assert_eq!(slider.advance(), 2);
        assert_eq!(slider.advance(), 0);
        slider.set(10);
        assert_eq!(slider.current(), 2);
        assert!(slider.toggle_play());
        assert!(!slider.toggle_play());

        let mut single = EpochSlider::new(1);
        assert!(!single.toggle_play());
        assert_eq!(single.advance(), 0);
        assert_eq!(EpochSlider::new(0).max(), 0);
    }
}
