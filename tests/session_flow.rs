use std::time::{Duration, Instant};

use serde_json::json;

use nn_ablation_viz::model::TopologyInfo;
use nn_ablation_viz::{
    ActivityColor, ClassifyMode, EdgeKey, NodeKey, Viewport, VizConfig, VizError, VizSession,
    WeightHistory,
};

const TOPOLOGY: &str = r#"{
    "conv_layers": [ { "type": "conv2d", "outChannel": 4 } ],
    "layers": [ { "unitCount": 6 } ]
}"#;

fn matrix(rows: usize, cols: usize, value: f32) -> Vec<Vec<f32>> {
    vec![vec![value; cols]; rows]
}

/// Two epochs in the backend's layout: `c1` holds conv -> hidden, `h1` the
/// hidden self-loop and `output` hidden -> output. Epoch 1 has a single strong
/// conv-to-hidden weight, epoch 2 additionally changes one other weight.
/// Output weights never vary.
fn history_json() -> String {
    let mut hidden = matrix(6, 4, 0.0);
    hidden[0][0] = 1.0;
    let mut changed = hidden.clone();
    changed[2][3] = 1.0;
    json!({
        "2": {
            "input": matrix(4, 1, 0.3),
            "c1": changed,
            "h1": matrix(6, 6, 0.2),
            "output": matrix(10, 6, 0.5),
        },
        "1": {
            "input": matrix(4, 1, 0.3),
            "c1": hidden,
            "h1": matrix(6, 6, 0.7),
            "output": matrix(10, 6, 0.5),
        },
    })
    .to_string()
}

fn session_with_history() -> (VizSession, WeightHistory) {
    let shape = TopologyInfo::from_json_str(TOPOLOGY).unwrap().to_shape().unwrap();
    let history = WeightHistory::from_json_str(&shape, &history_json()).unwrap();
    let viewport = Viewport::new(400.0, 400.0);
    let mut session = VizSession::new(&VizConfig::default(), viewport).unwrap();
    session.set_shape(shape).unwrap();
    (session, history)
}

#[test]
fn absolute_classification_of_a_loaded_model() {
    let (session, history) = session_with_history();
    assert_eq!(history.len(), 2);
    assert_eq!(history.label(0), Some("1"));

    let stamped = session.classify(history.epoch(0).unwrap(), None).unwrap();
    let classification = session.accept(stamped).unwrap();

    assert_eq!(classification.mode, ClassifyMode::Absolute);
    assert_eq!(classification.edges.len(), session.layout().edges.len());
    assert_eq!(classification.nodes.len(), session.layout().nodes.len());

    let strong = classification.edge(EdgeKey::new(0, 0, 0));
    assert_eq!(strong.color, ActivityColor::HighActivity);
    assert_eq!(classification.edge(EdgeKey::new(0, 1, 0)).color, ActivityColor::Default);

    let summary = classification.summary();
    assert_eq!((summary.high, summary.low, summary.default), (1, 0, 83));

    // Constant output weights have nothing to rank.
    assert_eq!(classification.degenerate.len(), 1);
    assert_eq!(classification.degenerate[0].layer, 1);

    let source = classification.node(NodeKey::new(0, 0));
    assert_eq!(source.color, ActivityColor::HighActivity);
    assert_eq!(source.activity, 1.0);
    assert_eq!(classification.node(NodeKey::new(1, 0)).color, ActivityColor::HighActivity);
    let idle = classification.node(NodeKey::new(1, 1));
    assert!(idle.is_default());
    assert_eq!(idle.opacity(), 1.0);
}

#[test]
fn delta_classification_marks_changed_weights() {
    let (session, history) = session_with_history();
    let stamped = session
        .classify(history.epoch(1).unwrap(), history.previous(1))
        .unwrap();
    let classification = session.accept(stamped).unwrap();

    assert_eq!(classification.mode, ClassifyMode::Delta);
    assert_eq!(classification.edge(EdgeKey::new(0, 3, 2)).color, ActivityColor::HighActivity);
    assert_eq!(classification.edge(EdgeKey::new(0, 0, 0)).color, ActivityColor::Default);
    assert_eq!(classification.summary().high, 1);
    assert!(history.previous(0).is_none());
}

#[test]
fn every_edge_lands_in_exactly_one_bucket() {
    let (session, history) = session_with_history();
    for epoch in 0..history.len() {
        let weights = history.epoch(epoch).unwrap();
        let stamped = session.classify(weights, history.previous(epoch)).unwrap();
        let summary = stamped.classification.summary();
        assert_eq!(
            summary.default + summary.low + summary.high,
            session.layout().edges.len()
        );
    }
}

#[test]
fn resize_invalidates_pending_classifications() {
    let (mut session, history) = session_with_history();
    let stamped = session.classify(history.epoch(0).unwrap(), None).unwrap();

    let start = Instant::now();
    session.request_resize(Viewport::new(200.0, 300.0), start);
    assert!(!session.poll(start + Duration::from_millis(100)).unwrap());
    assert!(session.poll(start + Duration::from_millis(500)).unwrap());

    assert!(matches!(session.accept(stamped), Err(VizError::StaleLayout { .. })));
    let fresh = session.classify(history.epoch(0).unwrap(), None).unwrap();
    assert!(session.accept(fresh).is_ok());
}

#[test]
fn ablation_request_reflects_toggled_units() {
    let (mut session, _) = session_with_history();
    let toggles = [
        NodeKey::new(1, 4),
        NodeKey::new(0, 2),
        NodeKey::new(1, 0),
        NodeKey::new(0, 2),
    ];
    for key in toggles {
        session.toggle_ablation(key).unwrap();
    }
    assert!(session.toggle_ablation(NodeKey::new(2, 0)).is_err());

    let request = session.ablated().to_request("mnist");
    let encoded = serde_json::to_value(&request).unwrap();
    assert_eq!(
        encoded,
        json!({
            "networkID": "mnist",
            "nodes": [ { "layerNumber": 1, "ablatedWeights": [0, 4] } ]
        })
    );

    let edge = session
        .layout()
        .edges
        .iter()
        .find(|e| e.key() == EdgeKey::new(1, 4, 7))
        .unwrap();
    assert!(session.ablated().touches_edge(edge));
}

#[test]
fn malformed_weights_are_reported() {
    let shape = TopologyInfo::from_json_str(TOPOLOGY).unwrap().to_shape().unwrap();
    let short_rows = json!({ "1": { "c1": matrix(5, 4, 0.0) } }).to_string();
    assert!(matches!(
        WeightHistory::from_json_str(&shape, &short_rows),
        Err(VizError::DimensionMismatch { .. })
    ));
    let unknown_layer = json!({ "1": { "h7": matrix(6, 4, 0.0) } }).to_string();
    assert!(WeightHistory::from_json_str(&shape, &unknown_layer).is_err());
    assert!(matches!(
        WeightHistory::from_json_str(&shape, "not json"),
        Err(VizError::Json(_))
    ));
}
