use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nn_ablation_viz::weights::LayerWeights;
use nn_ablation_viz::{NetworkShape, Result, WeightHistory};

/// Conv channels and dense sizes of the generated demo network.
const DEMO_CONV: [usize; 2] = [4, 8];
const DEMO_DENSE: [usize; 3] = [20, 15, 10];

/// Random network whose weights drift a little every epoch, in the same
/// per-layer format the backend serves.
pub fn generate(seed: u64, epochs: usize) -> Result<(NetworkShape, WeightHistory)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let shape = NetworkShape::new(&DEMO_CONV, &DEMO_DENSE);

    let mut current: LayerWeights = (0..shape.len())
        .filter_map(|source| {
            let key = shape.weight_key(source)?;
            let rows = shape.layers()[source + 1].unit_count;
            let cols = shape.layers()[source].unit_count;
            let matrix: Vec<Vec<f32>> = (0..rows)
                .map(|_| (0..cols).map(|_| rng.gen_range(-1.0..1.0)).collect())
                .collect();
            Some((key, matrix))
        })
        .collect();

    let mut epochs_map = BTreeMap::new();
    for epoch in 0..epochs.max(1) {
        epochs_map.insert(epoch.to_string(), current.clone());
        for matrix in current.values_mut() {
            for weight in matrix.iter_mut().flatten() {
                *weight += rng.gen_range(-0.15..0.15);
            }
        }
    }

    let history = WeightHistory::from_epoch_map(&shape, &epochs_map)?;
    Ok((shape, history))
}
