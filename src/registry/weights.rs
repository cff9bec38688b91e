use std::collections::BTreeMap;

pub const DEFAULT_WEIGHT_FLOOR: f64 = 0.1;

const MAX_FLOOR_PASSES: usize = 64;

/// Scale non-negative scores to sum to 1; all-zero input becomes uniform.
pub fn normalize(scores: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    if scores.is_empty() {
        return BTreeMap::new();
    }
    let clean: BTreeMap<String, f64> = scores
        .iter()
        .map(|(k, v)| (k.clone(), if v.is_finite() { v.max(0.0) } else { 0.0 }))
        .collect();
    let total: f64 = clean.values().sum();
    if total <= f64::EPSILON {
        let equal = 1.0 / clean.len() as f64;
        return clean.into_keys().map(|k| (k, equal)).collect();
    }
    clean.into_iter().map(|(k, v)| (k, v / total)).collect()
}

/// Proportional weights with a hard lower bound that survives normalization.
///
/// Floor first, then spread the remaining mass over the unfloored models in
/// proportion to their scores; repeat until no weight is below `floor`. When
/// `n * floor >= 1` the floor cannot hold for everyone and weights are uniform.
pub fn floor_and_normalize(scores: &BTreeMap<String, f64>, floor: f64) -> BTreeMap<String, f64> {
    let n = scores.len();
    if n == 0 {
        return BTreeMap::new();
    }
    let floor = if floor.is_finite() { floor.max(0.0) } else { 0.0 };
    if floor * n as f64 >= 1.0 {
        let equal = 1.0 / n as f64;
        return scores.keys().map(|k| (k.clone(), equal)).collect();
    }

    let mut weights = normalize(scores);
    let mut pinned: BTreeMap<String, bool> = weights.keys().map(|k| (k.clone(), false)).collect();

    for _ in 0..MAX_FLOOR_PASSES {
        let mut changed = false;
        for (id, w) in weights.iter_mut() {
            if !pinned[id] && *w < floor {
                *w = floor;
                pinned.insert(id.clone(), true);
                changed = true;
            }
        }

        let pinned_mass = floor * pinned.values().filter(|p| **p).count() as f64;
        let free_scores: BTreeMap<String, f64> = weights
            .keys()
            .filter(|id| !pinned[*id])
            .map(|id| (id.clone(), scores.get(id).copied().unwrap_or(0.0)))
            .collect();
        let free = normalize(&free_scores);
        for (id, share) in free {
            weights.insert(id, share * (1.0 - pinned_mass));
        }

        if !changed {
            break;
        }
    }
    weights
}
