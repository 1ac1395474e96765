//! Deterministic stratified holdout split keyed by a content hash.

use std::collections::BTreeMap;

use crate::labeling::BinaryLabel;
use crate::store::ProductId;

/// Row indices on each side of a holdout split, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldoutSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split `(id, label)` rows per class so that each class contributes about
/// `test_fraction` of its rows to the test side.
///
/// Rows are ordered within a class by `blake3(seed|label|id)`, so the split is stable for a
/// given seed regardless of input order. Returns `None` when a class has fewer than two rows,
/// since one side would then miss that class.
pub fn stratified_holdout(
    rows: &[(ProductId, BinaryLabel)],
    seed: &str,
    test_fraction: f64,
) -> Option<HoldoutSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return None;
    }
    let mut by_class: BTreeMap<BinaryLabel, Vec<(u128, usize)>> = BTreeMap::new();
    for (index, (id, label)) in rows.iter().enumerate() {
        let hash = blake3::hash(format!("{seed}|{}|{id}", label.as_i64()).as_bytes());
        let mut key = [0u8; 16];
        key.copy_from_slice(&hash.as_bytes()[0..16]);
        by_class
            .entry(*label)
            .or_default()
            .push((u128::from_le_bytes(key), index));
    }
    if by_class.len() < 2 || by_class.values().any(|entries| entries.len() < 2) {
        return None;
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (_label, mut entries) in by_class {
        entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        let n = entries.len();
        let test_n = ((n as f64) * test_fraction).round() as usize;
        let test_n = test_n.clamp(1, n - 1);
        for (position, (_hash, index)) in entries.into_iter().enumerate() {
            if position < test_n {
                test.push(index);
            } else {
                train.push(index);
            }
        }
    }
    train.sort_unstable();
    test.sort_unstable();
    Some(HoldoutSplit { train, test })
}
