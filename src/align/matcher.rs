//! Sorted-neighbourhood matching
//!
//! Both entity lists are sorted by normalized key and walked together. Only
//! pairs that meet during the walk are scored, which keeps the work linear;
//! matches between keys that never become neighbours are not found.

use crate::align::normalize::normalize_label;
use crate::align::similarity::Similarity;
use crate::storage::Entity;
use std::cmp::Ordering;
use std::collections::HashSet;

/// An entity with its alignment key
#[derive(Debug, Clone)]
pub struct KeyedEntity {
    pub key: String,
    pub entity: Entity,
}

/// Normalizes and sorts entities by key, ties broken by natural key
pub fn keyed(entities: Vec<Entity>, resource_prefix: &str) -> Vec<KeyedEntity> {
    let mut keyed: Vec<KeyedEntity> = entities
        .into_iter()
        .map(|entity| KeyedEntity {
            key: normalize_label(&entity.label, resource_prefix),
            entity,
        })
        .collect();
    keyed.sort_by(|a, b| a.key.cmp(&b.key).then_with(|| a.entity.key.cmp(&b.entity.key)));
    keyed
}

/// A scored pair of positions in the left and right lists
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredPair {
    pub left: usize,
    pub right: usize,
    pub score: f64,
}

/// Scores every pair met by the merge walk
///
/// At cursor `(i, j)` the pairs `(i, j)`, `(i + 1, j)` and `(i, j + 1)` are
/// scored; then the cursor on the lower key advances, or both on equal keys.
/// Pairs are returned in the order they were first scored.
pub fn candidate_pairs(
    left: &[KeyedEntity],
    right: &[KeyedEntity],
    similarity: &dyn Similarity,
) -> Vec<ScoredPair> {
    let mut scored = HashSet::new();
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < left.len() && j < right.len() {
        for (l, r) in [(i, j), (i + 1, j), (i, j + 1)] {
            if l < left.len() && r < right.len() && scored.insert((l, r)) {
                pairs.push(ScoredPair {
                    left: l,
                    right: r,
                    score: similarity.score(&left[l].key, &right[r].key),
                });
            }
        }

        match left[i].key.cmp(&right[j].key) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }

    pairs
}

/// Greedy one-to-one selection
///
/// Candidates are taken by descending score, ties in discovery order; a pair
/// is accepted when its score exceeds `threshold` and neither side is taken.
pub fn select_matches(candidates: &[ScoredPair], threshold: f64) -> Vec<ScoredPair> {
    let mut ordered: Vec<ScoredPair> = candidates
        .iter()
        .copied()
        .filter(|pair| pair.score > threshold)
        .collect();
    ordered.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut left_taken = HashSet::new();
    let mut right_taken = HashSet::new();
    ordered
        .into_iter()
        .filter(|pair| {
            if left_taken.contains(&pair.left) || right_taken.contains(&pair.right) {
                return false;
            }
            left_taken.insert(pair.left);
            right_taken.insert(pair.right);
            true
        })
        .collect()
}
