//! Alignment of external entities against the internal catalog
//!
//! Labels from both sources are normalized into keys, matched with a
//! sorted-neighbourhood walk and greedy one-to-one selection, and the result
//! is written as catalog works plus correspondence edges.

mod engine;
mod matcher;
mod normalize;
mod similarity;

pub use engine::{AlignedPair, AlignmentEngine, AlignmentReport};
pub use matcher::{candidate_pairs, keyed, select_matches, KeyedEntity, ScoredPair};
pub use normalize::normalize_label;
pub use similarity::{similarity_for, JaroWinkler, Levenshtein, Similarity};
