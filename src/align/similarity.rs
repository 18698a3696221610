use crate::config::SimilarityMetric;

/// Scores how alike two normalized labels are, within [0, 1]
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Normalized Levenshtein ratio: `1 - distance / max_len`
#[derive(Debug, Clone, Copy, Default)]
pub struct Levenshtein;

impl Similarity for Levenshtein {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::normalized_levenshtein(a, b)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JaroWinkler;

impl Similarity for JaroWinkler {
    fn score(&self, a: &str, b: &str) -> f64 {
        strsim::jaro_winkler(a, b)
    }
}

/// The similarity measure selected in the configuration
pub fn similarity_for(metric: SimilarityMetric) -> Box<dyn Similarity> {
    match metric {
        SimilarityMetric::Levenshtein => Box::new(Levenshtein),
        SimilarityMetric::JaroWinkler => Box::new(JaroWinkler),
    }
}
