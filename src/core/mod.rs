//! Core data model: queries, retrieved chunks, evidence and the report tree.
//!
//! Everything here is pure data plus deterministic functions over it. No
//! I/O, no async.

pub mod chunk;
pub mod evidence;
pub mod quality;
pub mod query;
pub mod tree;

pub use chunk::{
    ChunkId, RetrievedChunk, SourceType, jaccard_similarity, merge_candidates, normalize_text,
    rank_order,
};
pub use evidence::{Evidence, EvidenceId};
pub use quality::{QualityBand, ReportQuality, ReportStyle, material_score};
pub use query::{MAX_QUERY_LEN, Query, QueryMode};
pub use tree::{NodeId, ReportNode, ReportTree, SerializedNode};

/// Clamps a score to `[0, 1]`, mapping NaN to 0.
pub(crate) const fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_unit() {
        assert!(clamp_unit(f64::NAN).abs() < f64::EPSILON);
        assert!((clamp_unit(-0.2)).abs() < f64::EPSILON);
        assert!((clamp_unit(3.0) - 1.0).abs() < f64::EPSILON);
        assert!((clamp_unit(0.25) - 0.25).abs() < f64::EPSILON);
    }
}
