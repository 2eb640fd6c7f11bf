//! Heuristic quality assessment.
//!
//! Four dimensions each contribute up to 25 points (15 for the middle band):
//! evidence count, retrieved chunk count, total body length and tree size.
//! Before drafting, the same scale over the gathered material picks the
//! [`ReportStyle`] of a research report.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::chunk::RetrievedChunk;
use super::evidence::Evidence;
use super::tree::ReportTree;

/// Coarse quality band derived from the score.
///
/// Discriminants are inverted (`Good = 0`) so the derived [`Ord`] sorts
/// better reports first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBand {
    /// Score of 70 or more.
    Good = 0,
    /// Score in `40..70`.
    Adequate = 1,
    /// Score below 40.
    Limited = 2,
}

impl QualityBand {
    /// Band for a 0-100 score.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            70.. => Self::Good,
            40..70 => Self::Adequate,
            _ => Self::Limited,
        }
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Adequate => "adequate",
            Self::Limited => "limited",
        }
    }

    const fn recommendations(self) -> &'static [&'static str] {
        match self {
            Self::Limited => &[
                "Consider expanding research scope",
                "Gather more diverse sources",
                "Extract additional insights",
            ],
            Self::Adequate => &[
                "Research is adequate but could be enhanced",
                "Consider additional follow-up questions",
            ],
            Self::Good => &[
                "Research quality is good",
                "Consider organizing findings for presentation",
            ],
        }
    }
}

impl std::fmt::Display for QualityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presentation form of a research report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStyle {
    /// Detailed analysis; material score of 80 or more.
    Comprehensive,
    /// Informative overview; material score in `60..80`.
    Summary,
    /// Concise brief for decision makers; material score below 60.
    Executive,
}

impl ReportStyle {
    /// Style for a 0-100 material score.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            80.. => Self::Comprehensive,
            60..80 => Self::Summary,
            _ => Self::Executive,
        }
    }

    /// Style for the material gathered by a run.
    #[must_use]
    pub fn select(evidence: &[Evidence], chunks: &[RetrievedChunk]) -> Self {
        Self::from_score(material_score(evidence, chunks))
    }

    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Comprehensive => "comprehensive",
            Self::Summary => "summary",
            Self::Executive => "executive",
        }
    }

    /// Writing instruction handed to section and summary prompts.
    #[must_use]
    pub const fn guidance(&self) -> &'static str {
        match self {
            Self::Comprehensive => {
                "Comprehensive report: detailed analysis with context, implications and next steps. \
                 Support every statement with evidence."
            }
            Self::Summary => {
                "Summary report: one informative, accessible paragraph covering the main findings \
                 and what they mean."
            }
            Self::Executive => {
                "Executive brief for senior decision makers: two to four sentences, \
                 leading with the most critical point."
            }
        }
    }
}

impl std::fmt::Display for ReportStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores the material available before drafting: evidence count, chunk
/// count, total chunk text length and distinct source documents.
#[must_use]
pub fn material_score(evidence: &[Evidence], chunks: &[RetrievedChunk]) -> u8 {
    let volume = chunks.iter().map(|c| c.text.chars().count()).sum();
    let documents = chunks
        .iter()
        .map(|c| c.source_doc_id.as_str())
        .collect::<BTreeSet<_>>()
        .len();
    points(evidence.len(), 5, 3) + points(chunks.len(), 3, 1) + points(volume, 5001, 2001) + points(documents, 4, 2)
}

/// Quality metrics for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportQuality {
    /// Total score, 0 to 100.
    pub score: u8,
    /// Band for `score`.
    pub band: QualityBand,
    /// Evidence items extracted.
    pub evidence_count: usize,
    /// Chunks retrieved after merge.
    pub chunk_count: usize,
    /// Sum of node body lengths, in characters.
    pub content_length: usize,
    /// Nodes in the report tree.
    pub node_count: usize,
    /// One line per scored dimension.
    pub feedback: Vec<String>,
    /// Suggested improvements for the band.
    pub recommendations: Vec<String>,
}

const fn points(value: usize, full: usize, partial: usize) -> u8 {
    if value >= full {
        25
    } else if value >= partial {
        15
    } else {
        0
    }
}

fn band(
    value: usize,
    full: usize,
    partial: usize,
    labels: [&str; 3],
    feedback: &mut Vec<String>,
) -> u8 {
    let score = points(value, full, partial);
    let label = match score {
        25 => labels[0],
        15 => labels[1],
        _ => labels[2],
    };
    feedback.push(label.to_string());
    score
}

impl ReportQuality {
    /// Scores a finalized run.
    #[must_use]
    pub fn assess(tree: &ReportTree, evidence: &[Evidence], chunks: &[RetrievedChunk]) -> Self {
        let content_length = tree.iter().map(|n| n.body().chars().count()).sum();
        let mut feedback = Vec::with_capacity(4);

        let score = band(
            evidence.len(),
            5,
            3,
            [
                "Good insight extraction",
                "Moderate insight extraction",
                "Limited insights extracted",
            ],
            &mut feedback,
        ) + band(
            chunks.len(),
            3,
            1,
            [
                "Comprehensive research results",
                "Basic research conducted",
                "Insufficient research results",
            ],
            &mut feedback,
        ) + band(
            content_length,
            5001,
            2001,
            [
                "Rich content gathered",
                "Adequate content volume",
                "Limited content gathered",
            ],
            &mut feedback,
        ) + band(
            tree.len(),
            4,
            2,
            [
                "Well-structured report",
                "Basic report structure",
                "Simple answer structure",
            ],
            &mut feedback,
        );

        let band = QualityBand::from_score(score);
        Self {
            score,
            band,
            evidence_count: evidence.len(),
            chunk_count: chunks.len(),
            content_length,
            node_count: tree.len(),
            feedback,
            recommendations: band
                .recommendations()
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}
