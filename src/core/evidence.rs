//! Attributable evidence claims.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::chunk::ChunkId;
use super::clamp_unit;
use crate::error::AgentError;

/// Evidence identifier, `e1`, `e2`, ... in run order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvidenceId(String);

impl EvidenceId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier for the evidence at 0-based `index` in the run's list.
    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self(format!("e{}", index + 1))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An atomic claim backed by at least one retrieved chunk.
///
/// Fields are private so the support invariant established by
/// [`Evidence::new`] cannot be broken afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    id: EvidenceId,
    claim: String,
    supporting_chunk_ids: BTreeSet<ChunkId>,
    confidence: f64,
}

impl Evidence {
    /// Creates evidence, clamping confidence to `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::InvalidEvidence`] when the claim is blank, no
    /// supporting chunk is given, or the confidence is not a number.
    pub fn new(
        id: EvidenceId,
        claim: impl Into<String>,
        supporting_chunk_ids: impl IntoIterator<Item = ChunkId>,
        confidence: f64,
    ) -> Result<Self, AgentError> {
        let claim = claim.into().trim().to_string();
        if claim.is_empty() {
            return Err(AgentError::InvalidEvidence {
                reason: format!("{id} has an empty claim"),
            });
        }
        let supporting_chunk_ids: BTreeSet<ChunkId> = supporting_chunk_ids.into_iter().collect();
        if supporting_chunk_ids.is_empty() {
            return Err(AgentError::InvalidEvidence {
                reason: format!("{id} references no supporting chunk"),
            });
        }
        if confidence.is_nan() {
            return Err(AgentError::InvalidEvidence {
                reason: format!("{id} has a non-numeric confidence"),
            });
        }
        Ok(Self {
            id,
            claim,
            supporting_chunk_ids,
            confidence: clamp_unit(confidence),
        })
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> &EvidenceId {
        &self.id
    }

    /// Claim text.
    #[must_use]
    pub fn claim(&self) -> &str {
        &self.claim
    }

    /// Chunks the claim was extracted from. Never empty.
    #[must_use]
    pub const fn supporting_chunk_ids(&self) -> &BTreeSet<ChunkId> {
        &self.supporting_chunk_ids
    }

    /// Confidence in `[0, 1]`.
    #[must_use]
    pub const fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Whether confidence strictly exceeds `threshold`.
    #[must_use]
    pub fn exceeds(&self, threshold: f64) -> bool {
        self.confidence > threshold
    }
}
