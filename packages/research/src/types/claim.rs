//! Claims and their evidence.

use serde::{Deserialize, Serialize};

/// A persisted atomic claim extracted from an assistant answer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    pub id: String,
    pub message_id: String,
    pub text: String,
    pub claim_type: Option<String>,
    /// In [0, 1].
    pub support_score: f64,
    pub contradicted: bool,
    pub uncertainty_reason: Option<String>,
}

/// A verbatim quote locating a claim inside a chunk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimEvidence {
    pub id: String,
    pub claim_id: String,
    pub source_id: String,
    pub chunk_id: String,
    pub quote: String,
    /// Offsets into the chunk text; `char_start <= char_end`.
    pub char_start: i64,
    pub char_end: i64,
    pub score: Option<f64>,
}

/// Wire shape of a verified claim, as emitted in the `claims` event and
/// returned by `POST /verify`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedClaim {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_type: Option<String>,
    pub support_score: f64,
    pub contradicted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncertainty_reason: Option<String>,
    pub evidence: Vec<VerifiedEvidence>,
}

/// Wire shape of one evidence item.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedEvidence {
    pub source_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    pub quote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_start: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub char_end: Option<usize>,
}
