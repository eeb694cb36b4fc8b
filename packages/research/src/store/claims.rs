//! Claim and evidence persistence.

use super::Store;
use crate::error::Result;
use crate::ids::new_id;
use crate::types::{Claim, ClaimEvidence, VerifiedClaim};

impl Store {
    /// Insert one claim row. The score is clamped into [0, 1] before it
    /// meets the table's CHECK constraint.
    pub async fn insert_claim(
        &self,
        message_id: &str,
        text: &str,
        claim_type: Option<&str>,
        support_score: f64,
        contradicted: bool,
        uncertainty_reason: Option<&str>,
    ) -> Result<Claim> {
        let claim = Claim {
            id: new_id(),
            message_id: message_id.to_string(),
            text: text.to_string(),
            claim_type: claim_type.map(String::from),
            support_score: support_score.clamp(0.0, 1.0),
            contradicted,
            uncertainty_reason: uncertainty_reason.map(String::from),
        };
        sqlx::query(
            r#"
            INSERT INTO claims
                (id, message_id, text, claim_type, support_score, contradicted, uncertainty_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&claim.id)
        .bind(&claim.message_id)
        .bind(&claim.text)
        .bind(&claim.claim_type)
        .bind(claim.support_score)
        .bind(claim.contradicted)
        .bind(&claim.uncertainty_reason)
        .execute(&self.pool)
        .await?;
        Ok(claim)
    }

    /// Insert one evidence row for a claim.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_claim_evidence(
        &self,
        claim_id: &str,
        source_id: &str,
        chunk_id: &str,
        quote: &str,
        char_start: i64,
        char_end: i64,
        score: Option<f64>,
    ) -> Result<ClaimEvidence> {
        let evidence = ClaimEvidence {
            id: new_id(),
            claim_id: claim_id.to_string(),
            source_id: source_id.to_string(),
            chunk_id: chunk_id.to_string(),
            quote: quote.to_string(),
            char_start,
            char_end,
            score,
        };
        sqlx::query(
            r#"
            INSERT INTO claim_evidence
                (id, claim_id, source_id, chunk_id, quote, char_start, char_end, score)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&evidence.id)
        .bind(&evidence.claim_id)
        .bind(&evidence.source_id)
        .bind(&evidence.chunk_id)
        .bind(&evidence.quote)
        .bind(evidence.char_start)
        .bind(evidence.char_end)
        .bind(evidence.score)
        .execute(&self.pool)
        .await?;
        Ok(evidence)
    }

    /// Persist a batch of verified claims with their evidence for one
    /// assistant message. Evidence without a chunk id is kept as a
    /// citation-grade record only when offsets resolved; claims always
    /// persist.
    pub async fn persist_verified_claims(
        &self,
        message_id: &str,
        claims: &[VerifiedClaim],
    ) -> Result<usize> {
        let mut written = 0;
        for claim in claims {
            let row = self
                .insert_claim(
                    message_id,
                    &claim.text,
                    claim.claim_type.as_deref(),
                    claim.support_score,
                    claim.contradicted,
                    claim.uncertainty_reason.as_deref(),
                )
                .await?;
            written += 1;
            for evidence in &claim.evidence {
                let Some(chunk_id) = &evidence.chunk_id else {
                    continue;
                };
                self.insert_claim_evidence(
                    &row.id,
                    &evidence.source_id,
                    chunk_id,
                    &evidence.quote,
                    evidence.char_start.unwrap_or(0) as i64,
                    evidence.char_end.unwrap_or(0) as i64,
                    None,
                )
                .await?;
            }
        }
        Ok(written)
    }
}
