//! Numbering service
//!
//! Yearly, per-organization sequence identifiers: `TR-YYYY-####` for cases and
//! `RES-YYYY-####` for resolutions. The counter is incremented inside the caller's transaction,
//! so two committed transactions never observe the same value. A rolled-back transaction may
//! burn a number; gaps are acceptable, duplicates are not.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::store::CaseTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SequenceKind {
    Case,
    Resolution,
}

impl SequenceKind {
    /// Identifier prefix
    pub fn prefix(&self) -> &'static str {
        match self {
            SequenceKind::Case => "TR",
            SequenceKind::Resolution => "RES",
        }
    }

    /// Storage key of the counter
    pub fn as_str(&self) -> &'static str {
        match self {
            SequenceKind::Case => "CASE",
            SequenceKind::Resolution => "RESOLUTION",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{prefix}-{year}-{seq:04}`. Sequences past 9999 widen instead of truncating.
pub fn format_number(kind: SequenceKind, year: i32, seq: u32) -> String {
    format!("{}-{}-{:04}", kind.prefix(), year, seq)
}

/// Next case number of the transaction's organization for `year`
pub async fn next_case_number(tx: &mut dyn CaseTx, year: i32) -> Result<String> {
    next_number(tx, SequenceKind::Case, year).await
}

/// Next resolution number of the transaction's organization for `year`
pub async fn next_resolution_number(tx: &mut dyn CaseTx, year: i32) -> Result<String> {
    next_number(tx, SequenceKind::Resolution, year).await
}

async fn next_number(tx: &mut dyn CaseTx, kind: SequenceKind, year: i32) -> Result<String> {
    let seq = tx.next_sequence(kind, year).await?;
    let number = format_number(kind, year, seq);
    tracing::debug!(org = %tx.org(), kind = %kind, number = %number, "Sequence number issued");
    Ok(number)
}
