//! Transfer case status machine
//!
//! Status IDs are stored as SMALLINT.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transfer case status
///
/// Success path: DOCS_PENDING (10) → UNDER_REVIEW (20) → APPROVED (30) → CLOSED (40).
/// Failure path: DOCS_PENDING | UNDER_REVIEW → REJECTED (-10), which may be reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum CaseStatus {
    /// Created; documents being gathered and verified
    DocsPending = 10,

    /// Submitted; every required document verified
    UnderReview = 20,

    /// Accepted by a reviewer; waiting for the atomic close
    Approved = 30,

    /// Terminal: ledger transition applied, resolution issued
    Closed = 40,

    /// Rejected with a reason; may be reopened while retries remain
    Rejected = -10,
}

impl CaseStatus {
    pub const ALL: [CaseStatus; 5] = [
        CaseStatus::DocsPending,
        CaseStatus::UnderReview,
        CaseStatus::Approved,
        CaseStatus::Closed,
        CaseStatus::Rejected,
    ];

    /// Open cases block a new case on the same contract.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            CaseStatus::DocsPending | CaseStatus::UnderReview | CaseStatus::Approved
        )
    }

    /// CLOSED never transitions again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CaseStatus::Closed)
    }

    /// Status reached by `action`, or `None` when the action is not allowed from here.
    pub fn apply(&self, action: CaseAction) -> Option<CaseStatus> {
        use CaseAction::*;
        use CaseStatus::*;
        match (self, action) {
            (DocsPending, Submit) => Some(UnderReview),
            (UnderReview, ReturnForDocuments) => Some(DocsPending),
            (UnderReview, Approve) => Some(Approved),
            (DocsPending | UnderReview, Reject) => Some(Rejected),
            (Rejected, Reopen) => Some(DocsPending),
            (Approved, Close) => Some(Closed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        CaseAction::ALL
            .iter()
            .any(|action| self.apply(*action) == Some(next))
    }

    /// Get the numeric status ID for storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            10 => Some(CaseStatus::DocsPending),
            20 => Some(CaseStatus::UnderReview),
            30 => Some(CaseStatus::Approved),
            40 => Some(CaseStatus::Closed),
            -10 => Some(CaseStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::DocsPending => "DOCS_PENDING",
            CaseStatus::UnderReview => "UNDER_REVIEW",
            CaseStatus::Approved => "APPROVED",
            CaseStatus::Closed => "CLOSED",
            CaseStatus::Rejected => "REJECTED",
        }
    }
}

/// Workflow step that moves a case between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseAction {
    Submit,
    ReturnForDocuments,
    Approve,
    Reject,
    Reopen,
    Close,
}

impl CaseAction {
    pub const ALL: [CaseAction; 6] = [
        CaseAction::Submit,
        CaseAction::ReturnForDocuments,
        CaseAction::Approve,
        CaseAction::Reject,
        CaseAction::Reopen,
        CaseAction::Close,
    ];

    /// Operation name used in errors and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseAction::Submit => "submit_for_review",
            CaseAction::ReturnForDocuments => "request_more_documents",
            CaseAction::Approve => "approve",
            CaseAction::Reject => "reject",
            CaseAction::Reopen => "reopen",
            CaseAction::Close => "close",
        }
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CaseStatus::ALL
            .iter()
            .copied()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown case status: {}", s))
    }
}
