//! Ownership Transfer Cases
//!
//! A case carries a change of holder on a funerary-use right contract from request to
//! resolution.
//!
//! # State Machine
//!
//! ```text
//! DOCS_PENDING ⇄ UNDER_REVIEW → APPROVED → CLOSED
//!      ↓              ↓
//!      └──→ REJECTED ←┘
//!              ↓ (reopen, bounded)
//!          DOCS_PENDING
//! ```
//!
//! # Safety Invariants
//!
//! 1. **One open case per contract**: checked in the transaction and backed by a unique index
//! 2. **Atomic close**: holder records, beneficiary, audit entries and the resolution commit
//!    together or not at all
//! 3. **Compare-and-swap status**: a case is only saved if its status is still the one read

pub mod api;
pub mod coordinator;
pub mod state;
pub mod types;

#[cfg(test)]
mod integration_tests;

pub use coordinator::{CreateCase, NewPublication, TransferCaseService, WorkflowSettings};
pub use state::{CaseAction, CaseStatus};
pub use types::{
    BeneficiaryDecision, CaseDetail, CaseDocument, CaseFilter, CloseRequest, DocumentStatus,
    NewParty, Party, PartyRole, Publication, TransferCase, TransferTerms, TransferType,
    VerificationOutcome,
};
