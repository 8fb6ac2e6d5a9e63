//! Transactional store
//!
//! A [`CaseTx`] is one atomic, organization-scoped unit of work. Core operations open exactly one,
//! perform all reads and writes through it, and either `commit()` or drop it (rollback). Nothing
//! done through an uncommitted transaction is ever visible to another one.
//!
//! Two backends:
//! - [`memory::MemoryStore`]: single writer per organization, copy-on-write tenant state.
//! - [`postgres::PgStore`]: PostgreSQL, row locks plus partial unique indexes.

pub mod memory;
pub mod postgres;
pub mod schema;

use async_trait::async_trait;

use crate::audit::{ContractEvent, Movement, MovementFilter};
use crate::core_types::{CaseId, ContractId, OrgId};
use crate::error::Result;
use crate::ledger::{Beneficiary, OwnershipRecord};
use crate::numbering::SequenceKind;
use crate::transfer_case::state::CaseStatus;
use crate::transfer_case::types::{CaseFilter, TransferCase};

/// Opens organization-scoped transactions
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn begin(&self, org: OrgId) -> Result<Box<dyn CaseTx>>;
}

/// One open transaction. Every read and write is confined to `org()`.
#[async_trait]
pub trait CaseTx: Send {
    fn org(&self) -> OrgId;

    // === Cases ===

    /// Insert a new case with its documents and parties
    async fn insert_case(&mut self, case: &TransferCase) -> Result<()>;

    /// Load a case for update. Concurrent writers of the same case wait for this
    /// transaction to finish.
    async fn load_case(&mut self, id: CaseId) -> Result<Option<TransferCase>>;

    /// Persist the case aggregate if its stored status still equals `expected`.
    ///
    /// Returns false when another transaction moved the case first.
    async fn save_case(&mut self, case: &TransferCase, expected: CaseStatus) -> Result<bool>;

    /// Id of the contract's open (DOCS_PENDING, UNDER_REVIEW or APPROVED) case, if any
    async fn open_case_for_contract(&mut self, contract: ContractId) -> Result<Option<CaseId>>;

    /// Cases matching `filter`, newest first
    async fn list_cases(&mut self, filter: &CaseFilter) -> Result<Vec<TransferCase>>;

    // === Numbering ===

    /// Atomically increment and return the (org, kind, year) counter, starting at 1
    async fn next_sequence(&mut self, kind: SequenceKind, year: i32) -> Result<u32>;

    // === Ledger ===

    async fn active_holder(&mut self, contract: ContractId) -> Result<Option<OwnershipRecord>>;
    async fn insert_holder(&mut self, record: &OwnershipRecord) -> Result<()>;
    /// Update end date and pensioner fields of an existing record
    async fn update_holder(&mut self, record: &OwnershipRecord) -> Result<()>;
    /// All holder records of the contract, oldest first
    async fn holder_history(&mut self, contract: ContractId) -> Result<Vec<OwnershipRecord>>;

    async fn active_beneficiary(&mut self, contract: ContractId) -> Result<Option<Beneficiary>>;
    async fn insert_beneficiary(&mut self, beneficiary: &Beneficiary) -> Result<()>;
    async fn update_beneficiary(&mut self, beneficiary: &Beneficiary) -> Result<()>;
    async fn beneficiary_history(&mut self, contract: ContractId) -> Result<Vec<Beneficiary>>;

    // === Audit (append-only) ===

    async fn append_movement(&mut self, movement: &Movement) -> Result<()>;
    async fn append_contract_event(&mut self, event: &ContractEvent) -> Result<()>;
    /// Operational log of the contract, oldest first
    async fn movements(
        &mut self,
        contract: ContractId,
        filter: &MovementFilter,
    ) -> Result<Vec<Movement>>;
    /// Administrative log of the case, oldest first
    async fn case_events(&mut self, case: CaseId) -> Result<Vec<ContractEvent>>;

    /// Make every write of this transaction visible atomically.
    ///
    /// The transaction cannot be used afterwards.
    async fn commit(&mut self) -> Result<()>;
}
