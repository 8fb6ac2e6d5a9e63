//! Plot Title - Cemetery funerary-right ownership registry
//!
//! Ownership transfer cases for cemetery plot contracts, with a single-active-holder ledger,
//! yearly case/resolution numbering, a per-transfer-type document checklist and a dual audit
//! mirror.
//!
//! # Modules
//!
//! - [`core_types`] - Ids, actor, clock
//! - [`error`] - `RegistryError` taxonomy
//! - [`checklist`] - Required and optional documents per transfer type
//! - [`numbering`] - `TR-YYYY-NNNN` / `RES-YYYY-NNNN` sequences
//! - [`ledger`] - Holder and beneficiary records
//! - [`audit`] - Operational movements and administrative events
//! - [`store`] - Transactional store (in-memory and PostgreSQL)
//! - [`adapters`] - Contract directory, person directory, document storage
//! - [`transfer_case`] - Case lifecycle coordinator
//! - [`gateway`] - HTTP API

// Core types - must be first!
pub mod core_types;
pub mod error;

// Registry components
pub mod audit;
pub mod checklist;
pub mod ledger;
pub mod numbering;
pub mod transfer_case;

// Infrastructure
pub mod adapters;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod store;

// Convenient re-exports at crate root
pub use core_types::{
    Actor, CaseId, Clock, ContractId, DocumentRef, FixedClock, OrgId, PersonId, Role,
    SystemClock, UserId,
};
pub use error::{RegistryError, Result};
pub use store::{CaseStore, CaseTx, memory::MemoryStore, postgres::PgStore};
pub use transfer_case::{
    CaseStatus, CloseRequest, CreateCase, TransferCase, TransferCaseService, TransferType,
    WorkflowSettings,
};
