//! External collaborators
//!
//! The registry only references contracts, persons and stored files by id. These traits are
//! the boundary to the subsystems that own them.

pub mod fixtures;
pub mod fs;
pub mod memory;

pub use fixtures::DirectoryFixture;
pub use fs::FsDocuments;
pub use memory::{InMemoryContracts, InMemoryDocuments, InMemoryPersons};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core_types::{ContractId, DocumentRef, OrgId, PersonId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Active,
    Expired,
    Cancelled,
}

/// Funerary-use right contract as seen by the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub id: ContractId,
    pub org: OrgId,
    pub status: ContractStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub name: String,
    pub national_id: String,
}

/// Contract/plot subsystem
#[async_trait]
pub trait ContractDirectory: Send + Sync {
    async fn get_contract(&self, id: ContractId) -> Result<Option<ContractInfo>>;
}

/// Person directory
#[async_trait]
pub trait PersonDirectory: Send + Sync {
    async fn get_person(&self, org: OrgId, id: PersonId) -> Result<Option<Person>>;
}

/// Opaque file storage. The registry never interprets stored content.
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn store(&self, org: OrgId, bytes: Vec<u8>) -> Result<DocumentRef>;

    async fn fetch(&self, org: OrgId, reference: &DocumentRef) -> Result<Vec<u8>>;

    /// Whether `reference` names a file stored for `org`
    async fn contains(&self, org: OrgId, reference: &DocumentRef) -> Result<bool>;

    /// Delete a stored file. Unknown references are ignored.
    async fn remove(&self, org: OrgId, reference: &DocumentRef) -> Result<()>;
}
