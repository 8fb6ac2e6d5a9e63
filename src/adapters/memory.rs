//! In-memory collaborators for the standalone server and tests

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{ContractDirectory, ContractInfo, ContractStatus, DocumentStorage, Person, PersonDirectory};
use crate::core_types::{ContractId, DocumentRef, OrgId, PersonId};
use crate::error::{RegistryError, Result};

#[derive(Default)]
pub struct InMemoryContracts {
    contracts: DashMap<ContractId, ContractInfo>,
}

impl InMemoryContracts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: ContractId, org: OrgId, status: ContractStatus) {
        self.contracts.insert(id, ContractInfo { id, org, status });
    }

    pub fn with_active(self, org: OrgId, ids: impl IntoIterator<Item = i64>) -> Self {
        for id in ids {
            self.insert(ContractId(id), org, ContractStatus::Active);
        }
        self
    }
}

#[async_trait]
impl ContractDirectory for InMemoryContracts {
    async fn get_contract(&self, id: ContractId) -> Result<Option<ContractInfo>> {
        Ok(self.contracts.get(&id).map(|c| c.clone()))
    }
}

#[derive(Default)]
pub struct InMemoryPersons {
    persons: DashMap<(OrgId, PersonId), Person>,
}

impl InMemoryPersons {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, org: OrgId, id: PersonId, name: &str, national_id: &str) {
        self.persons.insert(
            (org, id),
            Person {
                id,
                name: name.to_string(),
                national_id: national_id.to_string(),
            },
        );
    }

    /// Register persons `ids` with generated names
    pub fn with_generated(self, org: OrgId, ids: impl IntoIterator<Item = i64>) -> Self {
        for id in ids {
            self.insert(
                org,
                PersonId(id),
                &format!("Person {}", id),
                &format!("{:08}X", id),
            );
        }
        self
    }
}

#[async_trait]
impl PersonDirectory for InMemoryPersons {
    async fn get_person(&self, org: OrgId, id: PersonId) -> Result<Option<Person>> {
        Ok(self.persons.get(&(org, id)).map(|p| p.clone()))
    }
}

/// File store keyed by `{org}/{seq}`
#[derive(Default)]
pub struct InMemoryDocuments {
    files: DashMap<(OrgId, String), Vec<u8>>,
    next: AtomicU64,
    fail_store: AtomicBool,
}

impl InMemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `store` fail
    pub fn set_fail_store(&self, fail: bool) {
        self.fail_store.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[async_trait]
impl DocumentStorage for InMemoryDocuments {
    async fn store(&self, org: OrgId, bytes: Vec<u8>) -> Result<DocumentRef> {
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(RegistryError::Storage("document storage unavailable".to_string()));
        }
        let seq = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let key = format!("mem://{}/{:08}", org, seq);
        self.files.insert((org, key.clone()), bytes);
        Ok(DocumentRef(key))
    }

    async fn fetch(&self, org: OrgId, reference: &DocumentRef) -> Result<Vec<u8>> {
        self.files
            .get(&(org, reference.0.clone()))
            .map(|f| f.clone())
            .ok_or_else(|| RegistryError::not_found("document", reference))
    }

    async fn contains(&self, org: OrgId, reference: &DocumentRef) -> Result<bool> {
        Ok(self.files.contains_key(&(org, reference.0.clone())))
    }

    async fn remove(&self, org: OrgId, reference: &DocumentRef) -> Result<()> {
        self.files.remove(&(org, reference.0.clone()));
        Ok(())
    }
}
