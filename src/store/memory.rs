//! In-memory transactional store
//!
//! One `tokio::sync::Mutex` per organization serializes that organization's transactions
//! (single writer per tenant). Reads go straight to the locked tenant state; the first write
//! takes a private copy, which commit publishes and drop discards. The uniqueness constraints the
//! PostgreSQL schema declares are re-checked here on every write.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{CaseStore, CaseTx};
use crate::audit::{ContractEvent, Movement, MovementFilter};
use crate::core_types::{CaseId, ContractId, OrgId};
use crate::error::{RegistryError, Result};
use crate::ledger::{Beneficiary, OwnershipRecord};
use crate::numbering::SequenceKind;
use crate::transfer_case::state::CaseStatus;
use crate::transfer_case::types::{CaseFilter, TransferCase};

#[derive(Debug, Clone, Default)]
struct OrgState {
    cases: BTreeMap<CaseId, TransferCase>,
    sequences: HashMap<(SequenceKind, i32), u32>,
    holders: Vec<OwnershipRecord>,
    beneficiaries: Vec<Beneficiary>,
    movements: Vec<Movement>,
    events: Vec<ContractEvent>,
}

impl OrgState {
    fn open_case_for(&self, contract: ContractId, except: Option<CaseId>) -> Option<CaseId> {
        self.cases
            .values()
            .find(|c| c.contract == contract && c.status.is_open() && Some(c.id) != except)
            .map(|c| c.id)
    }
}

/// Tenant states behind per-organization locks
#[derive(Default)]
pub struct MemoryStore {
    orgs: DashMap<OrgId, Arc<Mutex<OrgState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn begin_tx(&self, org: OrgId) -> MemoryTx {
        let slot = self.orgs.entry(org).or_default().clone();
        MemoryTx {
            org,
            guard: Some(slot.lock_owned().await),
            working: None,
        }
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn begin(&self, org: OrgId) -> Result<Box<dyn CaseTx>> {
        Ok(Box::new(self.begin_tx(org).await))
    }
}

pub struct MemoryTx {
    org: OrgId,
    /// `None` once committed
    guard: Option<OwnedMutexGuard<OrgState>>,
    /// Copy of the tenant state, taken on the first write
    working: Option<OrgState>,
}

fn already_committed() -> RegistryError {
    RegistryError::Storage("transaction already committed".to_string())
}

impl MemoryTx {
    /// Whether a write has forked the tenant state
    pub fn is_dirty(&self) -> bool {
        self.working.is_some()
    }

    fn view(&self) -> Result<&OrgState> {
        let guard = self.guard.as_ref().ok_or_else(already_committed)?;
        Ok(self.working.as_ref().unwrap_or(&**guard))
    }

    fn state(&mut self) -> Result<&mut OrgState> {
        let guard = self.guard.as_ref().ok_or_else(already_committed)?;
        Ok(self.working.get_or_insert_with(|| (**guard).clone()))
    }
}

#[async_trait]
impl CaseTx for MemoryTx {
    fn org(&self) -> OrgId {
        self.org
    }

    async fn insert_case(&mut self, case: &TransferCase) -> Result<()> {
        let state = self.state()?;
        if state.cases.values().any(|c| c.number == case.number) {
            return Err(RegistryError::Storage(format!(
                "duplicate case number {}",
                case.number
            )));
        }
        if case.status.is_open() && state.open_case_for(case.contract, None).is_some() {
            return Err(RegistryError::InvalidContract {
                contract: case.contract,
                reason: "contract already has an open transfer case".to_string(),
            });
        }
        state.cases.insert(case.id, case.clone());
        Ok(())
    }

    async fn load_case(&mut self, id: CaseId) -> Result<Option<TransferCase>> {
        Ok(self.view()?.cases.get(&id).cloned())
    }

    async fn save_case(&mut self, case: &TransferCase, expected: CaseStatus) -> Result<bool> {
        let state = self.state()?;
        match state.cases.get(&case.id) {
            Some(stored) if stored.status == expected => {}
            _ => return Ok(false),
        }
        if case.status.is_open() && state.open_case_for(case.contract, Some(case.id)).is_some() {
            return Err(RegistryError::InvalidContract {
                contract: case.contract,
                reason: "contract already has an open transfer case".to_string(),
            });
        }
        state.cases.insert(case.id, case.clone());
        Ok(true)
    }

    async fn open_case_for_contract(&mut self, contract: ContractId) -> Result<Option<CaseId>> {
        Ok(self.view()?.open_case_for(contract, None))
    }

    async fn list_cases(&mut self, filter: &CaseFilter) -> Result<Vec<TransferCase>> {
        let state = self.view()?;
        let mut cases: Vec<TransferCase> = state
            .cases
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        // Numbers widen past 9999, so compare length before text
        cases.sort_by(|a, b| {
            (b.created_at, b.number.len(), &b.number).cmp(&(a.created_at, a.number.len(), &a.number))
        });
        Ok(cases)
    }

    async fn next_sequence(&mut self, kind: SequenceKind, year: i32) -> Result<u32> {
        let counter = self.state()?.sequences.entry((kind, year)).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn active_holder(&mut self, contract: ContractId) -> Result<Option<OwnershipRecord>> {
        Ok(self
            .view()?
            .holders
            .iter()
            .find(|r| r.contract == contract && r.is_active())
            .cloned())
    }

    async fn insert_holder(&mut self, record: &OwnershipRecord) -> Result<()> {
        let state = self.state()?;
        if record.is_active()
            && state
                .holders
                .iter()
                .any(|r| r.contract == record.contract && r.is_active())
        {
            tracing::error!(contract = %record.contract, "Second open holder record rejected by store");
            return Err(RegistryError::InvariantViolation {
                contract: record.contract,
                reason: "a second open ownership record was rejected by storage".to_string(),
            });
        }
        state.holders.push(record.clone());
        Ok(())
    }

    async fn update_holder(&mut self, record: &OwnershipRecord) -> Result<()> {
        let state = self.state()?;
        let slot = state
            .holders
            .iter_mut()
            .find(|r| r.id == record.id)
            .ok_or_else(|| RegistryError::not_found("ownership record", record.id))?;
        *slot = record.clone();
        Ok(())
    }

    async fn holder_history(&mut self, contract: ContractId) -> Result<Vec<OwnershipRecord>> {
        Ok(self
            .view()?
            .holders
            .iter()
            .filter(|r| r.contract == contract)
            .cloned()
            .collect())
    }

    async fn active_beneficiary(&mut self, contract: ContractId) -> Result<Option<Beneficiary>> {
        Ok(self
            .view()?
            .beneficiaries
            .iter()
            .find(|b| b.contract == contract && b.is_active())
            .cloned())
    }

    async fn insert_beneficiary(&mut self, beneficiary: &Beneficiary) -> Result<()> {
        let state = self.state()?;
        if beneficiary.is_active()
            && state
                .beneficiaries
                .iter()
                .any(|b| b.contract == beneficiary.contract && b.is_active())
        {
            tracing::error!(contract = %beneficiary.contract, "Second open beneficiary rejected by store");
            return Err(RegistryError::InvariantViolation {
                contract: beneficiary.contract,
                reason: "a second open beneficiary was rejected by storage".to_string(),
            });
        }
        state.beneficiaries.push(beneficiary.clone());
        Ok(())
    }

    async fn update_beneficiary(&mut self, beneficiary: &Beneficiary) -> Result<()> {
        let state = self.state()?;
        let slot = state
            .beneficiaries
            .iter_mut()
            .find(|b| b.id == beneficiary.id)
            .ok_or_else(|| RegistryError::not_found("beneficiary", beneficiary.id))?;
        *slot = beneficiary.clone();
        Ok(())
    }

    async fn beneficiary_history(&mut self, contract: ContractId) -> Result<Vec<Beneficiary>> {
        Ok(self
            .view()?
            .beneficiaries
            .iter()
            .filter(|b| b.contract == contract)
            .cloned()
            .collect())
    }

    async fn append_movement(&mut self, movement: &Movement) -> Result<()> {
        self.state()?.movements.push(movement.clone());
        Ok(())
    }

    async fn append_contract_event(&mut self, event: &ContractEvent) -> Result<()> {
        self.state()?.events.push(event.clone());
        Ok(())
    }

    async fn movements(
        &mut self,
        contract: ContractId,
        filter: &MovementFilter,
    ) -> Result<Vec<Movement>> {
        Ok(self
            .view()?
            .movements
            .iter()
            .filter(|m| m.contract == contract && filter.matches(m))
            .cloned()
            .collect())
    }

    async fn case_events(&mut self, case: CaseId) -> Result<Vec<ContractEvent>> {
        Ok(self
            .view()?
            .events
            .iter()
            .filter(|e| e.case == Some(case))
            .cloned()
            .collect())
    }

    async fn commit(&mut self) -> Result<()> {
        let mut guard = self.guard.take().ok_or_else(already_committed)?;
        if let Some(working) = self.working.take() {
            *guard = working;
        }
        Ok(())
    }
}
