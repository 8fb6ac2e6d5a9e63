//! Ownership ledger
//!
//! Holder and beneficiary tenure records per contract. At most one record of each kind per
//! contract is open (null end date) at any committed point.
//!
//! Every operation runs inside the caller's transaction. The open-record pre-check here is the
//! primary guard; the storage uniqueness constraint is the backstop.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::core_types::{BeneficiaryId, CaseId, ContractId, OrgId, OwnershipRecordId, PersonId};
use crate::error::{RegistryError, Result};
use crate::store::CaseTx;

/// One holder's tenure of a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub id: OwnershipRecordId,
    pub org: OrgId,
    pub contract: ContractId,
    pub holder: PersonId,
    pub start_date: NaiveDate,
    /// `None` while active
    pub end_date: Option<NaiveDate>,
    pub provisional: bool,
    pub provisional_until: Option<NaiveDate>,
    pub pensioner: bool,
    pub pensioner_since: Option<NaiveDate>,
    /// Case whose close opened this record
    pub case: Option<CaseId>,
}

impl OwnershipRecord {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }
}

/// Fast-succession designation on a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: BeneficiaryId,
    pub org: OrgId,
    pub contract: ContractId,
    pub person: PersonId,
    pub active_from: NaiveDate,
    /// `None` while active
    pub active_until: Option<NaiveDate>,
    pub case: Option<CaseId>,
}

impl Beneficiary {
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active_until.is_none()
    }
}

fn invariant_violation(contract: ContractId, reason: String) -> RegistryError {
    error!(contract = %contract, reason = %reason, "Ledger invariant violation refused");
    RegistryError::InvariantViolation { contract, reason }
}

/// Open a holder record. Provisional iff `provisional_until` is set.
pub async fn open_holder(
    tx: &mut dyn CaseTx,
    contract: ContractId,
    holder: PersonId,
    start_date: NaiveDate,
    provisional_until: Option<NaiveDate>,
    case: Option<CaseId>,
) -> Result<OwnershipRecord> {
    if let Some(active) = tx.active_holder(contract).await? {
        return Err(invariant_violation(
            contract,
            format!("holder record {} is still open", active.id),
        ));
    }
    if provisional_until.is_some_and(|until| until <= start_date) {
        return Err(RegistryError::validation(
            "provisional_until",
            "must be after the start date",
        ));
    }

    let record = OwnershipRecord {
        id: OwnershipRecordId::new(),
        org: tx.org(),
        contract,
        holder,
        start_date,
        end_date: None,
        provisional: provisional_until.is_some(),
        provisional_until,
        pensioner: false,
        pensioner_since: None,
        case,
    };
    tx.insert_holder(&record).await?;

    info!(
        contract = %contract,
        record = %record.id,
        holder = %holder,
        provisional = record.provisional,
        "Holder record opened"
    );
    Ok(record)
}

/// Close the active holder record, if any. Returns the closed record.
pub async fn close_active_holder(
    tx: &mut dyn CaseTx,
    contract: ContractId,
    end_date: NaiveDate,
) -> Result<Option<OwnershipRecord>> {
    let Some(mut record) = tx.active_holder(contract).await? else {
        return Ok(None);
    };
    if end_date < record.start_date {
        return Err(RegistryError::validation(
            format!("holder record {}", record.id),
            format!("end date {} precedes start date {}", end_date, record.start_date),
        ));
    }

    record.end_date = Some(end_date);
    tx.update_holder(&record).await?;

    info!(contract = %contract, record = %record.id, end = %end_date, "Holder record closed");
    Ok(Some(record))
}

/// Mark the active holder as pensioner from `since`.
pub async fn set_holder_pensioner(
    tx: &mut dyn CaseTx,
    contract: ContractId,
    since: NaiveDate,
) -> Result<OwnershipRecord> {
    let mut record = tx
        .active_holder(contract)
        .await?
        .ok_or_else(|| RegistryError::not_found("active holder of contract", contract))?;
    if since < record.start_date {
        return Err(RegistryError::validation(
            "pensioner_since",
            format!("precedes holder start date {}", record.start_date),
        ));
    }

    record.pensioner = true;
    record.pensioner_since = Some(since);
    tx.update_holder(&record).await?;
    Ok(record)
}

pub async fn open_beneficiary(
    tx: &mut dyn CaseTx,
    contract: ContractId,
    person: PersonId,
    active_from: NaiveDate,
    case: Option<CaseId>,
) -> Result<Beneficiary> {
    if let Some(active) = tx.active_beneficiary(contract).await? {
        return Err(invariant_violation(
            contract,
            format!("beneficiary {} is still active", active.id),
        ));
    }

    let beneficiary = Beneficiary {
        id: BeneficiaryId::new(),
        org: tx.org(),
        contract,
        person,
        active_from,
        active_until: None,
        case,
    };
    tx.insert_beneficiary(&beneficiary).await?;

    info!(
        contract = %contract,
        beneficiary = %beneficiary.id,
        person = %person,
        "Beneficiary opened"
    );
    Ok(beneficiary)
}

/// Close the active beneficiary, if any. Returns the closed designation.
pub async fn close_active_beneficiary(
    tx: &mut dyn CaseTx,
    contract: ContractId,
    active_until: NaiveDate,
) -> Result<Option<Beneficiary>> {
    let Some(mut beneficiary) = tx.active_beneficiary(contract).await? else {
        return Ok(None);
    };
    if active_until < beneficiary.active_from {
        return Err(RegistryError::validation(
            format!("beneficiary {}", beneficiary.id),
            format!(
                "end date {} precedes active-from {}",
                active_until, beneficiary.active_from
            ),
        ));
    }

    beneficiary.active_until = Some(active_until);
    tx.update_beneficiary(&beneficiary).await?;

    info!(contract = %contract, beneficiary = %beneficiary.id, until = %active_until, "Beneficiary closed");
    Ok(Some(beneficiary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::OrgId;
    use crate::store::CaseStore;
    use crate::store::memory::MemoryStore;

    const ORG: OrgId = OrgId(1);
    const CONTRACT: ContractId = ContractId(100);

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_close_then_open_keeps_single_active() {
        let store = MemoryStore::new();
        let mut tx = store.begin(ORG).await.unwrap();

        let first = open_holder(tx.as_mut(), CONTRACT, PersonId(1), date(2020, 1, 1), None, None)
            .await
            .unwrap();
        let closed = close_active_holder(tx.as_mut(), CONTRACT, date(2026, 5, 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.id, first.id);
        assert_eq!(closed.end_date, Some(date(2026, 5, 1)));

        let second = open_holder(tx.as_mut(), CONTRACT, PersonId(2), date(2026, 5, 1), None, None)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin(ORG).await.unwrap();
        let history = tx.holder_history(CONTRACT).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|r| r.is_active()).count(), 1);
        assert_eq!(tx.active_holder(CONTRACT).await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_second_open_holder_is_refused() {
        let store = MemoryStore::new();
        let mut tx = store.begin(ORG).await.unwrap();
        open_holder(tx.as_mut(), CONTRACT, PersonId(1), date(2020, 1, 1), None, None)
            .await
            .unwrap();

        let err = open_holder(tx.as_mut(), CONTRACT, PersonId(2), date(2021, 1, 1), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvariantViolation { contract, .. } if contract == CONTRACT));
    }

    #[tokio::test]
    async fn test_provisional_flag_follows_expiry() {
        let store = MemoryStore::new();
        let mut tx = store.begin(ORG).await.unwrap();
        let record = open_holder(
            tx.as_mut(),
            CONTRACT,
            PersonId(1),
            date(2026, 1, 1),
            Some(date(2036, 1, 1)),
            None,
        )
        .await
        .unwrap();
        assert!(record.provisional);
        assert_eq!(record.provisional_until, Some(date(2036, 1, 1)));
    }

    #[tokio::test]
    async fn test_beneficiary_single_active() {
        let store = MemoryStore::new();
        let mut tx = store.begin(ORG).await.unwrap();
        open_beneficiary(tx.as_mut(), CONTRACT, PersonId(5), date(2024, 1, 1), None)
            .await
            .unwrap();
        let err = open_beneficiary(tx.as_mut(), CONTRACT, PersonId(6), date(2024, 2, 1), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVARIANT_VIOLATION");

        let err = close_active_beneficiary(tx.as_mut(), CONTRACT, date(2023, 12, 31))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        close_active_beneficiary(tx.as_mut(), CONTRACT, date(2024, 3, 1))
            .await
            .unwrap();
        open_beneficiary(tx.as_mut(), CONTRACT, PersonId(6), date(2024, 3, 1), None)
            .await
            .unwrap();
        assert_eq!(
            tx.active_beneficiary(CONTRACT).await.unwrap().unwrap().person,
            PersonId(6)
        );
    }

    #[tokio::test]
    async fn test_close_without_active_is_noop() {
        let store = MemoryStore::new();
        let mut tx = store.begin(ORG).await.unwrap();
        assert!(close_active_holder(tx.as_mut(), CONTRACT, date(2026, 1, 1))
            .await
            .unwrap()
            .is_none());
        assert!(close_active_beneficiary(tx.as_mut(), CONTRACT, date(2026, 1, 1))
            .await
            .unwrap()
            .is_none());
    }
}
