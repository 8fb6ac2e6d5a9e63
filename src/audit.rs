//! Audit mirror
//!
//! Every state transition and ledger mutation is written twice, inside the transaction that
//! performs it:
//!
//! - the **operational** log (`Movement`), read from the contract's side and filterable by
//!   kind, date and holder;
//! - the **administrative** log (`ContractEvent`), read from the case's side.
//!
//! Both are append-only. Nothing updates or deletes an entry.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core_types::{AuditEntryId, CaseId, ContractId, OrgId, OwnershipRecordId, PersonId, UserId};
use crate::error::Result;
use crate::store::CaseTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Case opened
    #[serde(rename = "INICIO_TRANSMISION")]
    CaseOpened,
    #[serde(rename = "DOCUMENTO_SUBIDO")]
    DocumentUploaded,
    #[serde(rename = "DOCUMENTO_VERIFICADO")]
    DocumentVerified,
    #[serde(rename = "DOCUMENTO_RECHAZADO")]
    DocumentRejected,
    #[serde(rename = "ENVIO_REVISION")]
    SubmittedForReview,
    /// Case returned to the applicant for more documents
    #[serde(rename = "DEVOLUCION_DOCUMENTACION")]
    ReturnedForDocuments,
    #[serde(rename = "APROBACION")]
    Approved,
    #[serde(rename = "RECHAZO")]
    Rejected,
    #[serde(rename = "REAPERTURA")]
    Reopened,
    /// Holder changed by a closed case
    #[serde(rename = "CAMBIO_TITULARIDAD")]
    HolderChanged,
    /// Beneficiary nominated
    #[serde(rename = "BENEFICIARIO")]
    BeneficiaryNominated,
    #[serde(rename = "BENEFICIARIO_BAJA")]
    BeneficiaryRemoved,
    #[serde(rename = "PENSIONISTA")]
    PensionerSet,
    /// Initial holder registered outside a case
    #[serde(rename = "ALTA_TITULAR")]
    HolderRegistered,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        EventKind::CaseOpened,
        EventKind::DocumentUploaded,
        EventKind::DocumentVerified,
        EventKind::DocumentRejected,
        EventKind::SubmittedForReview,
        EventKind::ReturnedForDocuments,
        EventKind::Approved,
        EventKind::Rejected,
        EventKind::Reopened,
        EventKind::HolderChanged,
        EventKind::BeneficiaryNominated,
        EventKind::BeneficiaryRemoved,
        EventKind::PensionerSet,
        EventKind::HolderRegistered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CaseOpened => "INICIO_TRANSMISION",
            EventKind::DocumentUploaded => "DOCUMENTO_SUBIDO",
            EventKind::DocumentVerified => "DOCUMENTO_VERIFICADO",
            EventKind::DocumentRejected => "DOCUMENTO_RECHAZADO",
            EventKind::SubmittedForReview => "ENVIO_REVISION",
            EventKind::ReturnedForDocuments => "DEVOLUCION_DOCUMENTACION",
            EventKind::Approved => "APROBACION",
            EventKind::Rejected => "RECHAZO",
            EventKind::Reopened => "REAPERTURA",
            EventKind::HolderChanged => "CAMBIO_TITULARIDAD",
            EventKind::BeneficiaryNominated => "BENEFICIARIO",
            EventKind::BeneficiaryRemoved => "BENEFICIARIO_BAJA",
            EventKind::PensionerSet => "PENSIONISTA",
            EventKind::HolderRegistered => "ALTA_TITULAR",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        EventKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown event kind: {}", s))
    }
}

/// Operational trace entry (contract side)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: AuditEntryId,
    pub org: OrgId,
    pub contract: ContractId,
    pub kind: EventKind,
    /// Holder active when the entry was written
    pub holder: Option<PersonId>,
    pub case: Option<CaseId>,
    pub record: Option<OwnershipRecordId>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
    pub detail: String,
}

/// Administrative trace entry (case side)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractEvent {
    pub id: AuditEntryId,
    pub org: OrgId,
    pub contract: ContractId,
    pub kind: EventKind,
    pub case: Option<CaseId>,
    pub record: Option<OwnershipRecordId>,
    pub actor: UserId,
    pub occurred_at: DateTime<Utc>,
    pub detail: String,
}

/// Movement listing filter
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MovementFilter {
    pub kind: Option<EventKind>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub holder: Option<PersonId>,
}

impl MovementFilter {
    pub fn matches(&self, m: &Movement) -> bool {
        let day = m.occurred_at.date_naive();
        self.kind.is_none_or(|k| m.kind == k)
            && self.from.is_none_or(|d| day >= d)
            && self.to.is_none_or(|d| day <= d)
            && self.holder.is_none_or(|h| m.holder == Some(h))
    }
}

/// What happened, to which contract, on whose behalf
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub kind: EventKind,
    pub contract: ContractId,
    pub case: Option<CaseId>,
    pub record: Option<OwnershipRecordId>,
    pub actor: UserId,
    pub at: DateTime<Utc>,
    pub detail: String,
}

impl AuditEvent {
    pub fn new(kind: EventKind, contract: ContractId, actor: UserId, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            contract,
            case: None,
            record: None,
            actor,
            at,
            detail: String::new(),
        }
    }

    pub fn case(mut self, case: CaseId) -> Self {
        self.case = Some(case);
        self
    }

    pub fn record(mut self, record: OwnershipRecordId) -> Self {
        self.record = Some(record);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Write `event` to both logs in the caller's transaction.
pub async fn record(tx: &mut dyn CaseTx, event: AuditEvent) -> Result<(Movement, ContractEvent)> {
    let holder = tx.active_holder(event.contract).await?.map(|r| r.holder);
    let org = tx.org();

    let movement = Movement {
        id: AuditEntryId::new(),
        org,
        contract: event.contract,
        kind: event.kind,
        holder,
        case: event.case,
        record: event.record,
        actor: event.actor,
        occurred_at: event.at,
        detail: event.detail.clone(),
    };
    let admin = ContractEvent {
        id: AuditEntryId::new(),
        org,
        contract: event.contract,
        kind: event.kind,
        case: event.case,
        record: event.record,
        actor: event.actor,
        occurred_at: event.at,
        detail: event.detail,
    };

    tx.append_movement(&movement).await?;
    tx.append_contract_event(&admin).await?;

    tracing::debug!(
        kind = %event.kind,
        contract = %event.contract,
        case = ?event.case,
        "Audit entry written"
    );
    Ok((movement, admin))
}
