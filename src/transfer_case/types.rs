//! Transfer case types
//!
//! The case aggregate owns its documents, parties and publications. It references the contract
//! and the ledger only by id.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::ContractEvent;
use crate::checklist::{self, DocumentKind};
use crate::core_types::{
    CaseDocumentId, CaseId, ContractId, DocumentRef, OrgId, OwnershipRecordId, PartyId, PersonId,
    PublicationId, UserId,
};
use crate::ledger::{Beneficiary, OwnershipRecord};

use super::state::CaseStatus;

/// Channel code of the official provincial bulletin
pub const BULLETIN_CHANNEL: &str = "BOP";

/// Legal basis of the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransferType {
    /// Succession on death, with a will
    MortisCausaTestamento = 1,
    /// Succession on death, without a will
    MortisCausaSinTestamento = 2,
    /// Cession between living persons
    InterVivos = 3,
    /// Provisional grant pending full succession proof
    Provisional = 4,
}

impl TransferType {
    pub const ALL: [TransferType; 4] = [
        TransferType::MortisCausaTestamento,
        TransferType::MortisCausaSinTestamento,
        TransferType::InterVivos,
        TransferType::Provisional,
    ];

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(TransferType::MortisCausaTestamento),
            2 => Some(TransferType::MortisCausaSinTestamento),
            3 => Some(TransferType::InterVivos),
            4 => Some(TransferType::Provisional),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::MortisCausaTestamento => "MORTIS_CAUSA_TESTAMENTO",
            TransferType::MortisCausaSinTestamento => "MORTIS_CAUSA_SIN_TESTAMENTO",
            TransferType::InterVivos => "INTER_VIVOS",
            TransferType::Provisional => "PROVISIONAL",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransferType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown transfer type: {}", s))
    }
}

/// Transfer-type dependent part of a case.
///
/// Only the provisional variant carries publications and a provisional expiry, so a
/// non-provisional case cannot hold either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transfer_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferTerms {
    MortisCausaTestamento,
    MortisCausaSinTestamento,
    InterVivos,
    Provisional {
        publications: Vec<Publication>,
        /// Set when the case closes: closing date + 10 years
        provisional_until: Option<NaiveDate>,
    },
}

impl TransferTerms {
    pub fn new(transfer_type: TransferType) -> Self {
        match transfer_type {
            TransferType::MortisCausaTestamento => TransferTerms::MortisCausaTestamento,
            TransferType::MortisCausaSinTestamento => TransferTerms::MortisCausaSinTestamento,
            TransferType::InterVivos => TransferTerms::InterVivos,
            TransferType::Provisional => TransferTerms::Provisional {
                publications: Vec::new(),
                provisional_until: None,
            },
        }
    }

    pub fn transfer_type(&self) -> TransferType {
        match self {
            TransferTerms::MortisCausaTestamento => TransferType::MortisCausaTestamento,
            TransferTerms::MortisCausaSinTestamento => TransferType::MortisCausaSinTestamento,
            TransferTerms::InterVivos => TransferType::InterVivos,
            TransferTerms::Provisional { .. } => TransferType::Provisional,
        }
    }

    pub fn publications(&self) -> &[Publication] {
        match self {
            TransferTerms::Provisional { publications, .. } => publications,
            _ => &[],
        }
    }

    pub fn provisional_until(&self) -> Option<NaiveDate> {
        match self {
            TransferTerms::Provisional {
                provisional_until, ..
            } => *provisional_until,
            _ => None,
        }
    }

    /// BOP plus at least one other channel
    pub fn has_required_publications(&self) -> bool {
        let pubs = self.publications();
        pubs.iter().any(|p| p.channel == BULLETIN_CHANNEL)
            && pubs.iter().any(|p| p.channel != BULLETIN_CHANNEL)
    }
}

/// Verification status of one checklist slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum DocumentStatus {
    Missing = 0,
    Uploaded = 1,
    Verified = 2,
    Rejected = -1,
}

impl DocumentStatus {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(DocumentStatus::Missing),
            1 => Some(DocumentStatus::Uploaded),
            2 => Some(DocumentStatus::Verified),
            -1 => Some(DocumentStatus::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Missing => "MISSING",
            DocumentStatus::Uploaded => "UPLOADED",
            DocumentStatus::Verified => "VERIFIED",
            DocumentStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer verdict on an uploaded document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationOutcome {
    Verified,
    Rejected,
}

impl VerificationOutcome {
    pub fn status(&self) -> DocumentStatus {
        match self {
            VerificationOutcome::Verified => DocumentStatus::Verified,
            VerificationOutcome::Rejected => DocumentStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseDocument {
    pub id: CaseDocumentId,
    pub kind: DocumentKind,
    pub required: bool,
    pub file_ref: Option<DocumentRef>,
    pub status: DocumentStatus,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub verified_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl CaseDocument {
    pub fn missing(kind: DocumentKind, required: bool) -> Self {
        Self {
            id: CaseDocumentId::new(),
            kind,
            required,
            file_ref: None,
            status: DocumentStatus::Missing,
            uploaded_at: None,
            verified_at: None,
            note: None,
        }
    }
}

/// Role of a person in a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i16)]
pub enum PartyRole {
    /// Deceased holder
    #[serde(rename = "CAUSANT")]
    Causant = 1,
    #[serde(rename = "ANTERIOR_TITULAR")]
    PreviousHolder = 2,
    #[serde(rename = "NUEVO_TITULAR")]
    NewHolder = 3,
    #[serde(rename = "REPRESENTANTE")]
    Representative = 4,
    #[serde(rename = "HEREDERO")]
    Heir = 5,
    #[serde(rename = "OTRO")]
    Other = 9,
}

impl PartyRole {
    pub const ALL: [PartyRole; 6] = [
        PartyRole::Causant,
        PartyRole::PreviousHolder,
        PartyRole::NewHolder,
        PartyRole::Representative,
        PartyRole::Heir,
        PartyRole::Other,
    ];

    /// A case holds at most one party with this role; adding another replaces it.
    #[inline]
    pub fn is_single_occupancy(&self) -> bool {
        !matches!(self, PartyRole::Heir | PartyRole::Other)
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        PartyRole::ALL.iter().copied().find(|r| r.id() == id)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PartyRole::Causant => "CAUSANT",
            PartyRole::PreviousHolder => "ANTERIOR_TITULAR",
            PartyRole::NewHolder => "NUEVO_TITULAR",
            PartyRole::Representative => "REPRESENTANTE",
            PartyRole::Heir => "HEREDERO",
            PartyRole::Other => "OTRO",
        }
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PartyRole::ALL
            .iter()
            .copied()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown party role: {}", s))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Party {
    pub id: PartyId,
    pub person: PersonId,
    pub role: PartyRole,
    /// Share of the right, in percent (0, 100]
    pub share: Option<Decimal>,
    pub added_at: DateTime<Utc>,
}

/// Party as supplied by a caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NewParty {
    pub person: PersonId,
    pub role: PartyRole,
    pub share: Option<Decimal>,
}

impl NewParty {
    pub fn new(person: PersonId, role: PartyRole) -> Self {
        Self {
            person,
            role,
            share: None,
        }
    }

    pub fn with_share(mut self, share: Decimal) -> Self {
        self.share = Some(share);
        self
    }
}

/// Mandatory public notice of a provisional transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    /// Normalized channel code (`BOP`, newspaper name, ...)
    pub channel: String,
    pub published_on: NaiveDate,
    pub reference: Option<String>,
}

/// Ownership transfer case aggregate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferCase {
    pub id: CaseId,
    pub org: OrgId,
    /// `TR-YYYY-####`
    pub number: String,
    pub contract: ContractId,
    #[serde(flatten)]
    pub terms: TransferTerms,
    pub status: CaseStatus,
    pub checklist_version: i16,
    pub documents: Vec<CaseDocument>,
    pub parties: Vec<Party>,
    pub created_at: DateTime<Utc>,
    pub created_by: UserId,
    pub resolved_at: Option<DateTime<Utc>>,
    /// `RES-YYYY-####`, set on close
    pub resolution_number: Option<String>,
    pub resolution_ref: Option<DocumentRef>,
    /// Ownership record opened by the close
    pub new_record: Option<OwnershipRecordId>,
    pub rejection_reason: Option<String>,
    pub reopen_count: u32,
}

impl TransferCase {
    /// A fresh case in `DOCS_PENDING` with one `MISSING` slot per checklist entry.
    pub fn new(
        org: OrgId,
        number: String,
        contract: ContractId,
        transfer_type: TransferType,
        created_at: DateTime<Utc>,
        created_by: UserId,
    ) -> Self {
        let documents = checklist::checklist(transfer_type)
            .map(|(kind, required)| CaseDocument::missing(kind, required))
            .collect();

        Self {
            id: CaseId::new(),
            org,
            number,
            contract,
            terms: TransferTerms::new(transfer_type),
            status: CaseStatus::DocsPending,
            checklist_version: checklist::CHECKLIST_VERSION,
            documents,
            parties: Vec::new(),
            created_at,
            created_by,
            resolved_at: None,
            resolution_number: None,
            resolution_ref: None,
            new_record: None,
            rejection_reason: None,
            reopen_count: 0,
        }
    }

    #[inline]
    pub fn transfer_type(&self) -> TransferType {
        self.terms.transfer_type()
    }

    pub fn document(&self, kind: DocumentKind) -> Option<&CaseDocument> {
        self.documents.iter().find(|d| d.kind == kind)
    }

    pub fn document_mut(&mut self, kind: DocumentKind) -> Option<&mut CaseDocument> {
        self.documents.iter_mut().find(|d| d.kind == kind)
    }

    /// Required documents of this case's type that are not yet `VERIFIED`
    pub fn unverified_required(&self) -> Vec<DocumentKind> {
        self.unverified(checklist::required_documents(self.transfer_type()))
    }

    pub fn unverified(&self, kinds: &[DocumentKind]) -> Vec<DocumentKind> {
        kinds
            .iter()
            .copied()
            .filter(|k| {
                self.document(*k)
                    .is_none_or(|d| d.status != DocumentStatus::Verified)
            })
            .collect()
    }

    pub fn parties_with_role(&self, role: PartyRole) -> impl Iterator<Item = &Party> {
        self.parties.iter().filter(move |p| p.role == role)
    }

    pub fn new_holder(&self) -> Option<&Party> {
        self.parties_with_role(PartyRole::NewHolder).next()
    }

    pub fn involves_person(&self, person: PersonId) -> bool {
        self.parties.iter().any(|p| p.person == person)
    }
}

/// Beneficiary handling requested at close
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BeneficiaryDecision {
    /// Leave the active beneficiary untouched
    Keep,
    /// Close the active beneficiary and nominate `person`
    Replace { person: PersonId },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub beneficiary_decision: Option<BeneficiaryDecision>,
    /// Marks the new holder as pensioner from this date
    pub pensioner_since: Option<NaiveDate>,
}

impl CloseRequest {
    pub fn keep() -> Self {
        Self {
            beneficiary_decision: Some(BeneficiaryDecision::Keep),
            pensioner_since: None,
        }
    }

    pub fn replace(person: PersonId) -> Self {
        Self {
            beneficiary_decision: Some(BeneficiaryDecision::Replace { person }),
            pensioner_since: None,
        }
    }
}

/// Case listing filter; every field narrows the result
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CaseFilter {
    pub transfer_type: Option<TransferType>,
    pub status: Option<CaseStatus>,
    pub contract: Option<ContractId>,
    pub opened_from: Option<NaiveDate>,
    pub opened_to: Option<NaiveDate>,
    pub party: Option<PersonId>,
}

impl CaseFilter {
    pub fn matches(&self, case: &TransferCase) -> bool {
        let opened = case.created_at.date_naive();
        self.transfer_type.is_none_or(|t| case.transfer_type() == t)
            && self.status.is_none_or(|s| case.status == s)
            && self.contract.is_none_or(|c| case.contract == c)
            && self.opened_from.is_none_or(|d| opened >= d)
            && self.opened_to.is_none_or(|d| opened <= d)
            && self.party.is_none_or(|p| case.involves_person(p))
    }
}

/// Case plus the ledger context a reviewer needs
#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    pub case: TransferCase,
    pub active_holder: Option<OwnershipRecord>,
    pub active_beneficiary: Option<Beneficiary>,
    pub pending_documents: Vec<DocumentKind>,
    pub events: Vec<ContractEvent>,
}
