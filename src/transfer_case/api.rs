//! Transfer Case API Layer
//!
//! Wire DTOs for the gateway. Payloads are format-checked with `validator`, then parsed into
//! domain types; anything that fails either step is a `VALIDATION_ERROR` before the service runs.

use std::str::FromStr;

use axum::http::StatusCode;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::audit::{EventKind, MovementFilter};
use crate::checklist::DocumentKind;
use crate::core_types::{ContractId, DocumentRef, PartyId, PersonId};
use crate::error::RegistryError;

use super::coordinator::{CreateCase, NewPublication};
use super::state::CaseStatus;
use super::types::{
    BeneficiaryDecision, CaseFilter, CloseRequest, NewParty, PartyRole, TransferType,
    VerificationOutcome,
};

// ============================================================================
// Error Codes
// ============================================================================

pub mod error_codes {
    pub const VALIDATION_ERROR: i32 = 1001;
    pub const DOCUMENTS_INCOMPLETE: i32 = 1002;
    pub const BENEFICIARY_DECISION_REQUIRED: i32 = 1003;
    pub const MISSING_PARTY: i32 = 1004;
    pub const MISSING_AUTH: i32 = 2001;
    pub const FORBIDDEN: i32 = 2003;
    pub const INVALID_STATE: i32 = 3001;
    pub const INVALID_CONTRACT: i32 = 3002;
    pub const NOT_FOUND: i32 = 4001;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const INVARIANT_VIOLATION: i32 = 5002;
}

/// Map RegistryError to (StatusCode, error_code, message)
pub fn map_error(e: &RegistryError) -> (StatusCode, i32, String) {
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let code = match e.code() {
        "VALIDATION_ERROR" => error_codes::VALIDATION_ERROR,
        "DOCUMENTS_INCOMPLETE" => error_codes::DOCUMENTS_INCOMPLETE,
        "BENEFICIARY_DECISION_REQUIRED" => error_codes::BENEFICIARY_DECISION_REQUIRED,
        "MISSING_PARTY" => error_codes::MISSING_PARTY,
        "FORBIDDEN" => error_codes::FORBIDDEN,
        "INVALID_STATE" => error_codes::INVALID_STATE,
        "INVALID_CONTRACT" => error_codes::INVALID_CONTRACT,
        "NOT_FOUND" => error_codes::NOT_FOUND,
        "INVARIANT_VIOLATION" => error_codes::INVARIANT_VIOLATION,
        _ => error_codes::INTERNAL_ERROR,
    };

    // Storage details stay in the logs
    let msg = match e {
        RegistryError::Storage(_) => "internal error".to_string(),
        _ => e.to_string(),
    };

    (status, code, msg)
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse<T>(field: &str, value: &str) -> Result<T, RegistryError>
where
    T: FromStr<Err = String>,
{
    value
        .trim()
        .to_uppercase()
        .parse()
        .map_err(|e: String| RegistryError::validation(field, e))
}

fn parse_opt<T>(field: &str, value: Option<&str>) -> Result<Option<T>, RegistryError>
where
    T: FromStr<Err = String>,
{
    value.map(|v| parse(field, v)).transpose()
}

fn check<T: Validate>(dto: &T) -> Result<(), RegistryError> {
    dto.validate()
        .map_err(|e| RegistryError::validation("request", e.to_string().replace('\n', "; ")))
}

fn parse_share(value: Option<&str>) -> Result<Option<Decimal>, RegistryError> {
    value
        .map(|s| {
            Decimal::from_str(s.trim())
                .map_err(|_| RegistryError::validation("share", format!("invalid decimal: {}", s)))
        })
        .transpose()
}

/// Parse a case, party or publication id taken from a path segment
pub fn parse_id<T: FromStr>(kind: &'static str, raw: &str) -> Result<T, RegistryError> {
    raw.parse()
        .map_err(|_| RegistryError::validation(kind, format!("invalid id: {}", raw)))
}

// ============================================================================
// API Request Types
// ============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct PartyApiRequest {
    #[validate(range(min = 1))]
    pub person_id: i64,
    /// CAUSANT, ANTERIOR_TITULAR, NUEVO_TITULAR, REPRESENTANTE, HEREDERO, OTRO
    #[validate(length(min = 1, max = 32))]
    pub role: String,
    /// Percentage as string, e.g. "50" or "33.33"
    pub share: Option<String>,
}

impl PartyApiRequest {
    pub fn into_domain(self) -> Result<NewParty, RegistryError> {
        check(&self)?;
        let role: PartyRole = parse("role", &self.role)?;
        let mut party = NewParty::new(PersonId(self.person_id), role);
        if let Some(share) = parse_share(self.share.as_deref())? {
            party = party.with_share(share);
        }
        Ok(party)
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCaseApiRequest {
    #[validate(range(min = 1))]
    pub contract_id: i64,
    /// MORTIS_CAUSA_TESTAMENTO, MORTIS_CAUSA_SIN_TESTAMENTO, INTER_VIVOS, PROVISIONAL
    #[validate(length(min = 1, max = 64))]
    pub transfer_type: String,
    #[serde(default)]
    #[validate(nested)]
    pub parties: Vec<PartyApiRequest>,
}

impl CreateCaseApiRequest {
    pub fn into_domain(self) -> Result<CreateCase, RegistryError> {
        check(&self)?;
        Ok(CreateCase {
            contract: ContractId(self.contract_id),
            transfer_type: parse("transfer_type", &self.transfer_type)?,
            parties: self
                .parties
                .into_iter()
                .map(PartyApiRequest::into_domain)
                .collect::<Result<_, _>>()?,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UploadDocumentApiRequest {
    #[validate(length(min = 1, max = 64))]
    pub kind: String,
    #[validate(length(min = 1, max = 512))]
    pub file_ref: String,
}

impl UploadDocumentApiRequest {
    pub fn into_domain(self) -> Result<(DocumentKind, DocumentRef), RegistryError> {
        check(&self)?;
        Ok((parse("kind", &self.kind)?, DocumentRef(self.file_ref)))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyDocumentApiRequest {
    #[validate(length(min = 1, max = 64))]
    pub kind: String,
    /// VERIFIED or REJECTED
    pub outcome: String,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
}

impl VerifyDocumentApiRequest {
    pub fn into_domain(
        self,
    ) -> Result<(DocumentKind, VerificationOutcome, Option<String>), RegistryError> {
        check(&self)?;
        let outcome = match self.outcome.trim().to_uppercase().as_str() {
            "VERIFIED" => VerificationOutcome::Verified,
            "REJECTED" => VerificationOutcome::Rejected,
            other => {
                return Err(RegistryError::validation(
                    "outcome",
                    format!("expected VERIFIED or REJECTED, got {}", other),
                ));
            }
        };
        Ok((parse("kind", &self.kind)?, outcome, self.note))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PublicationApiRequest {
    #[validate(length(min = 1, max = 32))]
    pub channel: String,
    pub published_on: NaiveDate,
    #[validate(length(max = 256))]
    pub reference: Option<String>,
}

impl PublicationApiRequest {
    pub fn into_domain(self) -> Result<NewPublication, RegistryError> {
        check(&self)?;
        Ok(NewPublication {
            channel: self.channel,
            published_on: self.published_on,
            reference: self.reference,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectApiRequest {
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ReturnForDocumentsApiRequest {
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
}

impl RejectApiRequest {
    pub fn into_domain(self) -> Result<String, RegistryError> {
        check(&self)?;
        Ok(self.reason)
    }
}

impl ReturnForDocumentsApiRequest {
    pub fn into_domain(self) -> Result<Option<String>, RegistryError> {
        check(&self)?;
        Ok(self.reason)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CloseCaseApiRequest {
    /// KEEP or REPLACE; required when the contract has an active beneficiary
    pub beneficiary_decision: Option<String>,
    /// New beneficiary; only valid with REPLACE
    pub beneficiary_person_id: Option<i64>,
    pub pensioner_since: Option<NaiveDate>,
}

impl CloseCaseApiRequest {
    pub fn into_domain(self) -> Result<CloseRequest, RegistryError> {
        check(&self)?;
        let decision = self.beneficiary_decision.as_deref().map(str::trim);
        let replacing = decision.is_some_and(|d| d.eq_ignore_ascii_case("REPLACE"));
        if self.beneficiary_person_id.is_some() && !replacing {
            return Err(RegistryError::validation(
                "beneficiary_person_id",
                "only allowed with a REPLACE decision",
            ));
        }
        let beneficiary_decision = match decision {
            None => None,
            Some(d) if d.eq_ignore_ascii_case("KEEP") => Some(BeneficiaryDecision::Keep),
            Some(d) if d.eq_ignore_ascii_case("REPLACE") => {
                let person = self.beneficiary_person_id.ok_or_else(|| {
                    RegistryError::validation(
                        "beneficiary_person_id",
                        "required for a REPLACE decision",
                    )
                })?;
                Some(BeneficiaryDecision::Replace {
                    person: PersonId(person),
                })
            }
            Some(other) => {
                return Err(RegistryError::validation(
                    "beneficiary_decision",
                    format!("expected KEEP or REPLACE, got {}", other),
                ));
            }
        };
        Ok(CloseRequest {
            beneficiary_decision,
            pensioner_since: self.pensioner_since,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterHolderApiRequest {
    #[validate(range(min = 1))]
    pub person_id: i64,
    pub start_date: NaiveDate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NominateBeneficiaryApiRequest {
    #[validate(range(min = 1))]
    pub person_id: i64,
    /// Defaults to today
    pub active_from: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct RemoveBeneficiaryApiRequest {
    /// Defaults to today
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PensionerApiRequest {
    pub since: NaiveDate,
    #[serde(default)]
    pub allow_retroactive: bool,
}

impl RegisterHolderApiRequest {
    pub fn into_domain(self) -> Result<(PersonId, NaiveDate), RegistryError> {
        check(&self)?;
        Ok((PersonId(self.person_id), self.start_date))
    }
}

impl NominateBeneficiaryApiRequest {
    pub fn into_domain(self) -> Result<(PersonId, Option<NaiveDate>), RegistryError> {
        check(&self)?;
        Ok((PersonId(self.person_id), self.active_from))
    }
}

// ============================================================================
// Query Strings
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CaseListQuery {
    pub transfer_type: Option<String>,
    pub status: Option<String>,
    pub contract_id: Option<i64>,
    pub opened_from: Option<NaiveDate>,
    pub opened_to: Option<NaiveDate>,
    pub party_id: Option<i64>,
}

impl CaseListQuery {
    pub fn into_filter(self) -> Result<CaseFilter, RegistryError> {
        Ok(CaseFilter {
            transfer_type: parse_opt::<TransferType>("transfer_type", self.transfer_type.as_deref())?,
            status: parse_opt::<CaseStatus>("status", self.status.as_deref())?,
            contract: self.contract_id.map(ContractId),
            opened_from: self.opened_from,
            opened_to: self.opened_to,
            party: self.party_id.map(PersonId),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct MovementQuery {
    pub kind: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub holder_id: Option<i64>,
}

impl MovementQuery {
    pub fn into_filter(self) -> Result<MovementFilter, RegistryError> {
        Ok(MovementFilter {
            kind: parse_opt::<EventKind>("kind", self.kind.as_deref())?,
            from: self.from,
            to: self.to,
            holder: self.holder_id.map(PersonId),
        })
    }
}

/// Path segment of `DELETE /cases/{id}/parties/{party_id}`
pub fn parse_party_id(raw: &str) -> Result<PartyId, RegistryError> {
    parse_id("party_id", raw)
}

/// Checklist kind from a path segment, case-insensitive
pub fn parse_document_kind(raw: &str) -> Result<DocumentKind, RegistryError> {
    parse("kind", raw)
}
