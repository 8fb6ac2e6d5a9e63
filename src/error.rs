//! Registry error taxonomy
//!
//! Every variant names the entity that caused the rejection so callers can point the user at
//! it. Codes are stable and used verbatim in API responses.

use thiserror::Error;

use crate::core_types::{CaseId, ContractId, UserId};

/// Unique index guarding "one open holder per contract"
pub const UQ_OPEN_HOLDER: &str = "uq_ownership_open_per_contract";
/// Unique index guarding "one open beneficiary per contract"
pub const UQ_OPEN_BENEFICIARY: &str = "uq_beneficiary_open_per_contract";
/// Unique index guarding "one open case per contract"
pub const UQ_OPEN_CASE: &str = "uq_case_open_per_contract";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    // === Validation Errors ===
    #[error("Invalid {entity}: {reason}")]
    Validation { entity: String, reason: String },

    #[error("User {user} is not allowed to {operation}")]
    Forbidden {
        user: UserId,
        operation: &'static str,
    },

    // === Workflow Errors ===
    #[error("Cannot {operation} {entity} in status {status}")]
    InvalidState {
        entity: String,
        status: String,
        operation: &'static str,
    },

    #[error("Contract {contract} rejected: {reason}")]
    InvalidContract { contract: ContractId, reason: String },

    #[error("Case {case} has unverified documents: {}", .missing.join(", "))]
    DocumentsIncomplete { case: CaseId, missing: Vec<String> },

    #[error("Case {case}: contract {contract} has an active beneficiary; KEEP or REPLACE required")]
    BeneficiaryDecisionRequired { case: CaseId, contract: ContractId },

    #[error("Case {case} has no {role} party")]
    MissingParty { case: CaseId, role: &'static str },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    // === Ledger Errors ===
    #[error("Ledger invariant violated on contract {contract}: {reason}")]
    InvariantViolation { contract: ContractId, reason: String },

    // === System Errors ===
    #[error("Storage error: {0}")]
    Storage(String),
}

impl RegistryError {
    pub fn validation(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        RegistryError::Validation {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        RegistryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(
        entity: impl ToString,
        status: impl ToString,
        operation: &'static str,
    ) -> Self {
        RegistryError::InvalidState {
            entity: entity.to_string(),
            status: status.to_string(),
            operation,
        }
    }

    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::Validation { .. } => "VALIDATION_ERROR",
            RegistryError::Forbidden { .. } => "FORBIDDEN",
            RegistryError::InvalidState { .. } => "INVALID_STATE",
            RegistryError::InvalidContract { .. } => "INVALID_CONTRACT",
            RegistryError::DocumentsIncomplete { .. } => "DOCUMENTS_INCOMPLETE",
            RegistryError::BeneficiaryDecisionRequired { .. } => "BENEFICIARY_DECISION_REQUIRED",
            RegistryError::MissingParty { .. } => "MISSING_PARTY",
            RegistryError::NotFound { .. } => "NOT_FOUND",
            RegistryError::InvariantViolation { .. } => "INVARIANT_VIOLATION",
            RegistryError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            RegistryError::Validation { .. } => 400,
            RegistryError::Forbidden { .. } => 403,
            RegistryError::NotFound { .. } => 404,
            RegistryError::InvalidState { .. } | RegistryError::InvalidContract { .. } => 409,
            RegistryError::DocumentsIncomplete { .. }
            | RegistryError::BeneficiaryDecisionRequired { .. }
            | RegistryError::MissingParty { .. } => 422,
            RegistryError::InvariantViolation { .. } | RegistryError::Storage(_) => 500,
        }
    }

    /// User-actionable rejection (logged at warn, surfaced verbatim)
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidState { .. }
                | RegistryError::InvalidContract { .. }
                | RegistryError::DocumentsIncomplete { .. }
                | RegistryError::BeneficiaryDecisionRequired { .. }
                | RegistryError::MissingParty { .. }
        )
    }

    /// Map a failed insert/update on a contract-scoped row.
    ///
    /// Unique violations on the open-record indexes are the storage backstop of the ledger and
    /// case invariants; they surface as the same errors the explicit pre-checks raise.
    pub fn from_write(e: sqlx::Error, contract: ContractId) -> Self {
        let constraint = e
            .as_database_error()
            .filter(|db| db.is_unique_violation())
            .and_then(|db| db.constraint().map(str::to_owned));

        match constraint.as_deref() {
            Some(UQ_OPEN_HOLDER) => RegistryError::InvariantViolation {
                contract,
                reason: "a second open ownership record was rejected by storage".to_string(),
            },
            Some(UQ_OPEN_BENEFICIARY) => RegistryError::InvariantViolation {
                contract,
                reason: "a second open beneficiary was rejected by storage".to_string(),
            },
            Some(UQ_OPEN_CASE) => RegistryError::InvalidContract {
                contract,
                reason: "contract already has an open transfer case".to_string(),
            },
            _ => RegistryError::from(e),
        }
    }
}

impl From<sqlx::Error> for RegistryError {
    fn from(e: sqlx::Error) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

impl From<anyhow::Error> for RegistryError {
    fn from(e: anyhow::Error) -> Self {
        RegistryError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            RegistryError::validation("publication", "x").code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            RegistryError::BeneficiaryDecisionRequired {
                case: CaseId::new(),
                contract: ContractId(1),
            }
            .code(),
            "BENEFICIARY_DECISION_REQUIRED"
        );
        assert_eq!(RegistryError::Storage("x".into()).code(), "STORAGE_ERROR");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(RegistryError::not_found("case", "abc").http_status(), 404);
        assert_eq!(
            RegistryError::invalid_state("case", "CLOSED", "close").http_status(),
            409
        );
        assert_eq!(
            RegistryError::DocumentsIncomplete {
                case: CaseId::new(),
                missing: vec![],
            }
            .http_status(),
            422
        );
        assert_eq!(
            RegistryError::InvariantViolation {
                contract: ContractId(7),
                reason: "x".into(),
            }
            .http_status(),
            500
        );
    }

    #[test]
    fn test_display_names_entity() {
        let case = CaseId::new();
        let err = RegistryError::DocumentsIncomplete {
            case,
            missing: vec!["CERT_DEFUNCION".into(), "TITULO_SEPULTURA".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains(&case.to_string()));
        assert!(msg.contains("CERT_DEFUNCION, TITULO_SEPULTURA"));
    }

    #[test]
    fn test_non_database_error_maps_to_storage() {
        let err = RegistryError::from_write(sqlx::Error::RowNotFound, ContractId(3));
        assert_eq!(err.code(), "STORAGE_ERROR");
    }
}
