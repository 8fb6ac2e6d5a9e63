//! Document checklist policy
//!
//! Closed, versioned table mapping each transfer type to the supporting documents it needs.
//! Pure lookup: no state, no I/O.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::transfer_case::types::TransferType;

/// Bumped whenever a checklist row changes; stored on every case at creation.
pub const CHECKLIST_VERSION: i16 = 1;

/// Supporting document kinds. Wire codes are the registry's legal document codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DocumentKind {
    #[serde(rename = "CERT_DEFUNCION")]
    DeathCertificate,
    #[serde(rename = "TITULO_SEPULTURA")]
    BurialTitle,
    #[serde(rename = "SOLICITUD_CAMBIO_TITULARIDAD")]
    ChangeOfHolderRequest,
    #[serde(rename = "CERT_ULTIMAS_VOLUNTADES")]
    LastWillsCertificate,
    #[serde(rename = "TESTAMENTO_O_ACEPTACION_HERENCIA")]
    WillOrInheritanceAcceptance,
    #[serde(rename = "LIBRO_FAMILIA_O_TESTIGOS")]
    FamilyBookOrWitnesses,
    #[serde(rename = "CESION_DERECHOS")]
    RightsAssignment,
    #[serde(rename = "DNI_TITULAR_ACTUAL")]
    CurrentHolderId,
    #[serde(rename = "DNI_NUEVO_TITULAR")]
    NewHolderId,
    #[serde(rename = "ACEPTACION_SMSFT")]
    ServiceAcceptance,
    #[serde(rename = "PUBLICACION_BOP")]
    BulletinNotice,
    #[serde(rename = "PUBLICACION_DIARIO")]
    NewspaperNotice,
    #[serde(rename = "SOLICITUD_BENEFICIARIO")]
    BeneficiaryRequest,
    #[serde(rename = "DNI_NUEVO_BENEFICIARIO")]
    NewBeneficiaryId,
}

impl DocumentKind {
    pub const ALL: [DocumentKind; 14] = [
        DocumentKind::DeathCertificate,
        DocumentKind::BurialTitle,
        DocumentKind::ChangeOfHolderRequest,
        DocumentKind::LastWillsCertificate,
        DocumentKind::WillOrInheritanceAcceptance,
        DocumentKind::FamilyBookOrWitnesses,
        DocumentKind::RightsAssignment,
        DocumentKind::CurrentHolderId,
        DocumentKind::NewHolderId,
        DocumentKind::ServiceAcceptance,
        DocumentKind::BulletinNotice,
        DocumentKind::NewspaperNotice,
        DocumentKind::BeneficiaryRequest,
        DocumentKind::NewBeneficiaryId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::DeathCertificate => "CERT_DEFUNCION",
            DocumentKind::BurialTitle => "TITULO_SEPULTURA",
            DocumentKind::ChangeOfHolderRequest => "SOLICITUD_CAMBIO_TITULARIDAD",
            DocumentKind::LastWillsCertificate => "CERT_ULTIMAS_VOLUNTADES",
            DocumentKind::WillOrInheritanceAcceptance => "TESTAMENTO_O_ACEPTACION_HERENCIA",
            DocumentKind::FamilyBookOrWitnesses => "LIBRO_FAMILIA_O_TESTIGOS",
            DocumentKind::RightsAssignment => "CESION_DERECHOS",
            DocumentKind::CurrentHolderId => "DNI_TITULAR_ACTUAL",
            DocumentKind::NewHolderId => "DNI_NUEVO_TITULAR",
            DocumentKind::ServiceAcceptance => "ACEPTACION_SMSFT",
            DocumentKind::BulletinNotice => "PUBLICACION_BOP",
            DocumentKind::NewspaperNotice => "PUBLICACION_DIARIO",
            DocumentKind::BeneficiaryRequest => "SOLICITUD_BENEFICIARIO",
            DocumentKind::NewBeneficiaryId => "DNI_NUEVO_BENEFICIARIO",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown document kind: {}", s))
    }
}

/// Documents a `REPLACE` beneficiary decision must have verified before closing.
pub const BENEFICIARY_REPLACEMENT_DOCUMENTS: [DocumentKind; 2] = [
    DocumentKind::BeneficiaryRequest,
    DocumentKind::NewBeneficiaryId,
];

use DocumentKind::*;

const TESTATE_REQUIRED: &[DocumentKind] = &[
    DeathCertificate,
    BurialTitle,
    ChangeOfHolderRequest,
    LastWillsCertificate,
    WillOrInheritanceAcceptance,
];
const TESTATE_OPTIONAL: &[DocumentKind] = &[
    RightsAssignment,
    BeneficiaryRequest,
    NewBeneficiaryId,
];

const INTESTATE_REQUIRED: &[DocumentKind] = &[
    DeathCertificate,
    BurialTitle,
    ChangeOfHolderRequest,
    LastWillsCertificate,
];
const INTESTATE_OPTIONAL: &[DocumentKind] = &[
    FamilyBookOrWitnesses,
    RightsAssignment,
    BeneficiaryRequest,
    NewBeneficiaryId,
];

const INTER_VIVOS_REQUIRED: &[DocumentKind] = &[
    ChangeOfHolderRequest,
    BurialTitle,
    CurrentHolderId,
    NewHolderId,
];
const INTER_VIVOS_OPTIONAL: &[DocumentKind] = &[BeneficiaryRequest, NewBeneficiaryId];

const PROVISIONAL_REQUIRED: &[DocumentKind] = &[
    ChangeOfHolderRequest,
    ServiceAcceptance,
    BulletinNotice,
    NewspaperNotice,
];
const PROVISIONAL_OPTIONAL: &[DocumentKind] = &[BeneficiaryRequest, NewBeneficiaryId];

/// Documents that must be `VERIFIED` before a case of this type can leave `DOCS_PENDING`.
pub fn required_documents(transfer_type: TransferType) -> &'static [DocumentKind] {
    match transfer_type {
        TransferType::MortisCausaTestamento => TESTATE_REQUIRED,
        TransferType::MortisCausaSinTestamento => INTESTATE_REQUIRED,
        TransferType::InterVivos => INTER_VIVOS_REQUIRED,
        TransferType::Provisional => PROVISIONAL_REQUIRED,
    }
}

pub fn optional_documents(transfer_type: TransferType) -> &'static [DocumentKind] {
    match transfer_type {
        TransferType::MortisCausaTestamento => TESTATE_OPTIONAL,
        TransferType::MortisCausaSinTestamento => INTESTATE_OPTIONAL,
        TransferType::InterVivos => INTER_VIVOS_OPTIONAL,
        TransferType::Provisional => PROVISIONAL_OPTIONAL,
    }
}

/// Full checklist in slot order: required entries first, each paired with its `required` flag.
pub fn checklist(transfer_type: TransferType) -> impl Iterator<Item = (DocumentKind, bool)> {
    required_documents(transfer_type)
        .iter()
        .map(|k| (*k, true))
        .chain(optional_documents(transfer_type).iter().map(|k| (*k, false)))
}
