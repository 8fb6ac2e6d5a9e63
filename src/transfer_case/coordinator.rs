//! Transfer Case Coordinator
//!
//! Drives a case from creation through document verification, review and the atomic close.
//! Every operation runs in exactly one store transaction: it either commits all of its case,
//! ledger and audit writes, or none of them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::adapters::{
    ContractDirectory, ContractInfo, ContractStatus, DocumentStorage, Person, PersonDirectory,
};
use crate::audit::{self, AuditEvent, EventKind, Movement, MovementFilter};
use crate::checklist::{BENEFICIARY_REPLACEMENT_DOCUMENTS, DocumentKind};
use crate::core_types::{
    Actor, CaseId, Clock, ContractId, DocumentRef, OrgId, PartyId, PersonId, PublicationId,
    add_years,
};
use crate::error::{RegistryError, Result};
use crate::ledger::{self, Beneficiary, OwnershipRecord};
use crate::numbering;
use crate::store::{CaseStore, CaseTx};

use super::state::{CaseAction, CaseStatus};
use super::types::{
    BULLETIN_CHANNEL, BeneficiaryDecision, CaseDetail, CaseDocument, CaseFilter, CloseRequest,
    DocumentStatus, NewParty, Party, PartyRole, Publication, TransferCase, TransferTerms,
    TransferType, VerificationOutcome,
};

/// Provisional tenure length
pub const PROVISIONAL_YEARS: i32 = 10;

/// Workflow limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    /// A rejected case may be reopened this many times; after that it is terminal
    pub max_reopens: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self { max_reopens: 3 }
    }
}

/// Case creation request
#[derive(Debug, Clone, PartialEq)]
pub struct CreateCase {
    pub contract: ContractId,
    pub transfer_type: TransferType,
    pub parties: Vec<NewParty>,
}

/// Publication as supplied by a caller
#[derive(Debug, Clone, PartialEq)]
pub struct NewPublication {
    pub channel: String,
    pub published_on: NaiveDate,
    pub reference: Option<String>,
}

/// Outcome of a case mutation: the value handed back plus the audit entry to write
struct Applied<T> {
    output: T,
    event: Option<(EventKind, String)>,
}

impl<T> Applied<T> {
    fn new(output: T) -> Self {
        Self {
            output,
            event: None,
        }
    }

    fn event(mut self, kind: EventKind, detail: impl Into<String>) -> Self {
        self.event = Some((kind, detail.into()));
        self
    }
}

fn log_rejection(op: &'static str, entity: &str, e: &RegistryError) {
    match e {
        RegistryError::InvariantViolation { .. } | RegistryError::Storage(_) => {
            tracing::error!(op, entity, code = e.code(), error = %e, "Operation failed");
        }
        _ if e.is_user_actionable() => {
            warn!(op, entity, code = e.code(), error = %e, "Operation rejected");
        }
        _ => {
            info!(op, entity, code = e.code(), error = %e, "Operation rejected");
        }
    }
}

async fn load_case(tx: &mut dyn CaseTx, id: CaseId) -> Result<TransferCase> {
    tx.load_case(id)
        .await?
        .ok_or_else(|| RegistryError::not_found("case", id))
}

fn case_entity(case: &TransferCase) -> String {
    format!("case {}", case.id)
}

/// Closed cases and rejected cases without retries left accept no further edits.
fn ensure_editable(case: &TransferCase, max_reopens: u32, op: &'static str) -> Result<()> {
    let exhausted = case.status == CaseStatus::Rejected && case.reopen_count >= max_reopens;
    if case.status.is_terminal() || exhausted {
        return Err(RegistryError::invalid_state(
            case_entity(case),
            case.status,
            op,
        ));
    }
    Ok(())
}

/// Status `action` leads to from the case's current status
fn next_status(case: &TransferCase, action: CaseAction) -> Result<CaseStatus> {
    case.status.apply(action).ok_or_else(|| {
        RegistryError::invalid_state(case_entity(case), case.status, action.as_str())
    })
}

fn not_in_checklist(case: CaseId, kind: DocumentKind) -> RegistryError {
    RegistryError::validation(
        format!("document {}", kind),
        format!("not in the checklist of case {}", case),
    )
}

fn checklist_slot(case: &mut TransferCase, kind: DocumentKind) -> Result<&mut CaseDocument> {
    let case_id = case.id;
    case.document_mut(kind).ok_or_else(|| not_in_checklist(case_id, kind))
}

fn publications_refused(case: CaseId, transfer_type: TransferType) -> RegistryError {
    RegistryError::validation(
        format!("case {}", case),
        format!("{} cases carry no publications", transfer_type),
    )
}

/// Compare-and-swap the case against `expected`, then commit.
async fn save_and_commit(
    tx: &mut dyn CaseTx,
    case: &TransferCase,
    expected: CaseStatus,
    op: &'static str,
) -> Result<()> {
    if !tx.save_case(case, expected).await? {
        return Err(RegistryError::invalid_state(case_entity(case), expected, op));
    }
    tx.commit().await
}

fn validate_share(share: Option<Decimal>) -> Result<()> {
    if let Some(share) = share
        && (share <= Decimal::ZERO || share > Decimal::ONE_HUNDRED)
    {
        return Err(RegistryError::validation(
            "party share",
            format!("{} is outside (0, 100]", share),
        ));
    }
    Ok(())
}

/// Add a party; a single-occupancy role replaces its previous holder.
fn apply_party(case: &mut TransferCase, party: NewParty, now: DateTime<Utc>) -> Party {
    if party.role.is_single_occupancy() {
        case.parties.retain(|p| p.role != party.role);
    }
    let party = Party {
        id: PartyId::new(),
        person: party.person,
        role: party.role,
        share: party.share,
        added_at: now,
    };
    case.parties.push(party.clone());
    party
}

fn normalize_channel(channel: &str) -> Result<String> {
    let channel = channel.trim().to_uppercase();
    if channel.is_empty() {
        return Err(RegistryError::validation(
            "publication channel",
            "must not be blank",
        ));
    }
    Ok(channel)
}

fn person_label(person: Option<&Person>, id: PersonId) -> String {
    match person {
        Some(p) => format!("{} ({}, person {})", p.name, p.national_id, id),
        None => format!("person {}", id),
    }
}

/// Transfer case service
pub struct TransferCaseService {
    store: Arc<dyn CaseStore>,
    contracts: Arc<dyn ContractDirectory>,
    persons: Arc<dyn PersonDirectory>,
    documents: Arc<dyn DocumentStorage>,
    clock: Arc<dyn Clock>,
    settings: WorkflowSettings,
}

impl TransferCaseService {
    pub fn new(
        store: Arc<dyn CaseStore>,
        contracts: Arc<dyn ContractDirectory>,
        persons: Arc<dyn PersonDirectory>,
        documents: Arc<dyn DocumentStorage>,
        clock: Arc<dyn Clock>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            store,
            contracts,
            persons,
            documents,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> WorkflowSettings {
        self.settings
    }

    /// Business date used for closings and default effective dates
    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    // === Guards ===

    fn require_write(&self, actor: &Actor, operation: &'static str) -> Result<()> {
        if !actor.role.can_write() {
            return Err(RegistryError::Forbidden {
                user: actor.user,
                operation,
            });
        }
        Ok(())
    }

    /// Contract of the caller's organization. Writes additionally need it `ACTIVE`.
    async fn contract(
        &self,
        actor: &Actor,
        id: ContractId,
        require_active: bool,
    ) -> Result<ContractInfo> {
        let contract = self
            .contracts
            .get_contract(id)
            .await?
            .ok_or_else(|| RegistryError::not_found("contract", id))?;

        if contract.org != actor.org {
            warn!(contract = %id, org = %actor.org, "Cross-organization contract reference refused");
            return Err(RegistryError::InvalidContract {
                contract: id,
                reason: "contract belongs to another organization".to_string(),
            });
        }
        if require_active && contract.status != ContractStatus::Active {
            return Err(RegistryError::InvalidContract {
                contract: id,
                reason: format!("contract status is {:?}", contract.status),
            });
        }
        Ok(contract)
    }

    async fn person(&self, actor: &Actor, id: PersonId) -> Result<Person> {
        self.persons
            .get_person(actor.org, id)
            .await?
            .ok_or_else(|| RegistryError::not_found("person", id))
    }

    /// Load, mutate, compare-and-swap save, audit, commit.
    async fn update_case<T, F>(
        &self,
        actor: &Actor,
        id: CaseId,
        op: &'static str,
        apply: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut TransferCase) -> Result<Applied<T>> + Send,
        T: Send,
    {
        let result = self.update_case_tx(actor, id, op, apply).await;
        if let Err(e) = &result {
            log_rejection(op, &id.to_string(), e);
        }
        result
    }

    async fn update_case_tx<T, F>(
        &self,
        actor: &Actor,
        id: CaseId,
        op: &'static str,
        apply: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut TransferCase) -> Result<Applied<T>> + Send,
        T: Send,
    {
        self.require_write(actor, op)?;

        let mut tx = self.store.begin(actor.org).await?;
        let mut case = load_case(tx.as_mut(), id).await?;
        let expected = case.status;

        let applied = apply(&mut case)?;
        if case.status != expected && !expected.can_transition_to(case.status) {
            return Err(RegistryError::InvariantViolation {
                contract: case.contract,
                reason: format!("{} cannot move from {} to {}", op, expected, case.status),
            });
        }

        if !tx.save_case(&case, expected).await? {
            return Err(RegistryError::invalid_state(
                case_entity(&case),
                expected,
                op,
            ));
        }
        if let Some((kind, detail)) = applied.event {
            audit::record(
                tx.as_mut(),
                AuditEvent::new(kind, case.contract, actor.user, self.clock.now())
                    .case(case.id)
                    .detail(detail),
            )
            .await?;
        }
        tx.commit().await?;

        info!(
            case = %case.id,
            number = %case.number,
            status = %case.status,
            op,
            "Case updated"
        );
        Ok(applied.output)
    }

    // === Case lifecycle ===

    /// Open a case in `DOCS_PENDING` with one `MISSING` slot per checklist entry.
    ///
    /// Fails with `InvalidContract` if the contract already has an open case.
    pub async fn create_case(&self, actor: &Actor, request: CreateCase) -> Result<TransferCase> {
        let contract = request.contract;
        let result = self.create_case_tx(actor, request).await;
        if let Err(e) = &result {
            log_rejection("create_case", &format!("contract {}", contract), e);
        }
        result
    }

    async fn create_case_tx(&self, actor: &Actor, request: CreateCase) -> Result<TransferCase> {
        self.require_write(actor, "create_case")?;

        let mut seen = Vec::new();
        for party in &request.parties {
            validate_share(party.share)?;
            if party.role.is_single_occupancy() {
                if seen.contains(&party.role) {
                    return Err(RegistryError::validation(
                        "parties",
                        format!("role {} given more than once", party.role),
                    ));
                }
                seen.push(party.role);
            }
        }

        self.contract(actor, request.contract, true).await?;
        for party in &request.parties {
            self.person(actor, party.person).await?;
        }

        let now = self.clock.now();
        let mut tx = self.store.begin(actor.org).await?;

        if let Some(open) = tx.open_case_for_contract(request.contract).await? {
            return Err(RegistryError::InvalidContract {
                contract: request.contract,
                reason: format!("open transfer case {} already exists", open),
            });
        }

        let number = numbering::next_case_number(tx.as_mut(), now.year()).await?;
        let mut case = TransferCase::new(
            actor.org,
            number,
            request.contract,
            request.transfer_type,
            now,
            actor.user,
        );
        for party in request.parties {
            apply_party(&mut case, party, now);
        }

        // The holder of record cedes the right unless the caller named someone else.
        let holder = tx.active_holder(request.contract).await?;
        if let Some(holder) = &holder
            && case.parties_with_role(PartyRole::PreviousHolder).next().is_none()
        {
            apply_party(
                &mut case,
                NewParty::new(holder.holder, PartyRole::PreviousHolder),
                now,
            );
        }

        tx.insert_case(&case).await?;
        audit::record(
            tx.as_mut(),
            AuditEvent::new(EventKind::CaseOpened, case.contract, actor.user, now)
                .case(case.id)
                .detail(format!("{} {}", case.number, case.transfer_type())),
        )
        .await?;
        tx.commit().await?;

        info!(
            case = %case.id,
            number = %case.number,
            contract = %case.contract,
            transfer_type = %case.transfer_type(),
            "Transfer case created"
        );
        Ok(case)
    }

    /// `MISSING`/`REJECTED` → `UPLOADED`. The case status does not change.
    ///
    /// `file_ref` must name a file already stored for the caller's organization.
    pub async fn upload_document(
        &self,
        actor: &Actor,
        id: CaseId,
        kind: DocumentKind,
        file_ref: DocumentRef,
    ) -> Result<CaseDocument> {
        if file_ref.0.trim().is_empty() {
            return Err(RegistryError::validation("file reference", "must not be blank"));
        }
        if !self.documents.contains(actor.org, &file_ref).await? {
            let e = RegistryError::validation(
                "file reference",
                format!("{} is not stored for organization {}", file_ref, actor.org),
            );
            log_rejection("upload_document", &id.to_string(), &e);
            return Err(e);
        }
        self.attach_document(actor, id, kind, file_ref).await
    }

    /// Store `bytes` and attach them to the `kind` slot. The file is removed again when the
    /// attach is refused.
    pub async fn store_document(
        &self,
        actor: &Actor,
        id: CaseId,
        kind: DocumentKind,
        bytes: Vec<u8>,
    ) -> Result<CaseDocument> {
        self.require_write(actor, "upload_document")?;
        if bytes.is_empty() {
            return Err(RegistryError::validation("document content", "must not be empty"));
        }
        let file_ref = self.documents.store(actor.org, bytes).await?;
        let result = self.attach_document(actor, id, kind, file_ref.clone()).await;
        if result.is_err() {
            self.discard_document(actor.org, &file_ref).await;
        }
        result
    }

    async fn discard_document(&self, org: OrgId, reference: &DocumentRef) {
        if let Err(e) = self.documents.remove(org, reference).await {
            warn!(org = %org, document = %reference, error = %e, "Stored document left orphaned");
        }
    }

    async fn attach_document(
        &self,
        actor: &Actor,
        id: CaseId,
        kind: DocumentKind,
        file_ref: DocumentRef,
    ) -> Result<CaseDocument> {
        let now = self.clock.now();
        let max_reopens = self.settings.max_reopens;

        self.update_case(actor, id, "upload_document", move |case| {
            ensure_editable(case, max_reopens, "upload_document")?;
            let case_id = case.id;
            let doc = checklist_slot(case, kind)?;
            if !matches!(doc.status, DocumentStatus::Missing | DocumentStatus::Rejected) {
                return Err(RegistryError::invalid_state(
                    format!("document {} of case {}", kind, case_id),
                    doc.status,
                    "upload_document",
                ));
            }

            doc.file_ref = Some(file_ref);
            doc.status = DocumentStatus::Uploaded;
            doc.uploaded_at = Some(now);
            doc.verified_at = None;
            doc.note = None;

            Ok(Applied::new(doc.clone()).event(EventKind::DocumentUploaded, kind.as_str()))
        })
        .await
    }

    /// `UPLOADED` → `VERIFIED` or `REJECTED`
    pub async fn verify_document(
        &self,
        actor: &Actor,
        id: CaseId,
        kind: DocumentKind,
        outcome: VerificationOutcome,
        note: Option<String>,
    ) -> Result<CaseDocument> {
        let now = self.clock.now();
        let max_reopens = self.settings.max_reopens;

        self.update_case(actor, id, "verify_document", move |case| {
            ensure_editable(case, max_reopens, "verify_document")?;
            let case_id = case.id;
            let doc = checklist_slot(case, kind)?;
            if doc.status != DocumentStatus::Uploaded {
                return Err(RegistryError::invalid_state(
                    format!("document {} of case {}", kind, case_id),
                    doc.status,
                    "verify_document",
                ));
            }

            doc.status = outcome.status();
            doc.verified_at = Some(now);
            doc.note = note.filter(|n| !n.trim().is_empty());

            let event = match outcome {
                VerificationOutcome::Verified => EventKind::DocumentVerified,
                VerificationOutcome::Rejected => EventKind::DocumentRejected,
            };
            let detail = match &doc.note {
                Some(note) => format!("{}: {}", kind, note),
                None => kind.to_string(),
            };
            Ok(Applied::new(doc.clone()).event(event, detail))
        })
        .await
    }

    /// Attach a party. A single-occupancy role replaces the previous party with that role.
    pub async fn add_party(&self, actor: &Actor, id: CaseId, party: NewParty) -> Result<Party> {
        validate_share(party.share)?;
        self.person(actor, party.person).await?;
        let now = self.clock.now();
        let max_reopens = self.settings.max_reopens;

        self.update_case(actor, id, "add_party", move |case| {
            ensure_editable(case, max_reopens, "add_party")?;
            Ok(Applied::new(apply_party(case, party, now)))
        })
        .await
    }

    pub async fn remove_party(&self, actor: &Actor, id: CaseId, party: PartyId) -> Result<()> {
        let max_reopens = self.settings.max_reopens;

        self.update_case(actor, id, "remove_party", move |case| {
            ensure_editable(case, max_reopens, "remove_party")?;
            let before = case.parties.len();
            case.parties.retain(|p| p.id != party);
            if case.parties.len() == before {
                return Err(RegistryError::not_found("party", party));
            }
            Ok(Applied::new(()))
        })
        .await
    }

    /// Record a public notice. Only `PROVISIONAL` cases carry publications.
    pub async fn add_publication(
        &self,
        actor: &Actor,
        id: CaseId,
        publication: NewPublication,
    ) -> Result<Publication> {
        self.require_write(actor, "add_publication")?;
        let channel = normalize_channel(&publication.channel)?;
        if publication.published_on > self.clock.today() {
            return Err(RegistryError::validation(
                "publication date",
                format!("{} is in the future", publication.published_on),
            ));
        }
        // The transfer type is fixed at creation
        let current = self.get_case(actor, id).await?;
        if current.transfer_type() != TransferType::Provisional {
            let e = publications_refused(current.id, current.transfer_type());
            log_rejection("add_publication", &id.to_string(), &e);
            return Err(e);
        }
        let max_reopens = self.settings.max_reopens;

        self.update_case(actor, id, "add_publication", move |case| {
            ensure_editable(case, max_reopens, "add_publication")?;
            let (case_id, transfer_type) = (case.id, case.transfer_type());
            let TransferTerms::Provisional { publications, .. } = &mut case.terms else {
                return Err(publications_refused(case_id, transfer_type));
            };

            let publication = Publication {
                id: PublicationId::new(),
                channel,
                published_on: publication.published_on,
                reference: publication.reference.filter(|r| !r.trim().is_empty()),
            };
            publications.push(publication.clone());
            Ok(Applied::new(publication))
        })
        .await
    }

    /// `DOCS_PENDING` → `UNDER_REVIEW`, once every required document is verified.
    pub async fn submit_for_review(&self, actor: &Actor, id: CaseId) -> Result<TransferCase> {
        self.update_case(actor, id, "submit_for_review", |case| {
            let next = next_status(case, CaseAction::Submit)?;

            let mut missing: Vec<String> = case
                .unverified_required()
                .iter()
                .map(|k| k.to_string())
                .collect();
            if case.transfer_type() == TransferType::Provisional
                && !case.terms.has_required_publications()
            {
                let pubs = case.terms.publications();
                if !pubs.iter().any(|p| p.channel == BULLETIN_CHANNEL) {
                    missing.push(format!("PUBLICATION:{}", BULLETIN_CHANNEL));
                }
                if !pubs.iter().any(|p| p.channel != BULLETIN_CHANNEL) {
                    missing.push("PUBLICATION:SECOND_CHANNEL".to_string());
                }
            }
            if !missing.is_empty() {
                return Err(RegistryError::DocumentsIncomplete {
                    case: case.id,
                    missing,
                });
            }
            if case.new_holder().is_none() {
                return Err(RegistryError::MissingParty {
                    case: case.id,
                    role: PartyRole::NewHolder.as_str(),
                });
            }

            case.status = next;
            Ok(Applied::new(case.clone()).event(EventKind::SubmittedForReview, case.number.clone()))
        })
        .await
    }

    /// `UNDER_REVIEW` → `DOCS_PENDING`: the reviewer asks for more documentation.
    pub async fn request_more_documents(
        &self,
        actor: &Actor,
        id: CaseId,
        reason: Option<String>,
    ) -> Result<TransferCase> {
        self.update_case(actor, id, "request_more_documents", move |case| {
            case.status = next_status(case, CaseAction::ReturnForDocuments)?;
            let detail = reason.unwrap_or_default();
            Ok(Applied::new(case.clone()).event(EventKind::ReturnedForDocuments, detail))
        })
        .await
    }

    /// `UNDER_REVIEW` → `APPROVED`
    pub async fn approve(&self, actor: &Actor, id: CaseId) -> Result<TransferCase> {
        self.update_case(actor, id, "approve", |case| {
            case.status = next_status(case, CaseAction::Approve)?;
            Ok(Applied::new(case.clone()).event(EventKind::Approved, case.number.clone()))
        })
        .await
    }

    /// `DOCS_PENDING | UNDER_REVIEW` → `REJECTED`. The ledger is untouched.
    pub async fn reject(&self, actor: &Actor, id: CaseId, reason: &str) -> Result<TransferCase> {
        let reason = reason.trim().to_string();
        if reason.is_empty() {
            return Err(RegistryError::validation("rejection reason", "must not be blank"));
        }

        self.update_case(actor, id, "reject", move |case| {
            case.status = next_status(case, CaseAction::Reject)?;
            case.rejection_reason = Some(reason.clone());
            Ok(Applied::new(case.clone()).event(EventKind::Rejected, reason))
        })
        .await
    }

    /// `REJECTED` → `DOCS_PENDING`. Document verification states are preserved.
    pub async fn reopen(&self, actor: &Actor, id: CaseId) -> Result<TransferCase> {
        let result = self.reopen_tx(actor, id).await;
        if let Err(e) = &result {
            log_rejection("reopen", &id.to_string(), e);
        }
        result
    }

    async fn reopen_tx(&self, actor: &Actor, id: CaseId) -> Result<TransferCase> {
        self.require_write(actor, "reopen")?;

        let mut tx = self.store.begin(actor.org).await?;
        let mut case = load_case(tx.as_mut(), id).await?;
        let next = next_status(&case, CaseAction::Reopen)?;
        if case.reopen_count >= self.settings.max_reopens {
            return Err(RegistryError::invalid_state(
                case_entity(&case),
                format!("{} (retries exhausted)", case.status),
                "reopen",
            ));
        }
        if let Some(open) = tx.open_case_for_contract(case.contract).await? {
            return Err(RegistryError::InvalidContract {
                contract: case.contract,
                reason: format!("open transfer case {} already exists", open),
            });
        }

        let expected = case.status;
        case.status = next;
        case.reopen_count += 1;
        if !tx.save_case(&case, expected).await? {
            return Err(RegistryError::invalid_state(
                case_entity(&case),
                expected,
                "reopen",
            ));
        }
        audit::record(
            tx.as_mut(),
            AuditEvent::new(EventKind::Reopened, case.contract, actor.user, self.clock.now())
                .case(case.id)
                .detail(format!("retry {}/{}", case.reopen_count, self.settings.max_reopens)),
        )
        .await?;
        tx.commit().await?;

        info!(case = %case.id, number = %case.number, retry = case.reopen_count, "Case reopened");
        Ok(case)
    }

    /// `APPROVED` → `CLOSED`: the atomic ownership transition.
    ///
    /// In one transaction: re-check the documents, close the active holder record and open the
    /// new holder's, apply the beneficiary decision, write the audit entries, issue the
    /// resolution. Any failure leaves case and ledger exactly as they were.
    ///
    /// Holder names for the resolution are looked up before the transaction starts. The
    /// resolution file is written inside it and removed again if the commit fails.
    pub async fn close(
        &self,
        actor: &Actor,
        id: CaseId,
        request: CloseRequest,
    ) -> Result<TransferCase> {
        let result = self.close_tx(actor, id, request).await;
        if let Err(e) = &result {
            log_rejection("close", &id.to_string(), e);
        }
        result
    }

    async fn close_tx(
        &self,
        actor: &Actor,
        id: CaseId,
        request: CloseRequest,
    ) -> Result<TransferCase> {
        self.require_write(actor, "close")?;
        if let Some(BeneficiaryDecision::Replace { person }) = request.beneficiary_decision {
            self.person(actor, person).await?;
        }

        let known = self.resolution_parties(actor, id).await?;

        let now = self.clock.now();
        let today = now.date_naive();
        let mut tx = self.store.begin(actor.org).await?;
        let mut case = load_case(tx.as_mut(), id).await?;
        let expected = case.status;
        let target = next_status(&case, CaseAction::Close)?;

        // A document may have been rejected after approval
        let missing = case.unverified_required();
        if !missing.is_empty() {
            return Err(RegistryError::DocumentsIncomplete {
                case: case.id,
                missing: missing.iter().map(|k| k.to_string()).collect(),
            });
        }
        let new_holder = case
            .new_holder()
            .map(|p| p.person)
            .ok_or(RegistryError::MissingParty {
                case: case.id,
                role: PartyRole::NewHolder.as_str(),
            })?;

        let contract = case.contract;
        let active_beneficiary = tx.active_beneficiary(contract).await?;
        match (request.beneficiary_decision, &active_beneficiary) {
            (None, Some(_)) => {
                return Err(RegistryError::BeneficiaryDecisionRequired {
                    case: case.id,
                    contract,
                });
            }
            (Some(BeneficiaryDecision::Replace { .. }), _) => {
                let missing = case.unverified(&BENEFICIARY_REPLACEMENT_DOCUMENTS);
                if !missing.is_empty() {
                    return Err(RegistryError::DocumentsIncomplete {
                        case: case.id,
                        missing: missing.iter().map(|k| k.to_string()).collect(),
                    });
                }
            }
            _ => {}
        }

        // Holder transition
        let provisional_until = (case.transfer_type() == TransferType::Provisional)
            .then(|| add_years(today, PROVISIONAL_YEARS));
        let previous = ledger::close_active_holder(tx.as_mut(), contract, today).await?;
        let mut record = ledger::open_holder(
            tx.as_mut(),
            contract,
            new_holder,
            today,
            provisional_until,
            Some(case.id),
        )
        .await?;
        if let Some(since) = request.pensioner_since {
            record = ledger::set_holder_pensioner(tx.as_mut(), contract, since).await?;
        }

        audit::record(
            tx.as_mut(),
            AuditEvent::new(EventKind::HolderChanged, contract, actor.user, now)
                .case(case.id)
                .record(record.id)
                .detail(format!(
                    "{} -> {}",
                    previous
                        .as_ref()
                        .map_or_else(|| "-".to_string(), |r| r.holder.to_string()),
                    new_holder
                )),
        )
        .await?;
        if let Some(since) = request.pensioner_since {
            audit::record(
                tx.as_mut(),
                AuditEvent::new(EventKind::PensionerSet, contract, actor.user, now)
                    .case(case.id)
                    .record(record.id)
                    .detail(format!("since {}", since)),
            )
            .await?;
        }

        // Beneficiary decision
        if let Some(BeneficiaryDecision::Replace { person }) = request.beneficiary_decision {
            if let Some(closed) = ledger::close_active_beneficiary(tx.as_mut(), contract, today).await? {
                audit::record(
                    tx.as_mut(),
                    AuditEvent::new(EventKind::BeneficiaryRemoved, contract, actor.user, now)
                        .case(case.id)
                        .detail(format!("person {}", closed.person)),
                )
                .await?;
            }
            ledger::open_beneficiary(tx.as_mut(), contract, person, today, Some(case.id)).await?;
            audit::record(
                tx.as_mut(),
                AuditEvent::new(EventKind::BeneficiaryNominated, contract, actor.user, now)
                    .case(case.id)
                    .detail(format!("person {}", person)),
            )
            .await?;
        }

        // Resolution
        let resolution_number = numbering::next_resolution_number(tx.as_mut(), today.year()).await?;
        if let TransferTerms::Provisional {
            provisional_until: until,
            ..
        } = &mut case.terms
        {
            *until = provisional_until;
        }
        case.status = target;
        case.resolved_at = Some(now);
        case.resolution_number = Some(resolution_number.clone());
        case.new_record = Some(record.id);

        let text = self
            .render_resolution(actor.org, &case, previous.as_ref(), &record, &known)
            .await?;
        let resolution_ref = self.documents.store(actor.org, text.into_bytes()).await?;
        case.resolution_ref = Some(resolution_ref.clone());

        if let Err(e) = save_and_commit(tx.as_mut(), &case, expected, "close").await {
            self.discard_document(actor.org, &resolution_ref).await;
            return Err(e);
        }

        info!(
            case = %case.id,
            number = %case.number,
            resolution = %resolution_number,
            contract = %contract,
            record = %record.id,
            provisional = record.provisional,
            "Case closed; holder changed"
        );
        Ok(case)
    }

    /// Directory entries of the holders a close will name, read before the store lock is taken.
    async fn resolution_parties(
        &self,
        actor: &Actor,
        id: CaseId,
    ) -> Result<HashMap<PersonId, Person>> {
        let (case, previous) = {
            let mut tx = self.store.begin(actor.org).await?;
            let case = load_case(tx.as_mut(), id).await?;
            let previous = tx.active_holder(case.contract).await?;
            (case, previous)
        };
        let ids: Vec<PersonId> = case
            .new_holder()
            .map(|p| p.person)
            .into_iter()
            .chain(previous.map(|r| r.holder))
            .collect();
        let found = futures::future::try_join_all(
            ids.iter().map(|person| self.persons.get_person(actor.org, *person)),
        )
        .await?;
        Ok(ids
            .into_iter()
            .zip(found)
            .filter_map(|(id, person)| person.map(|p| (id, p)))
            .collect())
    }

    async fn resolution_person(
        &self,
        org: OrgId,
        id: PersonId,
        known: &HashMap<PersonId, Person>,
    ) -> Result<Option<Person>> {
        match known.get(&id) {
            Some(person) => Ok(Some(person.clone())),
            None => self.persons.get_person(org, id).await,
        }
    }

    async fn render_resolution(
        &self,
        org: OrgId,
        case: &TransferCase,
        previous: Option<&OwnershipRecord>,
        record: &OwnershipRecord,
        known: &HashMap<PersonId, Person>,
    ) -> Result<String> {
        let previous_lookup = async {
            match previous {
                Some(prev) => self.resolution_person(org, prev.holder, known).await,
                None => Ok(None),
            }
        };
        let (new_holder, previous_person) = futures::try_join!(
            self.resolution_person(org, record.holder, known),
            previous_lookup
        )?;
        let previous_line = match previous {
            Some(prev) => person_label(previous_person.as_ref(), prev.holder),
            None => "-".to_string(),
        };

        let mut text = format!(
            "RESOLUTION {}\nCase: {}\nTransfer type: {}\nDate: {}\nContract: {}\nPrevious holder: {}\nNew holder: {}\n",
            case.resolution_number.as_deref().unwrap_or_default(),
            case.number,
            case.transfer_type(),
            record.start_date,
            case.contract,
            previous_line,
            person_label(new_holder.as_ref(), record.holder),
        );
        if let Some(until) = record.provisional_until {
            text.push_str(&format!("Provisional until: {}\n", until));
        }
        Ok(text)
    }

    // === Queries ===

    pub async fn get_case(&self, actor: &Actor, id: CaseId) -> Result<TransferCase> {
        let mut tx = self.store.begin(actor.org).await?;
        load_case(tx.as_mut(), id).await
    }

    /// Case plus the contract's current holder and beneficiary, the required documents still
    /// unverified, and the case's administrative log.
    pub async fn case_detail(&self, actor: &Actor, id: CaseId) -> Result<CaseDetail> {
        let mut tx = self.store.begin(actor.org).await?;
        let case = load_case(tx.as_mut(), id).await?;
        let active_holder = tx.active_holder(case.contract).await?;
        let active_beneficiary = tx.active_beneficiary(case.contract).await?;
        let events = tx.case_events(case.id).await?;
        let pending_documents = case.unverified_required();

        Ok(CaseDetail {
            case,
            active_holder,
            active_beneficiary,
            pending_documents,
            events,
        })
    }

    pub async fn list_cases(&self, actor: &Actor, filter: &CaseFilter) -> Result<Vec<TransferCase>> {
        let mut tx = self.store.begin(actor.org).await?;
        tx.list_cases(filter).await
    }

    pub async fn get_active_holder(
        &self,
        actor: &Actor,
        contract: ContractId,
    ) -> Result<Option<OwnershipRecord>> {
        self.contract(actor, contract, false).await?;
        let mut tx = self.store.begin(actor.org).await?;
        tx.active_holder(contract).await
    }

    pub async fn get_active_beneficiary(
        &self,
        actor: &Actor,
        contract: ContractId,
    ) -> Result<Option<Beneficiary>> {
        self.contract(actor, contract, false).await?;
        let mut tx = self.store.begin(actor.org).await?;
        tx.active_beneficiary(contract).await
    }

    pub async fn holder_history(
        &self,
        actor: &Actor,
        contract: ContractId,
    ) -> Result<Vec<OwnershipRecord>> {
        self.contract(actor, contract, false).await?;
        let mut tx = self.store.begin(actor.org).await?;
        tx.holder_history(contract).await
    }

    pub async fn beneficiary_history(
        &self,
        actor: &Actor,
        contract: ContractId,
    ) -> Result<Vec<Beneficiary>> {
        self.contract(actor, contract, false).await?;
        let mut tx = self.store.begin(actor.org).await?;
        tx.beneficiary_history(contract).await
    }

    pub async fn list_movements(
        &self,
        actor: &Actor,
        contract: ContractId,
        filter: &MovementFilter,
    ) -> Result<Vec<Movement>> {
        self.contract(actor, contract, false).await?;
        let mut tx = self.store.begin(actor.org).await?;
        tx.movements(contract, filter).await
    }

    /// Fetch a stored resolution document
    pub async fn resolution_document(&self, actor: &Actor, id: CaseId) -> Result<Vec<u8>> {
        let case = self.get_case(actor, id).await?;
        let reference = case
            .resolution_ref
            .ok_or_else(|| RegistryError::not_found("resolution of case", id))?;
        self.documents.fetch(actor.org, &reference).await
    }

    /// Content of the file attached to the `kind` slot of a case
    pub async fn document_content(
        &self,
        actor: &Actor,
        id: CaseId,
        kind: DocumentKind,
    ) -> Result<Vec<u8>> {
        let case = self.get_case(actor, id).await?;
        let doc = case
            .document(kind)
            .ok_or_else(|| not_in_checklist(case.id, kind))?;
        let reference = doc
            .file_ref
            .as_ref()
            .ok_or_else(|| RegistryError::not_found("file of document", kind))?;
        self.documents.fetch(actor.org, reference).await
    }

    // === Ledger maintenance outside a case ===

    /// First holder of a contract that has none
    pub async fn register_holder(
        &self,
        actor: &Actor,
        contract: ContractId,
        person: PersonId,
        start_date: NaiveDate,
    ) -> Result<OwnershipRecord> {
        let result = self
            .register_holder_tx(actor, contract, person, start_date)
            .await;
        if let Err(e) = &result {
            log_rejection("register_holder", &format!("contract {}", contract), e);
        }
        result
    }

    async fn register_holder_tx(
        &self,
        actor: &Actor,
        contract: ContractId,
        person: PersonId,
        start_date: NaiveDate,
    ) -> Result<OwnershipRecord> {
        self.require_write(actor, "register_holder")?;
        if start_date > self.clock.today() {
            return Err(RegistryError::validation(
                "holder start date",
                format!("{} is in the future", start_date),
            ));
        }
        self.contract(actor, contract, true).await?;
        self.person(actor, person).await?;

        let mut tx = self.store.begin(actor.org).await?;
        if let Some(active) = tx.active_holder(contract).await? {
            return Err(RegistryError::InvalidContract {
                contract,
                reason: format!(
                    "holder record {} is active; ownership changes need a transfer case",
                    active.id
                ),
            });
        }
        let record = ledger::open_holder(tx.as_mut(), contract, person, start_date, None, None).await?;
        audit::record(
            tx.as_mut(),
            AuditEvent::new(EventKind::HolderRegistered, contract, actor.user, self.clock.now())
                .record(record.id)
                .detail(format!("person {} from {}", person, start_date)),
        )
        .await?;
        tx.commit().await?;
        Ok(record)
    }

    /// Designate `person` as the contract's beneficiary from `active_from`.
    ///
    /// Nominating the current beneficiary again changes nothing but is still audited.
    pub async fn nominate_beneficiary(
        &self,
        actor: &Actor,
        contract: ContractId,
        person: PersonId,
        active_from: NaiveDate,
    ) -> Result<Beneficiary> {
        let result = self
            .nominate_beneficiary_tx(actor, contract, person, active_from)
            .await;
        if let Err(e) = &result {
            log_rejection("nominate_beneficiary", &format!("contract {}", contract), e);
        }
        result
    }

    async fn nominate_beneficiary_tx(
        &self,
        actor: &Actor,
        contract: ContractId,
        person: PersonId,
        active_from: NaiveDate,
    ) -> Result<Beneficiary> {
        self.require_write(actor, "nominate_beneficiary")?;
        self.contract(actor, contract, true).await?;
        self.person(actor, person).await?;

        let now = self.clock.now();
        let mut tx = self.store.begin(actor.org).await?;

        if let Some(active) = tx.active_beneficiary(contract).await?
            && active.person == person
        {
            audit::record(
                tx.as_mut(),
                AuditEvent::new(EventKind::BeneficiaryNominated, contract, actor.user, now)
                    .detail(format!("person {} already designated", person)),
            )
            .await?;
            tx.commit().await?;
            return Ok(active);
        }

        if let Some(closed) = ledger::close_active_beneficiary(tx.as_mut(), contract, active_from).await? {
            audit::record(
                tx.as_mut(),
                AuditEvent::new(EventKind::BeneficiaryRemoved, contract, actor.user, now)
                    .detail(format!("person {} replaced", closed.person)),
            )
            .await?;
        }
        let beneficiary =
            ledger::open_beneficiary(tx.as_mut(), contract, person, active_from, None).await?;
        audit::record(
            tx.as_mut(),
            AuditEvent::new(EventKind::BeneficiaryNominated, contract, actor.user, now)
                .detail(format!("person {} from {}", person, active_from)),
        )
        .await?;
        tx.commit().await?;
        Ok(beneficiary)
    }

    /// End the active beneficiary designation on `end_date`
    pub async fn remove_beneficiary(
        &self,
        actor: &Actor,
        contract: ContractId,
        end_date: NaiveDate,
    ) -> Result<Beneficiary> {
        let result = self.remove_beneficiary_tx(actor, contract, end_date).await;
        if let Err(e) = &result {
            log_rejection("remove_beneficiary", &format!("contract {}", contract), e);
        }
        result
    }

    async fn remove_beneficiary_tx(
        &self,
        actor: &Actor,
        contract: ContractId,
        end_date: NaiveDate,
    ) -> Result<Beneficiary> {
        self.require_write(actor, "remove_beneficiary")?;
        self.contract(actor, contract, false).await?;

        let mut tx = self.store.begin(actor.org).await?;
        let closed = ledger::close_active_beneficiary(tx.as_mut(), contract, end_date)
            .await?
            .ok_or_else(|| RegistryError::not_found("active beneficiary of contract", contract))?;
        audit::record(
            tx.as_mut(),
            AuditEvent::new(EventKind::BeneficiaryRemoved, contract, actor.user, self.clock.now())
                .detail(format!("person {} until {}", closed.person, end_date)),
        )
        .await?;
        tx.commit().await?;
        Ok(closed)
    }

    /// Mark the active holder as pensioner. Past dates need `allow_retroactive`.
    pub async fn set_holder_pensioner(
        &self,
        actor: &Actor,
        contract: ContractId,
        since: NaiveDate,
        allow_retroactive: bool,
    ) -> Result<OwnershipRecord> {
        let result = self
            .set_holder_pensioner_tx(actor, contract, since, allow_retroactive)
            .await;
        if let Err(e) = &result {
            log_rejection("set_holder_pensioner", &format!("contract {}", contract), e);
        }
        result
    }

    async fn set_holder_pensioner_tx(
        &self,
        actor: &Actor,
        contract: ContractId,
        since: NaiveDate,
        allow_retroactive: bool,
    ) -> Result<OwnershipRecord> {
        self.require_write(actor, "set_holder_pensioner")?;
        let now = self.clock.now();
        if since < now.date_naive() && !allow_retroactive {
            return Err(RegistryError::validation(
                "pensioner_since",
                format!("{} is in the past and retroactive dates are not allowed", since),
            ));
        }
        self.contract(actor, contract, true).await?;

        let mut tx = self.store.begin(actor.org).await?;
        let record = ledger::set_holder_pensioner(tx.as_mut(), contract, since).await?;
        audit::record(
            tx.as_mut(),
            AuditEvent::new(EventKind::PensionerSet, contract, actor.user, now)
                .record(record.id)
                .detail(format!("since {}", since)),
        )
        .await?;
        tx.commit().await?;
        Ok(record)
    }
}
