//! End-to-end case lifecycle through the public service API
//!
//! In-memory store and collaborators, clock pinned to 2026-03-10.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};

use plot_title::adapters::{InMemoryContracts, InMemoryDocuments, InMemoryPersons};
use plot_title::audit::{EventKind, MovementFilter};
use plot_title::checklist::{DocumentKind, required_documents};
use plot_title::transfer_case::{
    BeneficiaryDecision, CloseRequest, DocumentStatus, NewParty, NewPublication, PartyRole,
    VerificationOutcome,
};
use plot_title::{
    Actor, CaseStatus, ContractId, CreateCase, FixedClock, MemoryStore, OrgId, PersonId,
    RegistryError, TransferCase, TransferCaseService, TransferType, UserId, WorkflowSettings,
};

const ORG: OrgId = OrgId(7);
const CONTRACT: ContractId = ContractId(500);
const PREVIOUS_HOLDER: PersonId = PersonId(1);
const NEW_HOLDER: PersonId = PersonId(2);
const BENEFICIARY: PersonId = PersonId(3);

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn closing_day() -> NaiveDate {
    date(2026, 3, 10)
}

fn admin() -> Actor {
    Actor::admin(ORG, UserId(1))
}

fn service() -> TransferCaseService {
    let contracts = InMemoryContracts::new().with_active(ORG, 500..510);
    let persons = InMemoryPersons::new().with_generated(ORG, 1..20);
    let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0).unwrap());
    TransferCaseService::new(
        Arc::new(MemoryStore::new()),
        Arc::new(contracts),
        Arc::new(persons),
        Arc::new(InMemoryDocuments::new()),
        Arc::new(clock),
        WorkflowSettings::default(),
    )
}

async fn open_case(svc: &TransferCaseService, transfer_type: TransferType) -> TransferCase {
    svc.register_holder(&admin(), CONTRACT, PREVIOUS_HOLDER, date(1998, 6, 1))
        .await
        .unwrap();
    svc.create_case(
        &admin(),
        CreateCase {
            contract: CONTRACT,
            transfer_type,
            parties: vec![NewParty::new(NEW_HOLDER, PartyRole::NewHolder)],
        },
    )
    .await
    .unwrap()
}

async fn verify(svc: &TransferCaseService, case: &TransferCase, kind: DocumentKind) {
    svc.store_document(&admin(), case.id, kind, format!("scan/{}", kind).into_bytes())
        .await
        .unwrap();
    svc.verify_document(&admin(), case.id, kind, VerificationOutcome::Verified, None)
        .await
        .unwrap();
}

async fn verify_all_required(svc: &TransferCaseService, case: &TransferCase) {
    for kind in required_documents(case.transfer_type()) {
        verify(svc, case, *kind).await;
    }
}

async fn publish(svc: &TransferCaseService, case: &TransferCase, channel: &str) {
    svc.add_publication(
        &admin(),
        case.id,
        NewPublication {
            channel: channel.to_string(),
            published_on: date(2026, 2, 20),
            reference: Some(format!("{}-2026/114", channel)),
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn testate_transfer_moves_holder_on_close() {
    let svc = service();
    let case = open_case(&svc, TransferType::MortisCausaTestamento).await;
    assert_eq!(required_documents(case.transfer_type()).len(), 5);

    verify_all_required(&svc, &case).await;
    let case = svc.submit_for_review(&admin(), case.id).await.unwrap();
    assert_eq!(case.status, CaseStatus::UnderReview);
    svc.approve(&admin(), case.id).await.unwrap();

    let closed = svc
        .close(&admin(), case.id, CloseRequest::default())
        .await
        .unwrap();
    assert_eq!(closed.status, CaseStatus::Closed);
    assert_eq!(closed.resolution_number.as_deref(), Some("RES-2026-0001"));

    let active = svc
        .get_active_holder(&admin(), CONTRACT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.holder, NEW_HOLDER);
    assert_eq!(active.start_date, closing_day());
    assert_eq!(active.case, Some(case.id));

    let history = svc.holder_history(&admin(), CONTRACT).await.unwrap();
    let previous = history
        .iter()
        .find(|r| r.holder == PREVIOUS_HOLDER)
        .unwrap();
    assert_eq!(previous.end_date, Some(closing_day()));
    assert_eq!(history.iter().filter(|r| r.is_active()).count(), 1);

    let changes = svc
        .list_movements(
            &admin(),
            CONTRACT,
            &MovementFilter {
                kind: Some(EventKind::HolderChanged),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].holder, Some(NEW_HOLDER));
}

#[tokio::test]
async fn submit_with_one_unverified_document_is_refused() {
    let svc = service();
    let case = open_case(&svc, TransferType::MortisCausaTestamento).await;

    let required = required_documents(case.transfer_type());
    for kind in &required[..4] {
        verify(&svc, &case, *kind).await;
    }

    let err = svc.submit_for_review(&admin(), case.id).await.unwrap_err();
    match err {
        RegistryError::DocumentsIncomplete { missing, .. } => {
            assert_eq!(missing, vec![required[4].to_string()]);
        }
        other => panic!("expected DocumentsIncomplete, got {:?}", other),
    }
    let case = svc.get_case(&admin(), case.id).await.unwrap();
    assert_eq!(case.status, CaseStatus::DocsPending);
}

#[tokio::test]
async fn provisional_case_needs_two_publication_channels() {
    let svc = service();
    let case = open_case(&svc, TransferType::Provisional).await;
    verify_all_required(&svc, &case).await;

    // No publications at all
    let err = svc.submit_for_review(&admin(), case.id).await.unwrap_err();
    assert!(matches!(err, RegistryError::DocumentsIncomplete { .. }));

    // Bulletin only
    publish(&svc, &case, "BOP").await;
    let err = svc.submit_for_review(&admin(), case.id).await.unwrap_err();
    match err {
        RegistryError::DocumentsIncomplete { missing, .. } => {
            assert!(missing.iter().any(|m| m.contains("SECOND_CHANNEL")));
        }
        other => panic!("expected DocumentsIncomplete, got {:?}", other),
    }
    let err = svc
        .close(&admin(), case.id, CloseRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidState { .. }));

    publish(&svc, &case, "LA VANGUARDIA").await;
    svc.submit_for_review(&admin(), case.id).await.unwrap();
    svc.approve(&admin(), case.id).await.unwrap();
    svc.close(&admin(), case.id, CloseRequest::default())
        .await
        .unwrap();

    let active = svc
        .get_active_holder(&admin(), CONTRACT)
        .await
        .unwrap()
        .unwrap();
    assert!(active.provisional);
    assert_eq!(active.provisional_until, Some(date(2036, 3, 10)));
}

#[tokio::test]
async fn close_with_active_beneficiary_requires_decision() {
    let svc = service();
    let case = open_case(&svc, TransferType::InterVivos).await;
    svc.nominate_beneficiary(&admin(), CONTRACT, BENEFICIARY, date(2015, 1, 1))
        .await
        .unwrap();
    verify_all_required(&svc, &case).await;
    svc.submit_for_review(&admin(), case.id).await.unwrap();
    svc.approve(&admin(), case.id).await.unwrap();

    let err = svc
        .close(&admin(), case.id, CloseRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::BeneficiaryDecisionRequired { .. }
    ));

    // Ledger untouched
    let holder = svc
        .get_active_holder(&admin(), CONTRACT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(holder.holder, PREVIOUS_HOLDER);
    let case = svc.get_case(&admin(), case.id).await.unwrap();
    assert_eq!(case.status, CaseStatus::Approved);

    // KEEP leaves the beneficiary in place
    svc.close(&admin(), case.id, CloseRequest::keep())
        .await
        .unwrap();
    let beneficiary = svc
        .get_active_beneficiary(&admin(), CONTRACT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(beneficiary.person, BENEFICIARY);
}

#[tokio::test]
async fn replace_decision_swaps_beneficiary() {
    let svc = service();
    let case = open_case(&svc, TransferType::InterVivos).await;
    svc.nominate_beneficiary(&admin(), CONTRACT, BENEFICIARY, date(2015, 1, 1))
        .await
        .unwrap();
    verify_all_required(&svc, &case).await;
    verify(&svc, &case, DocumentKind::BeneficiaryRequest).await;
    verify(&svc, &case, DocumentKind::NewBeneficiaryId).await;
    svc.submit_for_review(&admin(), case.id).await.unwrap();
    svc.approve(&admin(), case.id).await.unwrap();

    let request = CloseRequest {
        beneficiary_decision: Some(BeneficiaryDecision::Replace { person: PersonId(9) }),
        pensioner_since: None,
    };
    svc.close(&admin(), case.id, request).await.unwrap();

    let history = svc.beneficiary_history(&admin(), CONTRACT).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|b| b.is_active()).count(), 1);
    let old = history.iter().find(|b| b.person == BENEFICIARY).unwrap();
    assert_eq!(old.active_until, Some(closing_day()));
    let active = svc
        .get_active_beneficiary(&admin(), CONTRACT)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.person, PersonId(9));
    assert_eq!(active.case, Some(case.id));
}

#[tokio::test]
async fn reopened_case_keeps_verified_documents() {
    let svc = service();
    let case = open_case(&svc, TransferType::MortisCausaSinTestamento).await;
    verify_all_required(&svc, &case).await;
    svc.submit_for_review(&admin(), case.id).await.unwrap();
    let rejected = svc
        .reject(&admin(), case.id, "heirs declaration missing notary seal")
        .await
        .unwrap();
    assert_eq!(rejected.status, CaseStatus::Rejected);

    let reopened = svc.reopen(&admin(), case.id).await.unwrap();
    assert_eq!(reopened.status, CaseStatus::DocsPending);
    assert_eq!(reopened.reopen_count, 1);
    for kind in required_documents(reopened.transfer_type()) {
        let doc = reopened.documents.iter().find(|d| d.kind == *kind).unwrap();
        assert_eq!(doc.status, DocumentStatus::Verified, "{} was reset", kind);
    }
}

#[tokio::test]
async fn closed_case_cannot_close_twice() {
    let svc = service();
    let case = open_case(&svc, TransferType::InterVivos).await;
    verify_all_required(&svc, &case).await;
    svc.submit_for_review(&admin(), case.id).await.unwrap();
    svc.approve(&admin(), case.id).await.unwrap();
    svc.close(&admin(), case.id, CloseRequest::default())
        .await
        .unwrap();

    let err = svc
        .close(&admin(), case.id, CloseRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::InvalidState { .. }));

    let history = svc.holder_history(&admin(), CONTRACT).await.unwrap();
    assert_eq!(history.len(), 2);

    // Contract is free for a new case once the previous one is closed
    svc.create_case(
        &admin(),
        CreateCase {
            contract: CONTRACT,
            transfer_type: TransferType::InterVivos,
            parties: vec![],
        },
    )
    .await
    .unwrap();
}
