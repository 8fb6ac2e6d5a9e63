//! Integration Tests for Transfer Cases
//!
//! Full case flows against the in-memory store and in-memory collaborators, with a pinned clock.

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::adapters::{
        ContractStatus, DocumentStorage, InMemoryContracts, InMemoryDocuments, InMemoryPersons,
        Person, PersonDirectory,
    };
    use crate::audit::{EventKind, MovementFilter};
    use crate::checklist::{DocumentKind, required_documents};
    use crate::core_types::{
        Actor, Clock, ContractId, DocumentRef, FixedClock, OrgId, PersonId, Role, UserId,
    };
    use crate::error::{RegistryError, Result};
    use crate::store::memory::MemoryStore;
    use crate::transfer_case::coordinator::{
        CreateCase, NewPublication, TransferCaseService, WorkflowSettings,
    };
    use crate::transfer_case::state::CaseStatus;
    use crate::transfer_case::types::{
        CaseFilter, CloseRequest, DocumentStatus, NewParty, PartyRole, TransferCase,
        TransferType, VerificationOutcome,
    };

    const ORG: OrgId = OrgId(1);
    const OTHER_ORG: OrgId = OrgId(2);

    /// Helper wiring a service to in-memory collaborators
    struct TestHarness {
        service: TransferCaseService,
        documents: Arc<InMemoryDocuments>,
        contracts: Arc<InMemoryContracts>,
        clock: Arc<FixedClock>,
        admin: Actor,
    }

    impl TestHarness {
        fn new() -> Self {
            Self::with_settings(WorkflowSettings::default())
        }

        fn with_settings(settings: WorkflowSettings) -> Self {
            let contracts = Arc::new(InMemoryContracts::new().with_active(ORG, 100..120));
            contracts.insert(ContractId(200), ORG, ContractStatus::Expired);
            contracts.insert(ContractId(300), OTHER_ORG, ContractStatus::Active);
            let persons = Arc::new(InMemoryPersons::new().with_generated(ORG, 1..50));
            let documents = Arc::new(InMemoryDocuments::new());
            let clock = Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap(),
            ));

            let service = TransferCaseService::new(
                Arc::new(MemoryStore::new()),
                contracts.clone(),
                persons,
                documents.clone(),
                clock.clone(),
                settings,
            );

            Self {
                service,
                documents,
                contracts,
                clock,
                admin: Actor::admin(ORG, UserId(10)),
            }
        }

        fn operator(&self) -> Actor {
            Actor::new(ORG, UserId(11), Role::Operator)
        }

        async fn create(&self, contract: i64, tt: TransferType, new_holder: i64) -> TransferCase {
            self.service
                .create_case(
                    &self.admin,
                    CreateCase {
                        contract: ContractId(contract),
                        transfer_type: tt,
                        parties: vec![NewParty::new(PersonId(new_holder), PartyRole::NewHolder)],
                    },
                )
                .await
                .unwrap()
        }

        /// File stored for `org`, not yet attached to any case
        async fn stored(&self, org: OrgId, content: &str) -> DocumentRef {
            self.documents
                .store(org, content.as_bytes().to_vec())
                .await
                .unwrap()
        }

        async fn provide(&self, case: &TransferCase, kind: DocumentKind) {
            self.service
                .store_document(
                    &self.admin,
                    case.id,
                    kind,
                    format!("scan of {}", kind).into_bytes(),
                )
                .await
                .unwrap();
            self.service
                .verify_document(&self.admin, case.id, kind, VerificationOutcome::Verified, None)
                .await
                .unwrap();
        }

        async fn provide_required(&self, case: &TransferCase) {
            for kind in required_documents(case.transfer_type()) {
                self.provide(case, *kind).await;
            }
            if case.transfer_type() == TransferType::Provisional {
                for channel in ["BOP", "DIARIO"] {
                    self.service
                        .add_publication(
                            &self.admin,
                            case.id,
                            NewPublication {
                                channel: channel.to_string(),
                                published_on: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                                reference: None,
                            },
                        )
                        .await
                        .unwrap();
                }
            }
        }

        async fn approved(&self, contract: i64, tt: TransferType, new_holder: i64) -> TransferCase {
            let case = self.create(contract, tt, new_holder).await;
            self.provide_required(&case).await;
            self.service.submit_for_review(&self.admin, case.id).await.unwrap();
            self.service.approve(&self.admin, case.id).await.unwrap()
        }

        async fn register(&self, contract: i64, person: i64) {
            self.service
                .register_holder(
                    &self.admin,
                    ContractId(contract),
                    PersonId(person),
                    NaiveDate::from_ymd_opt(2001, 5, 20).unwrap(),
                )
                .await
                .unwrap();
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    // ========================================================================
    // Creation
    // ========================================================================

    #[tokio::test]
    async fn test_create_case_builds_checklist_and_number() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::MortisCausaTestamento, 2).await;

        assert_eq!(case.number, "TR-2026-0001");
        assert_eq!(case.status, CaseStatus::DocsPending);
        assert_eq!(case.documents.len(), 8);
        assert!(case.documents.iter().all(|d| d.status == DocumentStatus::Missing));
        assert_eq!(case.documents.iter().filter(|d| d.required).count(), 5);

        let second = h.create(101, TransferType::InterVivos, 3).await;
        assert_eq!(second.number, "TR-2026-0002");
    }

    #[tokio::test]
    async fn test_second_open_case_is_refused() {
        let h = TestHarness::new();
        h.create(100, TransferType::InterVivos, 2).await;

        let err = h
            .service
            .create_case(
                &h.admin,
                CreateCase {
                    contract: ContractId(100),
                    transfer_type: TransferType::Provisional,
                    parties: vec![],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidContract { .. }));
    }

    #[tokio::test]
    async fn test_contract_checks() {
        let h = TestHarness::new();
        let create = |contract| CreateCase {
            contract: ContractId(contract),
            transfer_type: TransferType::InterVivos,
            parties: vec![],
        };

        let expired = h.service.create_case(&h.admin, create(200)).await.unwrap_err();
        assert!(matches!(expired, RegistryError::InvalidContract { .. }));

        let foreign = h.service.create_case(&h.admin, create(300)).await.unwrap_err();
        assert!(matches!(foreign, RegistryError::InvalidContract { .. }));

        let unknown = h.service.create_case(&h.admin, create(999)).await.unwrap_err();
        assert!(matches!(unknown, RegistryError::NotFound { kind: "contract", .. }));
    }

    #[tokio::test]
    async fn test_operator_is_read_only() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;

        let err = h
            .service
            .submit_for_review(&h.operator(), case.id)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden { .. }));

        let read = h.service.get_case(&h.operator(), case.id).await.unwrap();
        assert_eq!(read.id, case.id);
    }

    #[tokio::test]
    async fn test_previous_holder_added_from_ledger() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        let case = h.create(100, TransferType::InterVivos, 2).await;

        let previous: Vec<_> = case.parties_with_role(PartyRole::PreviousHolder).collect();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].person, PersonId(1));
    }

    #[tokio::test]
    async fn test_duplicate_single_role_in_request() {
        let h = TestHarness::new();
        let err = h
            .service
            .create_case(
                &h.admin,
                CreateCase {
                    contract: ContractId(100),
                    transfer_type: TransferType::InterVivos,
                    parties: vec![
                        NewParty::new(PersonId(2), PartyRole::NewHolder),
                        NewParty::new(PersonId(3), PartyRole::NewHolder),
                    ],
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
    }

    // ========================================================================
    // Documents & Parties
    // ========================================================================

    #[tokio::test]
    async fn test_document_transitions() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        let kind = DocumentKind::BurialTitle;

        // verify before upload
        let err = h
            .service
            .verify_document(&h.admin, case.id, kind, VerificationOutcome::Verified, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));

        let first = h.stored(ORG, "f1").await;
        let doc = h
            .service
            .upload_document(&h.admin, case.id, kind, first)
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);

        // second upload while UPLOADED
        let second = h.stored(ORG, "f2").await;
        let err = h
            .service
            .upload_document(&h.admin, case.id, kind, second)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));

        let doc = h
            .service
            .verify_document(
                &h.admin,
                case.id,
                kind,
                VerificationOutcome::Rejected,
                Some("illegible".into()),
            )
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Rejected);
        assert_eq!(doc.note.as_deref(), Some("illegible"));

        // re-upload after rejection
        let third = h.stored(ORG, "f3").await;
        let doc = h
            .service
            .upload_document(&h.admin, case.id, kind, third.clone())
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert_eq!(doc.file_ref, Some(third));
        assert!(doc.note.is_none());

        let stored = h.service.get_case(&h.admin, case.id).await.unwrap();
        assert_eq!(stored.status, CaseStatus::DocsPending);
    }

    #[tokio::test]
    async fn test_kind_outside_checklist_is_a_validation_error() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::MortisCausaTestamento, 2).await;
        let kind = DocumentKind::NewHolderId;

        let file = h.stored(ORG, "f").await;
        let err = h
            .service
            .upload_document(&h.admin, case.id, kind, file)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let err = h
            .service
            .verify_document(&h.admin, case.id, kind, VerificationOutcome::Verified, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let err = h.service.document_content(&h.admin, case.id, kind).await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        // The refused content is not kept
        let before = h.documents.len();
        let err = h
            .service
            .store_document(&h.admin, case.id, kind, b"scan".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
        assert_eq!(h.documents.len(), before);
    }

    #[tokio::test]
    async fn test_upload_requires_reference_stored_for_caller_org() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        let kind = DocumentKind::BurialTitle;

        let foreign = h.stored(OTHER_ORG, "other organization's scan").await;
        let err = h
            .service
            .upload_document(&h.admin, case.id, kind, foreign)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let err = h
            .service
            .upload_document(&h.admin, case.id, kind, DocumentRef("scan/0042.pdf".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let case = h.service.get_case(&h.admin, case.id).await.unwrap();
        let doc = case.document(kind).unwrap();
        assert_eq!(doc.status, DocumentStatus::Missing);
        assert!(doc.file_ref.is_none());
    }

    #[tokio::test]
    async fn test_store_document_and_read_it_back() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        let kind = DocumentKind::BurialTitle;

        let err = h.service.document_content(&h.admin, case.id, kind).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));

        let err = h
            .service
            .store_document(&h.operator(), case.id, kind, b"title deed".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden { .. }));
        assert!(h.documents.is_empty());

        let err = h
            .service
            .store_document(&h.admin, case.id, kind, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let doc = h
            .service
            .store_document(&h.admin, case.id, kind, b"title deed".to_vec())
            .await
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        let content = h
            .service
            .document_content(&h.operator(), case.id, kind)
            .await
            .unwrap();
        assert_eq!(content, b"title deed");

        // Second upload while UPLOADED is refused and its file discarded
        let err = h
            .service
            .store_document(&h.admin, case.id, kind, b"again".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));
        assert_eq!(h.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_party_replacement_and_removal() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;

        h.service
            .add_party(&h.admin, case.id, NewParty::new(PersonId(3), PartyRole::NewHolder))
            .await
            .unwrap();
        let heir = h
            .service
            .add_party(&h.admin, case.id, NewParty::new(PersonId(4), PartyRole::Heir))
            .await
            .unwrap();

        let stored = h.service.get_case(&h.admin, case.id).await.unwrap();
        assert_eq!(stored.new_holder().map(|p| p.person), Some(PersonId(3)));
        assert_eq!(stored.parties.len(), 2);

        h.service.remove_party(&h.admin, case.id, heir.id).await.unwrap();
        let err = h.service.remove_party(&h.admin, case.id, heir.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));

        let err = h
            .service
            .add_party(&h.admin, case.id, NewParty::new(PersonId(999), PartyRole::Heir))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { kind: "person", .. }));
    }

    // ========================================================================
    // Review
    // ========================================================================

    #[tokio::test]
    async fn test_submit_requires_verified_documents() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        h.provide(&case, DocumentKind::BurialTitle).await;

        let err = h.service.submit_for_review(&h.admin, case.id).await.unwrap_err();
        match err {
            RegistryError::DocumentsIncomplete { missing, .. } => {
                assert_eq!(
                    missing,
                    vec!["SOLICITUD_CAMBIO_TITULARIDAD", "DNI_TITULAR_ACTUAL", "DNI_NUEVO_TITULAR"]
                );
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submit_requires_new_holder() {
        let h = TestHarness::new();
        let case = h
            .service
            .create_case(
                &h.admin,
                CreateCase {
                    contract: ContractId(100),
                    transfer_type: TransferType::InterVivos,
                    parties: vec![],
                },
            )
            .await
            .unwrap();
        h.provide_required(&case).await;

        let err = h.service.submit_for_review(&h.admin, case.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::MissingParty { role: "NUEVO_TITULAR", .. }));
    }

    #[tokio::test]
    async fn test_provisional_needs_two_publications() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::Provisional, 2).await;
        for kind in required_documents(TransferType::Provisional) {
            h.provide(&case, *kind).await;
        }

        let err = h.service.submit_for_review(&h.admin, case.id).await.unwrap_err();
        match err {
            RegistryError::DocumentsIncomplete { missing, .. } => {
                assert!(missing.contains(&"PUBLICATION:BOP".to_string()));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let on = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        h.service
            .add_publication(
                &h.admin,
                case.id,
                NewPublication {
                    channel: " bop ".into(),
                    published_on: on,
                    reference: Some("BOP 45/2026".into()),
                },
            )
            .await
            .unwrap();
        assert!(h.service.submit_for_review(&h.admin, case.id).await.is_err());

        h.service
            .add_publication(
                &h.admin,
                case.id,
                NewPublication {
                    channel: "diario".into(),
                    published_on: on,
                    reference: None,
                },
            )
            .await
            .unwrap();
        let case = h.service.submit_for_review(&h.admin, case.id).await.unwrap();
        assert_eq!(case.status, CaseStatus::UnderReview);
    }

    #[tokio::test]
    async fn test_publication_validation() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        let publication = |on| NewPublication {
            channel: "BOP".into(),
            published_on: on,
            reference: None,
        };

        let err = h
            .service
            .add_publication(&h.admin, case.id, publication(today()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let events = h.service.case_detail(&h.admin, case.id).await.unwrap().events;
        assert_eq!(events.len(), 1);

        let err = h
            .service
            .add_publication(&h.operator(), case.id, publication(today()))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Forbidden { .. }));

        let provisional = h.create(101, TransferType::Provisional, 2).await;
        let tomorrow = today().succ_opt().unwrap();
        let err = h
            .service
            .add_publication(&h.admin, provisional.id, publication(tomorrow))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_status_changes_follow_transition_table() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;

        let err = h.service.approve(&h.admin, case.id).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidState { operation: "approve", ref status, .. } if status == "DOCS_PENDING"
        ));
        let err = h
            .service
            .request_more_documents(&h.admin, case.id, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidState { operation: "request_more_documents", .. }
        ));
        let err = h
            .service
            .close(&h.admin, case.id, CloseRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { operation: "close", .. }));

        let case = h.approved(101, TransferType::InterVivos, 3).await;
        let err = h.service.reject(&h.admin, case.id, "late objection").await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidState { operation: "reject", ref status, .. } if status == "APPROVED"
        ));
        let err = h.service.reopen(&h.admin, case.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { operation: "reopen", .. }));
        let case = h.service.get_case(&h.admin, case.id).await.unwrap();
        assert_eq!(case.status, CaseStatus::Approved);
    }

    #[tokio::test]
    async fn test_return_for_documents() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        h.provide_required(&case).await;
        h.service.submit_for_review(&h.admin, case.id).await.unwrap();

        let case = h
            .service
            .request_more_documents(&h.admin, case.id, Some("need certified copy".into()))
            .await
            .unwrap();
        assert_eq!(case.status, CaseStatus::DocsPending);

        let err = h.service.approve(&h.admin, case.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));
    }

    // ========================================================================
    // Rejection & Reopen
    // ========================================================================

    #[tokio::test]
    async fn test_reject_requires_reason_and_keeps_ledger() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        let case = h.create(100, TransferType::InterVivos, 2).await;

        let err = h.service.reject(&h.admin, case.id, "  ").await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let rejected = h.service.reject(&h.admin, case.id, "forged title").await.unwrap();
        assert_eq!(rejected.status, CaseStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("forged title"));

        let holder = h
            .service
            .get_active_holder(&h.admin, ContractId(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holder.holder, PersonId(1));

        // a rejected case no longer blocks the contract
        h.create(100, TransferType::InterVivos, 3).await;
    }

    #[tokio::test]
    async fn test_reopen_preserves_documents_and_is_bounded() {
        let h = TestHarness::with_settings(WorkflowSettings { max_reopens: 1 });
        let case = h.create(100, TransferType::InterVivos, 2).await;
        h.provide(&case, DocumentKind::BurialTitle).await;
        h.service.reject(&h.admin, case.id, "incomplete").await.unwrap();

        let reopened = h.service.reopen(&h.admin, case.id).await.unwrap();
        assert_eq!(reopened.status, CaseStatus::DocsPending);
        assert_eq!(reopened.reopen_count, 1);
        assert_eq!(
            reopened.document(DocumentKind::BurialTitle).map(|d| d.status),
            Some(DocumentStatus::Verified)
        );

        h.service.reject(&h.admin, case.id, "still incomplete").await.unwrap();
        let err = h.service.reopen(&h.admin, case.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));

        // exhausted cases accept no edits
        let err = h
            .service
            .add_party(&h.admin, case.id, NewParty::new(PersonId(5), PartyRole::Heir))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));
    }

    #[tokio::test]
    async fn test_reopen_refused_when_contract_has_open_case() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        h.service.reject(&h.admin, case.id, "wrong type").await.unwrap();
        h.create(100, TransferType::MortisCausaTestamento, 2).await;

        let err = h.service.reopen(&h.admin, case.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidContract { .. }));
    }

    // ========================================================================
    // Close
    // ========================================================================

    #[tokio::test]
    async fn test_close_changes_holder_atomically() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        let case = h.approved(100, TransferType::InterVivos, 2).await;

        let closed = h.service.close(&h.admin, case.id, CloseRequest::default()).await.unwrap();
        assert_eq!(closed.status, CaseStatus::Closed);
        assert_eq!(closed.resolution_number.as_deref(), Some("RES-2026-0001"));
        assert_eq!(closed.resolved_at, Some(h.clock.now()));

        let history = h.service.holder_history(&h.admin, ContractId(100)).await.unwrap();
        assert_eq!(history.len(), 2);
        let active: Vec<_> = history.iter().filter(|r| r.is_active()).collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].holder, PersonId(2));
        assert_eq!(active[0].start_date, today());
        assert_eq!(Some(active[0].id), closed.new_record);
        let old = history.iter().find(|r| r.holder == PersonId(1)).unwrap();
        assert_eq!(old.end_date, Some(today()));

        let movements = h
            .service
            .list_movements(
                &h.admin,
                ContractId(100),
                &MovementFilter {
                    kind: Some(EventKind::HolderChanged),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].case, Some(case.id));

        let text = h.service.resolution_document(&h.admin, case.id).await.unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("RES-2026-0001"));
        assert!(text.contains("Person 2"));
    }

    #[tokio::test]
    async fn test_close_twice_is_invalid_state() {
        let h = TestHarness::new();
        let case = h.approved(100, TransferType::InterVivos, 2).await;
        h.service.close(&h.admin, case.id, CloseRequest::default()).await.unwrap();

        let err = h
            .service
            .close(&h.admin, case.id, CloseRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { .. }));

        let history = h.service.holder_history(&h.admin, ContractId(100)).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_close_requires_beneficiary_decision() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        h.service
            .nominate_beneficiary(&h.admin, ContractId(100), PersonId(7), today())
            .await
            .unwrap();
        let case = h.approved(100, TransferType::InterVivos, 2).await;

        let err = h
            .service
            .close(&h.admin, case.id, CloseRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::BeneficiaryDecisionRequired { .. }));

        let still = h.service.get_case(&h.admin, case.id).await.unwrap();
        assert_eq!(still.status, CaseStatus::Approved);
        let holder = h
            .service
            .get_active_holder(&h.admin, ContractId(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(holder.holder, PersonId(1));

        h.service.close(&h.admin, case.id, CloseRequest::keep()).await.unwrap();
        let beneficiary = h
            .service
            .get_active_beneficiary(&h.admin, ContractId(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(beneficiary.person, PersonId(7));
    }

    #[tokio::test]
    async fn test_close_replace_beneficiary_needs_documents() {
        let h = TestHarness::new();
        h.service
            .nominate_beneficiary(&h.admin, ContractId(100), PersonId(7), today())
            .await
            .unwrap();
        let case = h.approved(100, TransferType::InterVivos, 2).await;

        let err = h
            .service
            .close(&h.admin, case.id, CloseRequest::replace(PersonId(8)))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::DocumentsIncomplete { .. }));

        h.provide(&case, DocumentKind::BeneficiaryRequest).await;
        h.provide(&case, DocumentKind::NewBeneficiaryId).await;
        h.service
            .close(&h.admin, case.id, CloseRequest::replace(PersonId(8)))
            .await
            .unwrap();

        let history = h
            .service
            .beneficiary_history(&h.admin, ContractId(100))
            .await
            .unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().filter(|b| b.is_active()).count(), 1);
        let active = h
            .service
            .get_active_beneficiary(&h.admin, ContractId(100))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(active.person, PersonId(8));
        assert_eq!(active.case, Some(case.id));
    }

    #[tokio::test]
    async fn test_provisional_close_sets_expiry() {
        let h = TestHarness::new();
        let case = h.approved(100, TransferType::Provisional, 2).await;
        let closed = h.service.close(&h.admin, case.id, CloseRequest::default()).await.unwrap();

        let until = NaiveDate::from_ymd_opt(2036, 3, 10).unwrap();
        assert_eq!(closed.terms.provisional_until(), Some(until));
        let holder = h
            .service
            .get_active_holder(&h.admin, ContractId(100))
            .await
            .unwrap()
            .unwrap();
        assert!(holder.provisional);
        assert_eq!(holder.provisional_until, Some(until));
    }

    #[tokio::test]
    async fn test_close_with_pensioner() {
        let h = TestHarness::new();
        let case = h.approved(100, TransferType::InterVivos, 2).await;
        let request = CloseRequest {
            beneficiary_decision: None,
            pensioner_since: Some(today()),
        };
        h.service.close(&h.admin, case.id, request).await.unwrap();

        let holder = h
            .service
            .get_active_holder(&h.admin, ContractId(100))
            .await
            .unwrap()
            .unwrap();
        assert!(holder.pensioner);
        assert_eq!(holder.pensioner_since, Some(today()));
    }

    #[tokio::test]
    async fn test_failed_resolution_storage_rolls_back() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        let case = h.approved(100, TransferType::InterVivos, 2).await;

        h.documents.set_fail_store(true);
        let err = h
            .service
            .close(&h.admin, case.id, CloseRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Storage(_)));

        let still = h.service.get_case(&h.admin, case.id).await.unwrap();
        assert_eq!(still.status, CaseStatus::Approved);
        let history = h.service.holder_history(&h.admin, ContractId(100)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].is_active());

        h.documents.set_fail_store(false);
        let closed = h.service.close(&h.admin, case.id, CloseRequest::default()).await.unwrap();
        assert_eq!(closed.resolution_number.as_deref(), Some("RES-2026-0001"));
        let scans = required_documents(TransferType::InterVivos).len();
        assert_eq!(h.documents.len(), scans + 1);
    }

    /// Person directory that counts lookups made while the organization's store lock is held
    struct LockCheckingPersons {
        inner: InMemoryPersons,
        store: Arc<MemoryStore>,
        under_lock: AtomicUsize,
    }

    #[async_trait]
    impl PersonDirectory for LockCheckingPersons {
        async fn get_person(&self, org: OrgId, id: PersonId) -> Result<Option<Person>> {
            let lock = tokio::time::timeout(Duration::from_millis(50), self.store.begin_tx(org));
            if lock.await.is_err() {
                self.under_lock.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.get_person(org, id).await
        }
    }

    #[tokio::test]
    async fn test_close_looks_up_holders_outside_store_lock() {
        let store = Arc::new(MemoryStore::new());
        let persons = Arc::new(LockCheckingPersons {
            inner: InMemoryPersons::new().with_generated(ORG, 1..10),
            store: store.clone(),
            under_lock: AtomicUsize::new(0),
        });
        let service = TransferCaseService::new(
            store,
            Arc::new(InMemoryContracts::new().with_active(ORG, 100..101)),
            persons.clone(),
            Arc::new(InMemoryDocuments::new()),
            Arc::new(FixedClock::new(
                Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap(),
            )),
            WorkflowSettings::default(),
        );
        let admin = Actor::admin(ORG, UserId(10));
        let contract = ContractId(100);

        let since = NaiveDate::from_ymd_opt(2001, 5, 20).unwrap();
        service
            .register_holder(&admin, contract, PersonId(1), since)
            .await
            .unwrap();
        let case = service
            .create_case(
                &admin,
                CreateCase {
                    contract,
                    transfer_type: TransferType::InterVivos,
                    parties: vec![NewParty::new(PersonId(2), PartyRole::NewHolder)],
                },
            )
            .await
            .unwrap();
        for kind in required_documents(TransferType::InterVivos) {
            service
                .store_document(&admin, case.id, *kind, b"scan".to_vec())
                .await
                .unwrap();
            service
                .verify_document(&admin, case.id, *kind, VerificationOutcome::Verified, None)
                .await
                .unwrap();
        }
        service.submit_for_review(&admin, case.id).await.unwrap();
        service.approve(&admin, case.id).await.unwrap();

        service.close(&admin, case.id, CloseRequest::default()).await.unwrap();
        assert_eq!(persons.under_lock.load(Ordering::SeqCst), 0);

        let text = service.resolution_document(&admin, case.id).await.unwrap();
        let text = String::from_utf8(text).unwrap();
        assert!(text.contains("Previous holder: Person 1"));
        assert!(text.contains("New holder: Person 2"));
    }

    #[tokio::test]
    async fn test_close_after_contract_expired_still_allowed() {
        let h = TestHarness::new();
        let case = h.approved(100, TransferType::InterVivos, 2).await;
        h.contracts.insert(ContractId(100), ORG, ContractStatus::Expired);

        // close re-checks the case, not the contract status
        let closed = h.service.close(&h.admin, case.id, CloseRequest::default()).await.unwrap();
        assert_eq!(closed.status, CaseStatus::Closed);
    }

    // ========================================================================
    // Ledger maintenance
    // ========================================================================

    #[tokio::test]
    async fn test_register_holder_only_once() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        let err = h
            .service
            .register_holder(&h.admin, ContractId(100), PersonId(2), today())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidContract { .. }));
    }

    #[tokio::test]
    async fn test_register_holder_refuses_future_start() {
        let h = TestHarness::new();
        let tomorrow = today().succ_opt().unwrap();
        let err = h
            .service
            .register_holder(&h.admin, ContractId(101), PersonId(1), tomorrow)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
        let history = h.service.holder_history(&h.admin, ContractId(101)).await.unwrap();
        assert!(history.is_empty());

        // Starting today still allows a close on the same day
        h.service
            .register_holder(&h.admin, ContractId(101), PersonId(1), today())
            .await
            .unwrap();
        let case = h.approved(101, TransferType::InterVivos, 2).await;
        let closed = h.service.close(&h.admin, case.id, CloseRequest::default()).await.unwrap();
        assert_eq!(closed.status, CaseStatus::Closed);
    }

    #[tokio::test]
    async fn test_beneficiary_nomination_and_removal() {
        let h = TestHarness::new();
        let contract = ContractId(100);

        let err = h
            .service
            .remove_beneficiary(&h.admin, contract, today())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));

        let first = h
            .service
            .nominate_beneficiary(&h.admin, contract, PersonId(7), today())
            .await
            .unwrap();
        let again = h
            .service
            .nominate_beneficiary(&h.admin, contract, PersonId(7), today())
            .await
            .unwrap();
        assert_eq!(first.id, again.id);

        h.service
            .nominate_beneficiary(&h.admin, contract, PersonId(8), today())
            .await
            .unwrap();
        let history = h.service.beneficiary_history(&h.admin, contract).await.unwrap();
        assert_eq!(history.len(), 2);

        let removed = h
            .service
            .remove_beneficiary(&h.admin, contract, today())
            .await
            .unwrap();
        assert_eq!(removed.person, PersonId(8));
        assert!(
            h.service
                .get_active_beneficiary(&h.admin, contract)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_pensioner_retroactive_flag() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        let past = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();

        let err = h
            .service
            .set_holder_pensioner(&h.admin, ContractId(100), past, false)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));

        let record = h
            .service
            .set_holder_pensioner(&h.admin, ContractId(100), past, true)
            .await
            .unwrap();
        assert!(record.pensioner);
        assert_eq!(record.pensioner_since, Some(past));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[tokio::test]
    async fn test_list_cases_filters() {
        let h = TestHarness::new();
        let a = h.create(100, TransferType::InterVivos, 2).await;
        let b = h.create(101, TransferType::Provisional, 3).await;
        h.service.reject(&h.admin, b.id, "duplicate").await.unwrap();

        let all = h.service.list_cases(&h.admin, &CaseFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, b.id, "newest first");

        let pending = h
            .service
            .list_cases(
                &h.admin,
                &CaseFilter {
                    status: Some(CaseStatus::DocsPending),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, a.id);

        let by_party = h
            .service
            .list_cases(
                &h.admin,
                &CaseFilter {
                    party: Some(PersonId(3)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_party.len(), 1);
        assert_eq!(by_party[0].id, b.id);

        // tenants are isolated
        let other = Actor::admin(OTHER_ORG, UserId(99));
        assert!(h.service.list_cases(&other, &CaseFilter::default()).await.unwrap().is_empty());
        let err = h.service.get_case(&other, a.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_case_detail() {
        let h = TestHarness::new();
        h.register(100, 1).await;
        let case = h.create(100, TransferType::InterVivos, 2).await;
        h.provide(&case, DocumentKind::BurialTitle).await;

        let detail = h.service.case_detail(&h.admin, case.id).await.unwrap();
        assert_eq!(detail.active_holder.map(|r| r.holder), Some(PersonId(1)));
        assert!(detail.active_beneficiary.is_none());
        assert_eq!(detail.pending_documents.len(), 3);
        let kinds: Vec<_> = detail.events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::CaseOpened,
                EventKind::DocumentUploaded,
                EventKind::DocumentVerified
            ]
        );
    }

    #[tokio::test]
    async fn test_resolution_document_missing_before_close() {
        let h = TestHarness::new();
        let case = h.create(100, TransferType::InterVivos, 2).await;
        let err = h.service.resolution_document(&h.admin, case.id).await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
        assert!(h.documents.is_empty());
        assert!(h.documents.fetch(ORG, &DocumentRef("nope".into())).await.is_err());
    }
}
