//! Transfer case handlers
//!
//! Thin adapters: parse the DTO, call the service, wrap the result. All business validation
//! happens in the service.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
};

use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, CallerActor, ok};
use crate::core_types::CaseId;
use crate::transfer_case::api::{
    CaseListQuery, CloseCaseApiRequest, CreateCaseApiRequest, PartyApiRequest,
    PublicationApiRequest, RejectApiRequest, ReturnForDocumentsApiRequest,
    UploadDocumentApiRequest, VerifyDocumentApiRequest, parse_document_kind, parse_id,
    parse_party_id,
};
use crate::transfer_case::{
    CaseDetail, CaseDocument, Party, Publication, TransferCase,
};

fn case_id(raw: &str) -> Result<CaseId, crate::error::RegistryError> {
    parse_id("case_id", raw)
}

/// Open a transfer case
///
/// POST /api/v1/cases
#[utoipa::path(
    post,
    path = "/api/v1/cases",
    request_body(content = String, description = "Case request: contract_id, transfer_type, parties[{person_id, role, share}]", content_type = "application/json"),
    responses(
        (status = 200, description = "Case created in DOCS_PENDING", content_type = "application/json"),
        (status = 400, description = "Invalid parameters"),
        (status = 403, description = "Caller may not write"),
        (status = 404, description = "Contract or person not found"),
        (status = 409, description = "Contract not active or already has an open case")
    ),
    tag = "Cases"
)]
pub async fn create_case(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Json(req): Json<CreateCaseApiRequest>,
) -> ApiResult<TransferCase> {
    let request = req.into_domain()?;
    ok(state.cases.create_case(&actor, request).await?)
}

/// List cases of the caller's organization, newest first
///
/// GET /api/v1/cases
#[utoipa::path(
    get,
    path = "/api/v1/cases",
    params(
        ("transfer_type" = Option<String>, Query, description = "Transfer type filter"),
        ("status" = Option<String>, Query, description = "Case status filter"),
        ("contract_id" = Option<i64>, Query, description = "Contract filter"),
        ("opened_from" = Option<String>, Query, description = "Opened on or after (YYYY-MM-DD)"),
        ("opened_to" = Option<String>, Query, description = "Opened on or before (YYYY-MM-DD)"),
        ("party_id" = Option<i64>, Query, description = "Cases involving this person")
    ),
    responses(
        (status = 200, description = "Matching cases", content_type = "application/json"),
        (status = 400, description = "Invalid filter")
    ),
    tag = "Cases"
)]
pub async fn list_cases(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Query(query): Query<CaseListQuery>,
) -> ApiResult<Vec<TransferCase>> {
    let filter = query.into_filter()?;
    ok(state.cases.list_cases(&actor, &filter).await?)
}

/// Get a case
///
/// GET /api/v1/cases/{case_id}
#[utoipa::path(
    get,
    path = "/api/v1/cases/{case_id}",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    responses(
        (status = 200, description = "Case", content_type = "application/json"),
        (status = 404, description = "Case not found")
    ),
    tag = "Cases"
)]
pub async fn get_case(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
) -> ApiResult<TransferCase> {
    ok(state.cases.get_case(&actor, case_id(&id)?).await?)
}

/// Case with current holder, beneficiary, pending documents and events
///
/// GET /api/v1/cases/{case_id}/detail
#[utoipa::path(
    get,
    path = "/api/v1/cases/{case_id}/detail",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    responses(
        (status = 200, description = "Case detail", content_type = "application/json"),
        (status = 404, description = "Case not found")
    ),
    tag = "Cases"
)]
pub async fn get_case_detail(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
) -> ApiResult<CaseDetail> {
    ok(state.cases.case_detail(&actor, case_id(&id)?).await?)
}

/// Upload (or re-upload after rejection) a checklist document
///
/// POST /api/v1/cases/{case_id}/documents
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/documents",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    request_body(content = String, description = "Upload: kind, file_ref", content_type = "application/json"),
    responses(
        (status = 200, description = "Document UPLOADED", content_type = "application/json"),
        (status = 400, description = "Unknown kind, not in this case's checklist, or file_ref not stored for the organization"),
        (status = 409, description = "Document not in MISSING or REJECTED")
    ),
    tag = "Documents"
)]
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    Json(req): Json<UploadDocumentApiRequest>,
) -> ApiResult<CaseDocument> {
    let (kind, file_ref) = req.into_domain()?;
    ok(state
        .cases
        .upload_document(&actor, case_id(&id)?, kind, file_ref)
        .await?)
}

/// Upload the file content of a checklist document
///
/// PUT /api/v1/cases/{case_id}/documents/{kind}
#[utoipa::path(
    put,
    path = "/api/v1/cases/{case_id}/documents/{kind}",
    params(
        ("case_id" = String, Path, description = "Case ID (ULID format)"),
        ("kind" = String, Path, description = "Checklist document kind, e.g. CERT_DEFUNCION")
    ),
    request_body(content = Vec<u8>, description = "File content", content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "File stored, document UPLOADED", content_type = "application/json"),
        (status = 400, description = "Empty body, unknown kind or not in this case's checklist"),
        (status = 409, description = "Document not in MISSING or REJECTED")
    ),
    tag = "Documents"
)]
pub async fn put_document_content(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path((id, kind)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<CaseDocument> {
    let kind = parse_document_kind(&kind)?;
    ok(state
        .cases
        .store_document(&actor, case_id(&id)?, kind, body.to_vec())
        .await?)
}

/// Download the file attached to a checklist document
///
/// GET /api/v1/cases/{case_id}/documents/{kind}
#[utoipa::path(
    get,
    path = "/api/v1/cases/{case_id}/documents/{kind}",
    params(
        ("case_id" = String, Path, description = "Case ID (ULID format)"),
        ("kind" = String, Path, description = "Checklist document kind, e.g. CERT_DEFUNCION")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 400, description = "Unknown kind or not in this case's checklist"),
        (status = 404, description = "Case not found or no file uploaded")
    ),
    tag = "Documents"
)]
pub async fn get_document_content(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path((id, kind)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let kind = parse_document_kind(&kind)?;
    let bytes = state
        .cases
        .document_content(&actor, case_id(&id)?, kind)
        .await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// Verify or reject an uploaded document
///
/// POST /api/v1/cases/{case_id}/documents/verify
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/documents/verify",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    request_body(content = String, description = "Verification: kind, outcome (VERIFIED|REJECTED), note", content_type = "application/json"),
    responses(
        (status = 200, description = "Document VERIFIED or REJECTED", content_type = "application/json"),
        (status = 409, description = "Document not UPLOADED")
    ),
    tag = "Documents"
)]
pub async fn verify_document(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    Json(req): Json<VerifyDocumentApiRequest>,
) -> ApiResult<CaseDocument> {
    let (kind, outcome, note) = req.into_domain()?;
    ok(state
        .cases
        .verify_document(&actor, case_id(&id)?, kind, outcome, note)
        .await?)
}

/// Attach a party to a case
///
/// POST /api/v1/cases/{case_id}/parties
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/parties",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    request_body(content = String, description = "Party: person_id, role, share", content_type = "application/json"),
    responses(
        (status = 200, description = "Party added", content_type = "application/json"),
        (status = 404, description = "Case or person not found")
    ),
    tag = "Cases"
)]
pub async fn add_party(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    Json(req): Json<PartyApiRequest>,
) -> ApiResult<Party> {
    let party = req.into_domain()?;
    ok(state.cases.add_party(&actor, case_id(&id)?, party).await?)
}

/// Detach a party from a case
///
/// DELETE /api/v1/cases/{case_id}/parties/{party_id}
#[utoipa::path(
    delete,
    path = "/api/v1/cases/{case_id}/parties/{party_id}",
    params(
        ("case_id" = String, Path, description = "Case ID (ULID format)"),
        ("party_id" = String, Path, description = "Party ID (ULID format)")
    ),
    responses(
        (status = 200, description = "Party removed", content_type = "application/json"),
        (status = 404, description = "Case or party not found")
    ),
    tag = "Cases"
)]
pub async fn remove_party(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path((id, party_id)): Path<(String, String)>,
) -> ApiResult<()> {
    let party = parse_party_id(&party_id)?;
    state.cases.remove_party(&actor, case_id(&id)?, party).await?;
    ok(())
}

/// Record a public notice (PROVISIONAL cases only)
///
/// POST /api/v1/cases/{case_id}/publications
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/publications",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    request_body(content = String, description = "Publication: channel, published_on, reference", content_type = "application/json"),
    responses(
        (status = 200, description = "Publication recorded", content_type = "application/json"),
        (status = 400, description = "Not a PROVISIONAL case, blank channel or future date")
    ),
    tag = "Cases"
)]
pub async fn add_publication(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    Json(req): Json<PublicationApiRequest>,
) -> ApiResult<Publication> {
    let publication = req.into_domain()?;
    ok(state
        .cases
        .add_publication(&actor, case_id(&id)?, publication)
        .await?)
}

/// DOCS_PENDING → UNDER_REVIEW
///
/// POST /api/v1/cases/{case_id}/submit
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/submit",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    responses(
        (status = 200, description = "Case UNDER_REVIEW", content_type = "application/json"),
        (status = 409, description = "Case not in DOCS_PENDING"),
        (status = 422, description = "Documents incomplete or new holder missing")
    ),
    tag = "Review"
)]
pub async fn submit_for_review(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
) -> ApiResult<TransferCase> {
    ok(state.cases.submit_for_review(&actor, case_id(&id)?).await?)
}

/// UNDER_REVIEW → DOCS_PENDING
///
/// POST /api/v1/cases/{case_id}/return
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/return",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    request_body(content = String, description = "Optional reason", content_type = "application/json"),
    responses(
        (status = 200, description = "Case back in DOCS_PENDING", content_type = "application/json"),
        (status = 409, description = "Case not UNDER_REVIEW")
    ),
    tag = "Review"
)]
pub async fn request_more_documents(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    req: Option<Json<ReturnForDocumentsApiRequest>>,
) -> ApiResult<TransferCase> {
    let reason = req.map(|Json(r)| r).unwrap_or_default().into_domain()?;
    ok(state
        .cases
        .request_more_documents(&actor, case_id(&id)?, reason)
        .await?)
}

/// UNDER_REVIEW → APPROVED
///
/// POST /api/v1/cases/{case_id}/approve
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/approve",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    responses(
        (status = 200, description = "Case APPROVED", content_type = "application/json"),
        (status = 409, description = "Case not UNDER_REVIEW")
    ),
    tag = "Review"
)]
pub async fn approve(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
) -> ApiResult<TransferCase> {
    ok(state.cases.approve(&actor, case_id(&id)?).await?)
}

/// DOCS_PENDING | UNDER_REVIEW → REJECTED
///
/// POST /api/v1/cases/{case_id}/reject
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/reject",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    request_body(content = String, description = "Rejection: reason (required)", content_type = "application/json"),
    responses(
        (status = 200, description = "Case REJECTED", content_type = "application/json"),
        (status = 400, description = "Blank reason"),
        (status = 409, description = "Case not rejectable")
    ),
    tag = "Review"
)]
pub async fn reject(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    Json(req): Json<RejectApiRequest>,
) -> ApiResult<TransferCase> {
    let reason = req.into_domain()?;
    ok(state.cases.reject(&actor, case_id(&id)?, &reason).await?)
}

/// REJECTED → DOCS_PENDING
///
/// POST /api/v1/cases/{case_id}/reopen
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/reopen",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    responses(
        (status = 200, description = "Case reopened", content_type = "application/json"),
        (status = 409, description = "Not REJECTED, retries exhausted, or contract has another open case")
    ),
    tag = "Review"
)]
pub async fn reopen(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
) -> ApiResult<TransferCase> {
    ok(state.cases.reopen(&actor, case_id(&id)?).await?)
}

/// APPROVED → CLOSED: change the holder and issue the resolution
///
/// POST /api/v1/cases/{case_id}/close
#[utoipa::path(
    post,
    path = "/api/v1/cases/{case_id}/close",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    request_body(content = String, description = "Close: beneficiary_decision (KEEP|REPLACE), beneficiary_person_id, pensioner_since", content_type = "application/json"),
    responses(
        (status = 200, description = "Case CLOSED", content_type = "application/json"),
        (status = 409, description = "Case not APPROVED"),
        (status = 422, description = "Documents incomplete or beneficiary decision required"),
        (status = 500, description = "Ledger invariant violated")
    ),
    tag = "Review"
)]
pub async fn close(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
    req: Option<Json<CloseCaseApiRequest>>,
) -> ApiResult<TransferCase> {
    let request = req.map(|Json(r)| r).unwrap_or_default().into_domain()?;
    ok(state.cases.close(&actor, case_id(&id)?, request).await?)
}

/// Text of the resolution issued at close
///
/// GET /api/v1/cases/{case_id}/resolution
#[utoipa::path(
    get,
    path = "/api/v1/cases/{case_id}/resolution",
    params(("case_id" = String, Path, description = "Case ID (ULID format)")),
    responses(
        (status = 200, description = "Resolution text", content_type = "application/json"),
        (status = 404, description = "Case not found or not closed")
    ),
    tag = "Cases"
)]
pub async fn get_resolution(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let bytes = state
        .cases
        .resolution_document(&actor, case_id(&id)?)
        .await?;
    ok(String::from_utf8_lossy(&bytes).into_owned())
}
