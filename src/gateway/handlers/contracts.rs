//! Contract ledger handlers: holders, beneficiaries and the movement log

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
};

use super::super::state::AppState;
use super::super::types::{ApiResult, CallerActor, ok};
use crate::audit::Movement;
use crate::core_types::{ContractId, PersonId};
use crate::ledger::{Beneficiary, OwnershipRecord};
use crate::transfer_case::api::{
    MovementQuery, NominateBeneficiaryApiRequest, PensionerApiRequest, RegisterHolderApiRequest,
    RemoveBeneficiaryApiRequest,
};

/// Active holder of a contract (null when none)
///
/// GET /api/v1/contracts/{contract_id}/holder
#[utoipa::path(
    get,
    path = "/api/v1/contracts/{contract_id}/holder",
    params(("contract_id" = i64, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Active ownership record or null", content_type = "application/json"),
        (status = 404, description = "Contract not found")
    ),
    tag = "Contracts"
)]
pub async fn get_active_holder(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
) -> ApiResult<Option<OwnershipRecord>> {
    ok(state
        .cases
        .get_active_holder(&actor, ContractId(contract))
        .await?)
}

/// Register the first holder of a contract that has none
///
/// POST /api/v1/contracts/{contract_id}/holder
#[utoipa::path(
    post,
    path = "/api/v1/contracts/{contract_id}/holder",
    params(("contract_id" = i64, Path, description = "Contract ID")),
    request_body(content = String, description = "Holder: person_id, start_date", content_type = "application/json"),
    responses(
        (status = 200, description = "Ownership record opened", content_type = "application/json"),
        (status = 409, description = "Contract already has an active holder")
    ),
    tag = "Contracts"
)]
pub async fn register_holder(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
    Json(req): Json<RegisterHolderApiRequest>,
) -> ApiResult<OwnershipRecord> {
    let (person, start_date) = req.into_domain()?;
    ok(state
        .cases
        .register_holder(&actor, ContractId(contract), person, start_date)
        .await?)
}

/// All ownership records of a contract, oldest first
///
/// GET /api/v1/contracts/{contract_id}/holders
#[utoipa::path(
    get,
    path = "/api/v1/contracts/{contract_id}/holders",
    params(("contract_id" = i64, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Holder history", content_type = "application/json"),
        (status = 404, description = "Contract not found")
    ),
    tag = "Contracts"
)]
pub async fn holder_history(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
) -> ApiResult<Vec<OwnershipRecord>> {
    ok(state
        .cases
        .holder_history(&actor, ContractId(contract))
        .await?)
}

/// Mark the active holder as pensioner
///
/// POST /api/v1/contracts/{contract_id}/holder/pensioner
#[utoipa::path(
    post,
    path = "/api/v1/contracts/{contract_id}/holder/pensioner",
    params(("contract_id" = i64, Path, description = "Contract ID")),
    request_body(content = String, description = "Pensioner: since, allow_retroactive", content_type = "application/json"),
    responses(
        (status = 200, description = "Ownership record updated", content_type = "application/json"),
        (status = 400, description = "Past date without allow_retroactive"),
        (status = 404, description = "No active holder")
    ),
    tag = "Contracts"
)]
pub async fn set_holder_pensioner(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
    Json(req): Json<PensionerApiRequest>,
) -> ApiResult<OwnershipRecord> {
    ok(state
        .cases
        .set_holder_pensioner(&actor, ContractId(contract), req.since, req.allow_retroactive)
        .await?)
}

/// Active beneficiary of a contract (null when none)
///
/// GET /api/v1/contracts/{contract_id}/beneficiary
#[utoipa::path(
    get,
    path = "/api/v1/contracts/{contract_id}/beneficiary",
    params(("contract_id" = i64, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Active beneficiary or null", content_type = "application/json"),
        (status = 404, description = "Contract not found")
    ),
    tag = "Contracts"
)]
pub async fn get_active_beneficiary(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
) -> ApiResult<Option<Beneficiary>> {
    ok(state
        .cases
        .get_active_beneficiary(&actor, ContractId(contract))
        .await?)
}

/// Designate the contract's beneficiary, replacing any active one
///
/// POST /api/v1/contracts/{contract_id}/beneficiary
#[utoipa::path(
    post,
    path = "/api/v1/contracts/{contract_id}/beneficiary",
    params(("contract_id" = i64, Path, description = "Contract ID")),
    request_body(content = String, description = "Nomination: person_id, active_from", content_type = "application/json"),
    responses(
        (status = 200, description = "Beneficiary designated", content_type = "application/json"),
        (status = 404, description = "Contract or person not found")
    ),
    tag = "Contracts"
)]
pub async fn nominate_beneficiary(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
    Json(req): Json<NominateBeneficiaryApiRequest>,
) -> ApiResult<Beneficiary> {
    let (person, active_from): (PersonId, _) = req.into_domain()?;
    let active_from = active_from.unwrap_or_else(|| state.cases.today());
    ok(state
        .cases
        .nominate_beneficiary(&actor, ContractId(contract), person, active_from)
        .await?)
}

/// End the active beneficiary designation
///
/// DELETE /api/v1/contracts/{contract_id}/beneficiary
#[utoipa::path(
    delete,
    path = "/api/v1/contracts/{contract_id}/beneficiary",
    params(
        ("contract_id" = i64, Path, description = "Contract ID"),
        ("end_date" = Option<String>, Query, description = "Last day of the designation (YYYY-MM-DD), defaults to today")
    ),
    responses(
        (status = 200, description = "Beneficiary removed", content_type = "application/json"),
        (status = 404, description = "No active beneficiary")
    ),
    tag = "Contracts"
)]
pub async fn remove_beneficiary(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
    Query(req): Query<RemoveBeneficiaryApiRequest>,
) -> ApiResult<Beneficiary> {
    let end_date = req.end_date.unwrap_or_else(|| state.cases.today());
    ok(state
        .cases
        .remove_beneficiary(&actor, ContractId(contract), end_date)
        .await?)
}

/// All beneficiary designations of a contract, oldest first
///
/// GET /api/v1/contracts/{contract_id}/beneficiaries
#[utoipa::path(
    get,
    path = "/api/v1/contracts/{contract_id}/beneficiaries",
    params(("contract_id" = i64, Path, description = "Contract ID")),
    responses(
        (status = 200, description = "Beneficiary history", content_type = "application/json"),
        (status = 404, description = "Contract not found")
    ),
    tag = "Contracts"
)]
pub async fn beneficiary_history(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
) -> ApiResult<Vec<Beneficiary>> {
    ok(state
        .cases
        .beneficiary_history(&actor, ContractId(contract))
        .await?)
}

/// Operational movement log of a contract
///
/// GET /api/v1/contracts/{contract_id}/movements
#[utoipa::path(
    get,
    path = "/api/v1/contracts/{contract_id}/movements",
    params(
        ("contract_id" = i64, Path, description = "Contract ID"),
        ("kind" = Option<String>, Query, description = "Event kind, e.g. CAMBIO_TITULARIDAD"),
        ("from" = Option<String>, Query, description = "On or after (YYYY-MM-DD)"),
        ("to" = Option<String>, Query, description = "On or before (YYYY-MM-DD)"),
        ("holder_id" = Option<i64>, Query, description = "Holder at the time of the movement")
    ),
    responses(
        (status = 200, description = "Movements, oldest first", content_type = "application/json"),
        (status = 400, description = "Invalid filter")
    ),
    tag = "Contracts"
)]
pub async fn list_movements(
    State(state): State<Arc<AppState>>,
    CallerActor(actor): CallerActor,
    Path(contract): Path<i64>,
    Query(query): Query<MovementQuery>,
) -> ApiResult<Vec<Movement>> {
    let filter = query.into_filter()?;
    ok(state
        .cases
        .list_movements(&actor, ContractId(contract), &filter)
        .await?)
}
