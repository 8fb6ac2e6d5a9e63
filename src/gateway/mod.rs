//! HTTP Gateway
//!
//! Thin axum surface over [`TransferCaseService`](crate::transfer_case::TransferCaseService).
//! Caller identity arrives in headers set by the upstream authentication layer.

pub mod handlers;
pub mod openapi;
pub mod state;
pub mod types;

use axum::{
    Json, Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use utoipa::OpenApi;

use crate::config::GatewayConfig;
use state::AppState;

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::ApiDoc::openapi())
}

/// Build the complete router
pub fn router(state: Arc<AppState>) -> Router {
    // ==========================================================================
    // Case Routes
    // ==========================================================================
    let case_routes = Router::new()
        .route("/{case_id}", get(handlers::get_case))
        .route("/{case_id}/detail", get(handlers::get_case_detail))
        .route("/{case_id}/resolution", get(handlers::get_resolution))
        // Documents
        .route("/{case_id}/documents", post(handlers::upload_document))
        .route("/{case_id}/documents/verify", post(handlers::verify_document))
        .route(
            "/{case_id}/documents/{kind}",
            get(handlers::get_document_content).put(handlers::put_document_content),
        )
        // Parties & publications
        .route("/{case_id}/parties", post(handlers::add_party))
        .route(
            "/{case_id}/parties/{party_id}",
            axum::routing::delete(handlers::remove_party),
        )
        .route("/{case_id}/publications", post(handlers::add_publication))
        // Review
        .route("/{case_id}/submit", post(handlers::submit_for_review))
        .route("/{case_id}/return", post(handlers::request_more_documents))
        .route("/{case_id}/approve", post(handlers::approve))
        .route("/{case_id}/reject", post(handlers::reject))
        .route("/{case_id}/reopen", post(handlers::reopen))
        .route("/{case_id}/close", post(handlers::close));

    // ==========================================================================
    // Contract Ledger Routes
    // ==========================================================================
    let contract_routes = Router::new()
        .route(
            "/{contract_id}/holder",
            get(handlers::get_active_holder).post(handlers::register_holder),
        )
        .route("/{contract_id}/holders", get(handlers::holder_history))
        .route(
            "/{contract_id}/holder/pensioner",
            post(handlers::set_holder_pensioner),
        )
        .route(
            "/{contract_id}/beneficiary",
            get(handlers::get_active_beneficiary)
                .post(handlers::nominate_beneficiary)
                .delete(handlers::remove_beneficiary),
        )
        .route(
            "/{contract_id}/beneficiaries",
            get(handlers::beneficiary_history),
        )
        .route("/{contract_id}/movements", get(handlers::list_movements));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .route(
            "/api/v1/cases",
            post(handlers::create_case).get(handlers::list_cases),
        )
        .nest("/api/v1/cases", case_routes)
        .nest("/api/v1/contracts", contract_routes)
        .with_state(state)
        // OpenAPI document (stateless, added after with_state)
        .route("/api-docs/openapi.json", get(openapi_json))
}

pub async fn run_server(config: &GatewayConfig, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {}: {} (port {} may already be in use)",
            addr,
            e,
            config.port
        )
    })?;

    tracing::info!(addr = %addr, "Gateway listening");
    tracing::info!("API:  http://{}/api/v1/*", addr);
    tracing::info!("Docs: http://{}/api-docs/openapi.json", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
