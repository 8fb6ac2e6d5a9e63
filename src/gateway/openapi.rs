//! OpenAPI Documentation
//!
//! Auto-generated OpenAPI 3.0 documentation for the plot title registry API.
//!
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::HealthResponse;

/// Caller identity headers forwarded by the authentication layer
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "org_headers",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "X-Org-Id",
                    r#"Caller identity, set by the upstream authentication layer:
- X-Org-Id: organization (tenant) id
- X-User-Id: user id
- X-User-Role: ADMIN or OPERATOR (defaults to OPERATOR, read-only)"#,
                ))),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Plot Title Registry API",
        version = "1.0.0",
        description = "Ownership transfer cases and holder ledger for cemetery funerary-use rights.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        // Cases
        crate::gateway::handlers::create_case,
        crate::gateway::handlers::list_cases,
        crate::gateway::handlers::get_case,
        crate::gateway::handlers::get_case_detail,
        crate::gateway::handlers::add_party,
        crate::gateway::handlers::remove_party,
        crate::gateway::handlers::add_publication,
        crate::gateway::handlers::get_resolution,
        // Documents
        crate::gateway::handlers::upload_document,
        crate::gateway::handlers::put_document_content,
        crate::gateway::handlers::get_document_content,
        crate::gateway::handlers::verify_document,
        // Review
        crate::gateway::handlers::submit_for_review,
        crate::gateway::handlers::request_more_documents,
        crate::gateway::handlers::approve,
        crate::gateway::handlers::reject,
        crate::gateway::handlers::reopen,
        crate::gateway::handlers::close,
        // Contracts
        crate::gateway::handlers::get_active_holder,
        crate::gateway::handlers::register_holder,
        crate::gateway::handlers::holder_history,
        crate::gateway::handlers::set_holder_pensioner,
        crate::gateway::handlers::get_active_beneficiary,
        crate::gateway::handlers::nominate_beneficiary,
        crate::gateway::handlers::remove_beneficiary,
        crate::gateway::handlers::beneficiary_history,
        crate::gateway::handlers::list_movements,
    ),
    components(
        schemas(
            HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    security(("org_headers" = [])),
    tags(
        (name = "Cases", description = "Transfer case lifecycle"),
        (name = "Documents", description = "Checklist document upload and verification"),
        (name = "Review", description = "Review, rejection, reopening and close"),
        (name = "Contracts", description = "Holder and beneficiary ledger, movement log"),
        (name = "System", description = "Health checks and system info")
    )
)]
pub struct ApiDoc;
