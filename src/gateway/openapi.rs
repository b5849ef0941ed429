//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::HealthResponse;

/// Bearer JWT issued by the identity provider
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("HS256 token; `sub` is the numeric user id"))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Escrow Desk API",
        version = "1.0.0",
        description = "P2P crypto/fiat trades settled through custodial escrow.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::create_trade_request,
        crate::gateway::handlers::list_trade_requests,
        crate::gateway::handlers::my_trade_requests,
        crate::gateway::handlers::accept_trade_request,
        crate::gateway::handlers::decline_trade_request,
        crate::gateway::handlers::cancel_trade_request,
        crate::gateway::handlers::get_trade,
        crate::gateway::handlers::submit_payment_proof,
        crate::gateway::handlers::confirm_payment,
        crate::gateway::handlers::cancel_trade,
        crate::gateway::handlers::raise_dispute,
        crate::gateway::handlers::get_vendor_job,
        crate::gateway::handlers::submit_job_payment,
        crate::gateway::handlers::confirm_job_payment,
        crate::gateway::handlers::start_vendor_job,
        crate::gateway::handlers::complete_vendor_job,
        crate::gateway::handlers::deposit_callback,
    ),
    components(
        schemas(HealthResponse)
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Trade Requests", description = "Offers: open, browse, accept, decline, withdraw"),
        (name = "Trades", description = "Matched trades: payment proof, confirmation, cancel, dispute"),
        (name = "Vendor Jobs", description = "Cash handoff jobs (vendor, payer and customer)"),
        (name = "Internal", description = "Custodian callbacks"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "Escrow Desk API");
        assert!(spec.to_json().is_ok());
    }

    #[test]
    fn test_lifecycle_endpoints_registered() {
        let paths = ApiDoc::openapi().paths.paths;
        assert!(paths.contains_key("/health"));
        assert!(paths.contains_key("/api/v1/trade-requests/{id}/accept"));
        assert!(paths.contains_key("/api/v1/trades/{id}/confirm-payment"));
        assert!(paths.contains_key("/api/v1/vendor-jobs/{id}/complete"));
        assert!(paths.contains_key("/internal/custodian/deposit"));
    }

    #[test]
    fn test_security_scheme_registered() {
        let components = ApiDoc::openapi().components.expect("should have components");
        assert!(components.security_schemes.contains_key("bearer_jwt"));
    }
}
