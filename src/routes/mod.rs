use axum::http::HeaderValue;
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::contracts::{ContractError, ContractResult};
use crate::{auth::AuthenticatedUser, state::AppState};

pub mod contracts;
pub mod health;
pub mod signing;
pub mod templates;

/// Runs `op`, and runs it once more if it lost a race for a contract row.
pub(crate) fn retry_on_conflict<T>(
    mut op: impl FnMut() -> ContractResult<T>,
) -> ContractResult<T> {
    match op() {
        Err(ContractError::Conflict) => {
            warn!("contract modified concurrently, retrying once");
            op()
        }
        other => other,
    }
}

fn cors_layer(allowed: Option<&str>) -> CorsLayer {
    let allow_origin = match allowed {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        warn!(origin = value, "ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

pub fn create_router(state: AppState) -> Router<()> {
    let cors = cors_layer(state.config.cors_allowed_origin.as_deref());

    let templates_routes = Router::new()
        .route(
            "/",
            get(templates::list_templates).post(templates::create_template),
        )
        .route("/seed", post(templates::seed_templates))
        .route(
            "/:id",
            get(templates::get_template)
                .patch(templates::update_template)
                .delete(templates::delete_template),
        );

    let contracts_routes = Router::new()
        .route(
            "/",
            get(contracts::list_contracts).post(contracts::create_contract),
        )
        .route("/:id", get(contracts::get_contract))
        .route("/:id/status", patch(contracts::update_status))
        .route("/:id/template", post(contracts::insert_template))
        .route(
            "/:id/versions",
            get(contracts::list_versions).post(contracts::create_version),
        )
        .route("/:id/render", post(contracts::render))
        .route(
            "/:id/signers",
            get(contracts::list_signers).post(contracts::add_signer),
        )
        .route("/:id/send", post(contracts::send))
        .route("/:id/events", get(contracts::list_events));

    let signing_routes = Router::new()
        .route(
            "/:token",
            get(signing::open_session).post(signing::complete_signing),
        )
        .route("/:token/otp", post(signing::request_otp));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/templates", templates_routes)
        .nest("/api/contracts", contracts_routes)
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .nest("/api/sign", signing_routes)
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn retries_a_conflict_once() {
        let calls = Cell::new(0);
        let result = retry_on_conflict(|| {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(ContractError::Conflict)
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn gives_up_after_the_second_conflict() {
        let calls = Cell::new(0);
        let result: ContractResult<()> = retry_on_conflict(|| {
            calls.set(calls.get() + 1);
            Err(ContractError::Conflict)
        });
        assert!(matches!(result, Err(ContractError::Conflict)));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn other_errors_are_not_retried() {
        let calls = Cell::new(0);
        let result: ContractResult<()> = retry_on_conflict(|| {
            calls.set(calls.get() + 1);
            Err(ContractError::NotFound)
        });
        assert!(matches!(result, Err(ContractError::NotFound)));
        assert_eq!(calls.get(), 1);
    }
}
