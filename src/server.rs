use crate::domain::{Profile, ResolutionRequest};
use crate::error::ResolveError;
use crate::orchestrator::Resolver;
use axum::{
    extract::Query,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Extension, Router,
};
use hyper::Server;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "prospector",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[derive(Deserialize)]
struct PersonQuery {
    email: String,
    name: String,
}

#[derive(Deserialize)]
struct CompanyQuery {
    domain: String,
}

/// Success covers partial and even empty profiles; opt-out and total provider
/// failure each get their own status so callers can tell the outcomes apart.
fn respond(result: crate::error::Result<Profile>) -> axum::response::Response {
    match result {
        Ok(profile) if profile.opted_out => {
            (StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS, Json(profile)).into_response()
        }
        Ok(profile) => (StatusCode::OK, Json(profile)).into_response(),
        Err(ResolveError::Validation(message)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "error": message })),
        )
            .into_response(),
        Err(ResolveError::AllProvidersFailed) => (
            StatusCode::BAD_GATEWAY,
            Json(serde_json::json!({ "error": "all providers failed" })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Resolution failed unexpectedly");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn person(
    Extension(resolver): Extension<Arc<Resolver>>,
    Query(params): Query<PersonQuery>,
) -> axum::response::Response {
    let request = ResolutionRequest::for_person(&params.email, &params.name);
    respond(resolver.resolve(request).await)
}

async fn company(
    Extension(resolver): Extension<Arc<Resolver>>,
    Query(params): Query<CompanyQuery>,
) -> axum::response::Response {
    let request = ResolutionRequest::for_company(&params.domain);
    respond(resolver.resolve(request).await)
}

pub fn router(resolver: Arc<Resolver>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);
    Router::new()
        .route("/health", get(health))
        .route("/person", get(person))
        .route("/company", get(company))
        .layer(
            ServiceBuilder::new()
                .layer(Extension(resolver))
                .layer(cors),
        )
}

pub async fn serve(resolver: Arc<Resolver>, bind: &str) -> crate::error::Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| ResolveError::Config(format!("invalid bind address '{bind}': {e}")))?;
    info!(%addr, "Starting enrichment API server");
    Server::bind(&addr)
        .serve(router(resolver).into_make_service())
        .await
        .map_err(|e| ResolveError::Config(format!("server error: {e}")))?;
    Ok(())
}
