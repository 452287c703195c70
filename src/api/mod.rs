// HTTP surface of the authority

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{any, get},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::envelope::ApiResponse;
use crate::issuer::{IssueError, TokenIssuer};
use crate::validation::{AuthRequest, Route};

pub type AppState = Arc<TokenIssuer>;

/// Build the router serving every [`Route`] plus `/health`.
///
/// Routes accept any method; the body is decoded according to the path
/// alone. Unknown paths get a bare 404.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new().route("/health", get(health_check));

    for route in Route::ALL {
        router = router.route(
            route.path(),
            any(move |State(state): State<AppState>, body: Bytes| handle(state, route, body)),
        );
    }

    router
        .fallback(not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn handle(issuer: AppState, route: Route, body: Bytes) -> Response {
    let request = match AuthRequest::parse(route, &body) {
        Ok(request) => request,
        Err(e) => return ApiResponse::validation_failed(e.message()).into_response(),
    };

    match request {
        AuthRequest::PublicKeySet => public_key_set(&issuer),
        AuthRequest::CreateProject(req) => {
            respond(issuer.create_project(req).await.map(ApiResponse::ok))
        }
        AuthRequest::Register(req) => {
            respond(issuer.register(req).await.map(|()| ApiResponse::ok_empty()))
        }
        AuthRequest::FetchToken(req) => {
            respond(issuer.fetch_token(req).await.map(ApiResponse::ok))
        }
        AuthRequest::RefreshToken(req) => {
            respond(issuer.refresh_token(req).await.map(ApiResponse::ok))
        }
    }
}

/// The key-set document is served verbatim, outside the envelope.
fn public_key_set(issuer: &TokenIssuer) -> Response {
    (
        [(header::CONTENT_TYPE, "application/json")],
        issuer.public_key_set_document().to_vec(),
    )
        .into_response()
}

fn respond(result: Result<ApiResponse, IssueError>) -> Response {
    result
        .unwrap_or_else(IssueError::into_response)
        .into_response()
}
