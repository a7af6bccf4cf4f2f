use crate::enrichment::{CategoryOutcome, Enricher};
use crate::error::EnricherError;
use crate::isbn::normalize_to_isbn13;
use crate::webhook::{self, WebhookContext};
use axum::{
    body::Bytes,
    extract::Query,
    http::{header, HeaderMap, Method, StatusCode},
    response::{AppendHeaders, IntoResponse, Json},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::error;

/// Shared per-process state handed to every handler.
pub struct AppState {
    pub enricher: Enricher,
    pub webhook: WebhookContext,
}

#[derive(Debug, Deserialize)]
pub struct IsbnQuery {
    pub isbn: String,
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "kbooks-enricher",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

fn no_store() -> AppendHeaders<[(header::HeaderName, &'static str); 1]> {
    AppendHeaders([(header::CACHE_CONTROL, "no-store")])
}

fn map_error(e: EnricherError) -> (StatusCode, Json<serde_json::Value>) {
    match e {
        EnricherError::Dispatch { status, .. } => {
            error!("Crawl dispatch rejected upstream ({})", status);
            (StatusCode::BAD_GATEWAY, Json(json!({"error": "trigger failed"})))
        }
        EnricherError::Upstream(msg) => {
            error!("Upstream unavailable: {}", msg);
            (StatusCode::BAD_GATEWAY, Json(json!({"error": "trigger failed"})))
        }
        other => {
            error!("Enrichment failed: {}", other);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "internal error"})),
            )
        }
    }
}

/// On-demand catalog enrichment for one ISBN. Always answers with the
/// current record state; upstream failures surface as `catalog: null`,
/// not as errors.
async fn enrich_catalog(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<IsbnQuery>,
) -> impl IntoResponse {
    let Some(isbn13) = normalize_to_isbn13(&query.isbn) else {
        return (
            StatusCode::BAD_REQUEST,
            no_store(),
            Json(json!({"error": "invalid isbn"})),
        );
    };

    match state.enricher.enrich_catalog(&isbn13).await {
        Ok(outcome) => match serde_json::to_value(&outcome) {
            Ok(body) => (StatusCode::OK, no_store(), Json(body)),
            Err(e) => {
                let (status, body) = map_error(e.into());
                (status, no_store(), body)
            }
        },
        Err(e) => {
            let (status, body) = map_error(e);
            (status, no_store(), body)
        }
    }
}

/// On-demand category enrichment: resolve a retailer URL and dispatch an
/// asynchronous crawl. The scrape result arrives later via the webhook.
async fn enrich_category(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<IsbnQuery>,
) -> impl IntoResponse {
    let Some(isbn13) = normalize_to_isbn13(&query.isbn) else {
        return (
            StatusCode::BAD_REQUEST,
            no_store(),
            Json(json!({"error": "invalid isbn"})),
        );
    };

    match state.enricher.enrich_category(&isbn13).await {
        Ok(CategoryOutcome::Skipped) => {
            (StatusCode::OK, no_store(), Json(json!({"status": "skipped"})))
        }
        Ok(CategoryOutcome::Unresolved) => (
            StatusCode::ACCEPTED,
            no_store(),
            Json(json!({"status": "unresolved"})),
        ),
        Ok(CategoryOutcome::NotConfigured) => (
            StatusCode::ACCEPTED,
            no_store(),
            Json(json!({"status": "skipped", "note": "crawl integration unconfigured"})),
        ),
        Ok(CategoryOutcome::Queued { run_id }) => (
            StatusCode::ACCEPTED,
            no_store(),
            Json(json!({"status": "queued", "run_id": run_id})),
        ),
        Err(e) => {
            let (status, body) = map_error(e);
            (status, no_store(), body)
        }
    }
}

/// Crawler webhook: side-effecting, so every response carries no-store.
async fn webhook_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let (status, value) = webhook::process(&state.webhook, &headers, &body).await;
    (status, no_store(), Json(value))
}

/// Create the HTTP server with all routes.
pub fn create_server(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/enrich/catalog", get(enrich_catalog))
        .route("/enrich/category", get(enrich_category))
        .route("/webhook", post(webhook_handler))
        .layer(Extension(state))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the specified port
pub async fn start_server(
    state: Arc<AppState>,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_server(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    println!("🚀 Enrichment server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("📚 Catalog:      http://localhost:{port}/enrich/catalog?isbn=...");
    println!("🕸️  Webhook:      POST http://localhost:{port}/webhook");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
