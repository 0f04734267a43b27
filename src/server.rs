//! HTTP trigger.
//!
//! `GET|POST /api/pdfit` renders one template and answers with the PDF.
//! Query parameters become properties; a POST may also carry a flat JSON
//! object whose fields override the query. The reserved `templateUrl` field
//! names the template and is not passed to the binder.

use crate::config::ServerConfig;
use crate::error::{FailureStage, PdfItError};
use crate::render::Renderer;
use crate::request::{PropertySet, RenderRequest, TemplateSource};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

/// Property naming the template to render.
pub const TEMPLATE_URL_FIELD: &str = "templateUrl";

/// Response header carrying the render's request id.
pub const REQUEST_ID_HEADER: &str = "x-pdfit-request-id";

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    pub renderer: Renderer,
    /// Limits renders running at the same time; each one spawns converters.
    pub render_permits: Arc<Semaphore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(renderer: Renderer, config: ServerConfig) -> Self {
        let render_permits = Arc::new(Semaphore::new(config.max_concurrent_renders.max(1)));
        Self {
            renderer,
            render_permits,
            config: Arc::new(config),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/pdfit", get(render_get).post(render_post))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(config: ServerConfig, renderer: Renderer) -> Result<(), PdfItError> {
    let addr = config.bind;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PdfItError::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("pdfit listening on {}", addr);
    tracing::info!("Endpoints:");
    tracing::info!("  - GET|POST /api/pdfit");
    tracing::info!("  - GET      /health");

    axum::serve(listener, router(AppState::new(renderer, config)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| PdfItError::Internal(format!("Server error: {}", e)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}

async fn health() -> &'static str {
    "ok"
}

async fn render_get(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, PdfItError> {
    let properties: PropertySet = query.into_iter().collect();
    render(state, properties).await
}

async fn render_post(
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Response, PdfItError> {
    let mut properties: PropertySet = query.into_iter().collect();
    merge_json_body(&mut properties, &body)?;
    render(state, properties).await
}

async fn render(state: AppState, mut properties: PropertySet) -> Result<Response, PdfItError> {
    let template_url = properties
        .remove(TEMPLATE_URL_FIELD)
        .filter(|u| !u.trim().is_empty())
        .or_else(|| state.config.default_template_url.clone())
        .ok_or_else(|| {
            PdfItError::InvalidRequest(format!(
                "No '{}' given and no default template configured",
                TEMPLATE_URL_FIELD
            ))
        })?;

    tracing::info!(
        "Render request for '{}' with {} properties",
        template_url,
        properties.len()
    );
    let request = RenderRequest::new(TemplateSource::Url(template_url), properties);

    let secs = state.config.request_timeout_secs;
    let work = async {
        let _permit = state
            .render_permits
            .acquire()
            .await
            .map_err(|_| PdfItError::Internal("render permits closed".into()))?;
        state.renderer.render(request).await
    };
    let document = tokio::time::timeout(Duration::from_secs(secs), work)
        .await
        .map_err(|_| PdfItError::RequestTimeout { secs })??;

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"document.pdf\""),
        ],
        document.bytes,
    )
        .into_response();
    if let Ok(id) = HeaderValue::from_str(&document.stats.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, id);
    }
    Ok(response)
}

/// Overlay the fields of a flat JSON object onto `properties`.
///
/// Strings are taken as-is, numbers and booleans stringified, `null` skipped.
/// An empty body is no body.
fn merge_json_body(properties: &mut PropertySet, body: &[u8]) -> Result<(), PdfItError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| PdfItError::InvalidRequest(format!("Body is not valid JSON: {}", e)))?;
    let Value::Object(fields) = value else {
        return Err(PdfItError::InvalidRequest(
            "Body must be a JSON object of property values".into(),
        ));
    };
    for (key, value) in fields {
        let value = match value {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(PdfItError::InvalidRequest(format!(
                    "Property '{}' must be a string, number or boolean",
                    key
                )))
            }
        };
        properties.insert(key, value);
    }
    Ok(())
}

impl PdfItError {
    /// HTTP status reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PdfItError::InvalidRequest(_) | PdfItError::InvalidTemplateUrl { .. } => {
                StatusCode::BAD_REQUEST
            }
            PdfItError::FetchFailed { .. } | PdfItError::NotAPdf { .. } => StatusCode::BAD_GATEWAY,
            PdfItError::FetchTimeout { .. }
            | PdfItError::ConversionTimeout { .. }
            | PdfItError::RequestTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PdfItError::TemplateSyntax { .. } | PdfItError::TemplateRender { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PdfItError::ConversionFailed { .. }
            | PdfItError::Workspace { .. }
            | PdfItError::InvalidConfig(_)
            | PdfItError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PdfItError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let stage = self.stage();
        if status.is_server_error() {
            tracing::error!("Render failed at {} stage: {}", stage, self);
        } else {
            tracing::info!("Request rejected: {}", self);
        }

        let message = match stage {
            // Paths under the work directory are not the caller's business.
            FailureStage::Workspace => "Working file I/O failed".to_string(),
            _ => self.to_string(),
        };
        let body = Json(json!({
            "error": self.code(),
            "stage": stage,
            "message": message,
        }));

        (status, body).into_response()
    }
}
