//! Axum framework integration.
//!
//! Ready-made routes over a shared [`PdfService`]:
//!
//! | Method | Path | Body | Query |
//! |--------|------|------|-------|
//! | `POST` | `/pdf/render` | JSON [`RenderRequest`] | `format`, `level` (optional compression) |
//! | `POST` | `/pdf/compress` | PDF bytes | `format`, `level` (default 5) |
//! | `GET` | `/health` | | |
//!
//! `format=base64` returns `{ "success": true, "data": "<base64>" }`
//! instead of `application/pdf` bytes. Errors are returned as
//! [`ErrorResponse`] JSON with the status from [`ServiceError::status_code`].
//!
//! # Setup
//!
//! ```toml
//! [dependencies]
//! html2pdf-render = { version = "0.3", features = ["axum-integration"] }
//! axum = "0.8"
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use html2pdf_render::integrations::axum::router;
//! use html2pdf_render::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = html2pdf_render::config::env::from_env().expect("invalid configuration");
//!     let app = router(PdfService::chrome(config).into_shared());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;

use crate::compress::CompressionLevel;
use crate::request::RenderRequest;
use crate::service::{
    ErrorResponse, HealthResponse, OutputFormat, PdfPayload, ServiceError, SharedPdfService,
};

/// Type alias for the Axum `State` extractor with the shared service.
pub type PdfServiceState = State<SharedPdfService>;

/// Query parameters of `/pdf/render`.
#[derive(Debug, Default, Deserialize)]
pub struct RenderQuery {
    #[serde(default)]
    pub format: OutputFormat,
    /// Compress the rendered document at this level.
    pub level: Option<u8>,
}

/// Query parameters of `/pdf/compress`.
#[derive(Debug, Default, Deserialize)]
pub struct CompressQuery {
    #[serde(default)]
    pub format: OutputFormat,
    pub level: Option<u8>,
}

/// Build the router with all routes and `service` as state.
pub fn router(service: SharedPdfService) -> Router {
    Router::new()
        .route("/pdf/render", post(render_pdf))
        .route("/pdf/compress", post(compress_pdf))
        .route("/health", get(health))
        .with_state(service)
}

/// `POST /pdf/render`
pub async fn render_pdf(
    State(service): PdfServiceState,
    Query(query): Query<RenderQuery>,
    body: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(request) = body.map_err(|e| ServiceError::InvalidRequest(e.body_text()))?;

    let pdf = service.render_and_compress(request, query.level).await?;
    payload_response(PdfPayload::new(pdf, query.format))
}

/// `POST /pdf/compress`
pub async fn compress_pdf(
    State(service): PdfServiceState,
    Query(query): Query<CompressQuery>,
    body: Bytes,
) -> Result<Response, ServiceError> {
    if body.is_empty() {
        return Err(ServiceError::InvalidRequest("empty PDF body".to_string()));
    }
    let level = query.level.unwrap_or(CompressionLevel::default().value());

    let payload = service
        .compress_payload(body.to_vec(), level, query.format)
        .await?;
    payload_response(payload)
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

fn payload_response(payload: PdfPayload) -> Result<Response, ServiceError> {
    let content_type = payload.content_type();
    let body = payload.into_body()?;
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionEngine;
    use crate::config::RenderConfigBuilder;
    use crate::driver::mock::{MockBrowserLauncher, PrintBehavior, sample_pdf};
    use crate::render::Renderer;
    use crate::service::PdfService;
    use axum::body::Body;
    use axum::http::Request;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    fn app(launcher: &MockBrowserLauncher, root: &Path) -> Router {
        let config = RenderConfigBuilder::new()
            .ready_poll_interval(Duration::from_millis(5))
            .temp_root(root)
            .build()
            .unwrap();
        let service = PdfService::new(
            Renderer::new(Arc::new(launcher.clone()), config),
            CompressionEngine::lopdf(),
        );
        router(service.into_shared())
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    fn render_request(uri: &str, json: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_render_returns_pdf_bytes() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&MockBrowserLauncher::new(), root.path())
            .oneshot(render_request("/pdf/render", r#"{"html":"<p>hi</p>"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
        assert!(body_bytes(response).await.starts_with(b"%PDF-"));
    }

    #[tokio::test]
    async fn test_render_base64_envelope() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&MockBrowserLauncher::new(), root.path())
            .oneshot(render_request(
                "/pdf/render?format=base64",
                r#"{"html":"<p>hi</p>"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["success"], true);
        assert!(json["data"].as_str().unwrap().starts_with("JVBERi0"));
    }

    #[tokio::test]
    async fn test_render_failure_is_500_json() {
        let root = tempfile::tempdir().unwrap();
        let launcher = MockBrowserLauncher::new().print(PrintBehavior::Error("crashed".into()));
        let response = app(&launcher, root.path())
            .oneshot(render_request("/pdf/render", r#"{"html":"<p>hi</p>"}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(!body.success);
        assert_eq!(body.code, "RENDER_FAILED");
    }

    #[tokio::test]
    async fn test_missing_source_is_400() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&MockBrowserLauncher::new(), root.path())
            .oneshot(render_request("/pdf/render", "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_json_is_400() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&MockBrowserLauncher::new(), root.path())
            .oneshot(render_request("/pdf/render", "{not json"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body.code, "INVALID_REQUEST");
    }

    #[tokio::test]
    async fn test_compress_endpoint() {
        let root = tempfile::tempdir().unwrap();
        let pdf = sample_pdf().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/pdf/compress?level=0")
            .header(header::CONTENT_TYPE, "application/pdf")
            .body(Body::from(pdf.clone()))
            .unwrap();

        let response = app(&MockBrowserLauncher::new(), root.path())
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, pdf);
    }

    #[tokio::test]
    async fn test_compress_bad_level_is_400() {
        let root = tempfile::tempdir().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/pdf/compress?level=11")
            .body(Body::from(sample_pdf().unwrap()))
            .unwrap();

        let response = app(&MockBrowserLauncher::new(), root.path())
            .oneshot(request)
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let root = tempfile::tempdir().unwrap();
        let response = app(&MockBrowserLauncher::new(), root.path())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(health.status, "healthy");
    }
}
