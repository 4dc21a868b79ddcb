//! HTTP endpoint: `POST /api/convertpdf2tiff` with a multipart `file` field.
//!
//! The engine is bound once at startup. Each request runs the conversion on
//! tokio's blocking pool and opens its own document, so concurrent requests
//! share nothing mutable.

use crate::config::ConversionConfig;
use crate::convert::convert_with;
use crate::error::ConvertError;
use crate::pipeline::render::{PdfEngine, PdfiumEngine};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use tracing::{error, info, warn};

pub const CONVERT_ROUTE: &str = "/api/convertpdf2tiff";

const MISSING_FILE_MESSAGE: &str =
    "Please upload a PDF file using 'file' parameter in multipart/form-data.";

/// Upload size limit. axum's own default (2 MiB) is too small for scanned PDFs.
pub const MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

struct AppState<E: 'static> {
    engine: &'static E,
    config: ConversionConfig,
}

impl<E: 'static> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine,
            config: self.config.clone(),
        }
    }
}

/// Build the router over `engine`. Every request converts with `config`.
pub fn router<E>(engine: &'static E, config: ConversionConfig) -> Router
where
    E: PdfEngine + Send + Sync + 'static,
{
    Router::new()
        .route(CONVERT_ROUTE, post(convert_handler::<E>))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(AppState { engine, config })
}

/// Bind the shared pdfium engine and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, config: ConversionConfig) -> Result<(), ConvertError> {
    let engine = tokio::task::spawn_blocking(PdfiumEngine::shared)
        .await
        .map_err(|e| ConvertError::Internal(format!("engine init task failed: {e}")))??;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ConvertError::Internal(format!("cannot listen on {addr}: {e}")))?;
    info!("Listening on http://{}{}", addr, CONVERT_ROUTE);

    axum::serve(listener, router(engine, config))
        .await
        .map_err(|e| ConvertError::Internal(format!("server error: {e}")))
}

async fn convert_handler<E>(
    State(state): State<AppState<E>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response
where
    E: PdfEngine + Send + Sync + 'static,
{
    let pdf = match read_file_field(multipart).await {
        Some(bytes) if !bytes.is_empty() => bytes,
        _ => return (StatusCode::BAD_REQUEST, MISSING_FILE_MESSAGE).into_response(),
    };
    info!("Received {} byte upload", pdf.len());

    let AppState { engine, config } = state;
    let result = tokio::task::spawn_blocking(move || convert_with(engine, &pdf, &config))
        .await
        .map_err(|e| ConvertError::Internal(format!("Conversion task panicked: {}", e)))
        .and_then(|r| r);

    match result {
        Ok(output) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "image/tiff"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"converted.tiff\"",
                ),
            ],
            output.tiff,
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// The first field named `file`, or `None` if the body is not multipart or
/// has no such field.
async fn read_file_field(multipart: Result<Multipart, MultipartRejection>) -> Option<Vec<u8>> {
    let mut multipart = match multipart {
        Ok(m) => m,
        Err(rejection) => {
            warn!("Rejected upload: {}", rejection.body_text());
            return None;
        }
    };

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                return match field.bytes().await {
                    Ok(bytes) => Some(bytes.to_vec()),
                    Err(e) => {
                        warn!("Failed to read 'file' field: {}", e);
                        None
                    }
                };
            }
            Ok(Some(_)) => continue,
            Ok(None) => return None,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return None;
            }
        }
    }
}

fn error_response(e: &ConvertError) -> Response {
    let status = if e.is_client_error() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    if status.is_server_error() {
        error!("Conversion failed ({}): {}", e.kind(), e);
    } else {
        warn!("Conversion rejected ({}): {}", e.kind(), e);
    }
    (status, format!("Error converting PDF to TIFF: {e}")).into_response()
}
