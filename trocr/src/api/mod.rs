//! HTTP API for OCR inference.
//!
//! Routes:
//! - `GET /hi` - liveness probe, answers `"Hello World!"`
//! - `POST /api/trocr` - OCR over a multipart `file` upload or an
//!   `img_base64` form/query field
//!
//! The response surface is preserved byte-for-byte from the service this
//! daemon replaces, including its generic `"Invalid JSON data"` message for
//! internal failures. In the default [`HttpCompatMode::Legacy`] every
//! response carries status 200; [`HttpCompatMode::Strict`] keeps the bodies
//! but uses real status codes.
//!
//! Input validation (missing parameter, bad base64, undecodable image)
//! happens entirely here - invalid requests never reach the worker pool.

use crate::admission::AdmissionGate;
use crate::config::HttpCompatMode;
use crate::engine::{EngineError, PixelBuffer};
use crate::pool::SubmitError;
use axum::body::Body;
use axum::extract::{FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine as _;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Largest request body accepted (32 MB).
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Response body when neither `file` nor `img_base64` is present.
const MSG_MISSING_PARAM: &str = "Missing file or img_base64 parameter";

/// Response body when the image bytes cannot be decoded.
const MSG_BAD_IMAGE: &str = "Failed to load image";

/// Response body for internal failures (reference wording, preserved).
const MSG_INTERNAL: &str = "Invalid JSON data";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    gate: Arc<AdmissionGate>,
    compat_mode: HttpCompatMode,
    infer_timeout: Duration,
}

impl AppState {
    /// Creates handler state over an admission gate.
    pub fn new(
        gate: Arc<AdmissionGate>,
        compat_mode: HttpCompatMode,
        infer_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            compat_mode,
            infer_timeout,
        }
    }
}

/// Builds the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/hi", get(hi_handler))
        .route("/api/trocr", post(trocr_handler))
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

/// Request-level failures, mapped onto the preserved response surface.
#[derive(Debug)]
enum ApiError {
    /// Neither `file` nor `img_base64` was supplied.
    MissingParameter,
    /// The supplied bytes are not a decodable image (covers bad base64,
    /// matching the reference, where garbage bytes failed at decode).
    UndecodableImage,
    /// The pool refused the task (queue full or shutting down).
    Submit(SubmitError),
    /// Inference failed or timed out.
    Engine(EngineError),
}

impl ApiError {
    fn body(&self) -> &'static str {
        match self {
            Self::MissingParameter => MSG_MISSING_PARAM,
            Self::UndecodableImage => MSG_BAD_IMAGE,
            Self::Submit(_) | Self::Engine(_) => MSG_INTERNAL,
        }
    }

    fn status(&self, mode: HttpCompatMode) -> StatusCode {
        match mode {
            HttpCompatMode::Legacy => StatusCode::OK,
            HttpCompatMode::Strict => match self {
                Self::MissingParameter => StatusCode::BAD_REQUEST,
                Self::UndecodableImage => StatusCode::UNPROCESSABLE_ENTITY,
                Self::Submit(SubmitError::QueueFull { .. }) => StatusCode::SERVICE_UNAVAILABLE,
                Self::Submit(SubmitError::ShutDown) => StatusCode::SERVICE_UNAVAILABLE,
                Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

fn plain_text(status: StatusCode, content_type: &'static str, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, content_type)], body).into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// `GET /hi` - liveness probe.
async fn hi_handler() -> Response {
    plain_text(StatusCode::OK, "text/plain", "Hello World!".to_string())
}

/// `POST /api/trocr` - run OCR over the supplied image.
async fn trocr_handler(State(state): State<AppState>, req: Request) -> Response {
    let start = Instant::now();

    match handle_ocr(&state, req).await {
        Ok(text) => {
            info!(
                latency_ms = start.elapsed().as_millis() as u64,
                "OCR request served"
            );
            plain_text(StatusCode::OK, "text/plain; charset=UTF-8", text)
        }
        Err(e) => {
            match &e {
                ApiError::MissingParameter | ApiError::UndecodableImage => {
                    debug!(body = e.body(), "Rejected OCR request")
                }
                ApiError::Submit(err) => warn!(error = %err, "OCR submission refused"),
                ApiError::Engine(err) => warn!(error = %err, "OCR inference failed"),
            }
            plain_text(e.status(state.compat_mode), "text/plain", e.body().to_string())
        }
    }
}

/// Decodes the request into a grayscale buffer, submits it, and formats
/// the recognized text as `segment|segment|...`.
async fn handle_ocr(state: &AppState, req: Request) -> Result<String, ApiError> {
    let image_bytes = extract_image_bytes(req).await?;
    let buffer = decode_grayscale(&image_bytes)?;

    let pending = state.gate.submit(buffer).await.map_err(ApiError::Submit)?;
    let regions = pending
        .wait(state.infer_timeout)
        .await
        .map_err(ApiError::Engine)?;

    let mut text = String::new();
    for region in &regions {
        text.push_str(&region.text);
        text.push('|');
    }
    Ok(text)
}

/// Form/query payload carrying a base64-encoded image.
#[derive(Debug, Default, Deserialize)]
struct ImgForm {
    img_base64: Option<String>,
}

/// Pulls raw image bytes out of the request.
///
/// Multipart requests are searched for a `file` field; anything else is
/// treated as a urlencoded form (body first, then query string) carrying
/// `img_base64`.
async fn extract_image_bytes(req: Request) -> Result<Vec<u8>, ApiError> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        extract_multipart_file(req).await
    } else {
        let query_form: ImgForm = req
            .uri()
            .query()
            .and_then(|q| serde_urlencoded::from_str(q).ok())
            .unwrap_or_default();

        let body_bytes = read_body(req.into_body()).await?;
        let body_form: ImgForm = serde_urlencoded::from_bytes(&body_bytes).unwrap_or_default();

        let encoded = body_form
            .img_base64
            .or(query_form.img_base64)
            .ok_or(ApiError::MissingParameter)?;

        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| ApiError::UndecodableImage)
    }
}

/// Finds the `file` field in a multipart request.
async fn extract_multipart_file(req: Request) -> Result<Vec<u8>, ApiError> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|_| ApiError::MissingParameter)?;

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    return field
                        .bytes()
                        .await
                        .map(|b| b.to_vec())
                        .map_err(|_| ApiError::UndecodableImage);
                }
            }
            Ok(None) => return Err(ApiError::MissingParameter),
            Err(_) => return Err(ApiError::MissingParameter),
        }
    }
}

async fn read_body(body: Body) -> Result<Vec<u8>, ApiError> {
    axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map(|b| b.to_vec())
        .map_err(|_| ApiError::MissingParameter)
}

/// Decodes image bytes and converts to a single-channel buffer, mirroring
/// the reference's color-load-then-grayscale step.
fn decode_grayscale(bytes: &[u8]) -> Result<PixelBuffer, ApiError> {
    let decoded = image::load_from_memory(bytes).map_err(|_| ApiError::UndecodableImage)?;
    let gray = decoded.to_luma8();
    let (width, height) = gray.dimensions();
    Ok(PixelBuffer::grayscale(gray.into_raw(), height, width))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_grayscale_rejects_garbage() {
        assert!(matches!(
            decode_grayscale(b"definitely not an image"),
            Err(ApiError::UndecodableImage)
        ));
    }

    #[test]
    fn test_decode_grayscale_accepts_png() {
        let img = image::GrayImage::from_pixel(4, 2, image::Luma([128u8]));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();

        let buffer = decode_grayscale(&bytes).unwrap();
        assert_eq!(buffer.width, 4);
        assert_eq!(buffer.height, 2);
        assert_eq!(buffer.channels, 1);
        assert_eq!(buffer.data.len(), 8);
    }

    #[test]
    fn test_error_statuses_in_legacy_mode() {
        assert_eq!(
            ApiError::MissingParameter.status(HttpCompatMode::Legacy),
            StatusCode::OK
        );
        assert_eq!(
            ApiError::UndecodableImage.status(HttpCompatMode::Legacy),
            StatusCode::OK
        );
        assert_eq!(
            ApiError::Engine(EngineError::Unavailable).status(HttpCompatMode::Legacy),
            StatusCode::OK
        );
    }

    #[test]
    fn test_error_statuses_in_strict_mode() {
        assert_eq!(
            ApiError::MissingParameter.status(HttpCompatMode::Strict),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::UndecodableImage.status(HttpCompatMode::Strict),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError::Submit(SubmitError::QueueFull { capacity: 1 })
                .status(HttpCompatMode::Strict),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Engine(EngineError::Unavailable).status(HttpCompatMode::Strict),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
