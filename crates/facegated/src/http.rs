use crate::engine::{EngineHandle, Verdict};
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use futures::StreamExt;
use serde::Serialize;
use thiserror::Error;

/// Shared state handed to every request handler.
pub struct AppState {
    pub engine: EngineHandle,
    pub max_upload_bytes: usize,
}

/// Errors surfaced to HTTP callers. Everything internal is collapsed
/// into [`ApiError::Internal`]; the cause is logged server-side only.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("image is empty")]
    EmptyImage,
    #[error("malformed upload")]
    BadUpload,
    #[error("upload exceeds the size limit")]
    TooLarge,
    #[error("internal server error, try again")]
    Internal,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::EmptyImage | ApiError::BadUpload => StatusCode::BAD_REQUEST,
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({ "detail": self.to_string() }))
    }
}

#[derive(Debug, Serialize)]
struct VerifyResponse {
    access: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_distance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    threshold: Option<f32>,
    reason: &'static str,
}

impl VerifyResponse {
    /// Denial without a comparison (no face, nothing enrolled).
    fn denied(reason: &'static str) -> Self {
        Self {
            access: "denied",
            min_distance: None,
            threshold: None,
            reason,
        }
    }

    fn compared(granted: bool, min_distance: f32, threshold: f32) -> Self {
        Self {
            access: if granted { "granted" } else { "denied" },
            min_distance: Some(min_distance),
            threshold: Some(threshold),
            reason: if granted {
                "match found"
            } else {
                "match distance too high"
            },
        }
    }
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/verify-face").route(web::post().to(verify_face)));
}

/// Verify an uploaded face against the enrolled gallery.
async fn verify_face(
    state: web::Data<AppState>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let bytes = read_upload(payload, state.max_upload_bytes).await?;
    if bytes.is_empty() {
        return Err(ApiError::EmptyImage);
    }

    let verdict = state.engine.verify(bytes).await.map_err(|err| {
        tracing::error!(error = %err, "verification failed");
        ApiError::Internal
    })?;

    let response = match verdict {
        Verdict::NoFace => VerifyResponse::denied("no face detected"),
        Verdict::NoEnrolledFaces => VerifyResponse::denied("no authorized faces to compare"),
        Verdict::Compared {
            granted,
            min_distance,
            threshold,
        } => VerifyResponse::compared(granted, min_distance, threshold),
    };

    Ok(HttpResponse::Ok().json(response))
}

/// Collect the first file field of the multipart body, capped at
/// `limit` bytes. A body without any file field reads as empty, which
/// callers treat the same as a zero-byte upload.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|err| {
            tracing::debug!(error = %err, "malformed multipart payload");
            ApiError::BadUpload
        })?;

        let is_file = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .is_some();
        if !is_file {
            // Drain the field so the stream can advance to the next one.
            while let Some(chunk) = field.next().await {
                chunk.map_err(|_| ApiError::BadUpload)?;
            }
            continue;
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|err| {
                tracing::debug!(error = %err, "multipart read failed");
                ApiError::BadUpload
            })?;
            if bytes.len() + chunk.len() > limit {
                return Err(ApiError::TooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        return Ok(bytes);
    }

    Ok(Vec::new())
}
