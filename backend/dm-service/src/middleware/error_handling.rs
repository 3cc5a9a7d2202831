use crate::error::AppError;
use actix_web::http::{header, StatusCode};
use actix_web::HttpResponse;
use serde::Serialize;

/// Error envelope: `{ "success": false, "error": ..., "code": ..., "details": ... }`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Success envelope: `{ "success": true, "data": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> HttpResponse {
        HttpResponse::Ok().json(Self {
            success: true,
            data,
        })
    }

    pub fn created(data: T) -> HttpResponse {
        HttpResponse::Created().json(Self {
            success: true,
            data,
        })
    }
}

pub fn map_error(err: &AppError) -> (StatusCode, ErrorEnvelope) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let (code, details) = match err {
        AppError::BadRequest(_) => ("VALIDATION_ERROR", None),
        AppError::Unauthorized => ("UNAUTHENTICATED", None),
        AppError::Forbidden(_) => ("FORBIDDEN", None),
        AppError::NotFound => ("NOT_FOUND", None),
        AppError::Conflict(_) => ("CONFLICT", None),
        AppError::EditWindowExpired { max_edit_minutes } => (
            "EDIT_WINDOW_EXPIRED",
            Some(serde_json::json!({ "max_edit_minutes": max_edit_minutes })),
        ),
        AppError::RateLimited { retry_after_secs } => (
            "RATE_LIMITED",
            Some(serde_json::json!({ "retry_after": retry_after_secs })),
        ),
        AppError::Config(_)
        | AppError::StartServer(_)
        | AppError::Database(_)
        | AppError::Storage(_)
        | AppError::Internal => ("INTERNAL_SERVER_ERROR", None),
    };

    // Infrastructure detail stays in the logs.
    let message = if status.is_server_error() {
        tracing::error!(error = %err, "Request failed");
        "internal server error".to_string()
    } else {
        err.to_string()
    };

    (
        status,
        ErrorEnvelope {
            success: false,
            error: message,
            code,
            details,
        },
    )
}

pub fn into_response(err: &AppError) -> HttpResponse {
    let (status, envelope) = map_error(err);
    let mut builder = HttpResponse::build(status);
    if let AppError::RateLimited { retry_after_secs } = err {
        builder.insert_header((header::RETRY_AFTER, retry_after_secs.to_string()));
    }
    builder.json(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_carries_retry_after_header() {
        let resp = into_response(&AppError::RateLimited {
            retry_after_secs: 42,
        });
        assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
        let value = resp
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok());
        assert_eq!(value, Some("42"));
    }

    #[test]
    fn server_errors_hide_detail() {
        let (status, envelope) = map_error(&AppError::Storage("bucket exploded".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(envelope.error, "internal server error");
        assert!(!envelope.success);
    }

    #[test]
    fn conflict_keeps_message() {
        let (status, envelope) = map_error(&AppError::Conflict("message is under review".into()));
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(envelope.code, "CONFLICT");
        assert!(envelope.error.contains("under review"));
    }
}
