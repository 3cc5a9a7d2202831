use actix_multipart::Multipart;
use actix_web::{post, web, HttpResponse};
use futures_util::stream::StreamExt;

use crate::error::AppError;
use crate::middleware::{ApiResponse, AuthenticatedUser};
use crate::state::AppState;

/// POST /api/v1/attachments (multipart, field `file`)
///
/// Stores the file under the caller's namespace and returns the reference to pass
/// when sending a message.
#[post("/attachments")]
pub async fn upload_attachment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let max_bytes = state.config.limits.max_attachment_bytes;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::BadRequest(format!("invalid multipart body: {e}")))?;
        if field.name() != Some("file") {
            continue;
        }

        let content_type = field
            .content_type()
            .map(|m| m.essence_str().to_owned())
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("upload interrupted: {e}")))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "attachment exceeds {max_bytes} bytes"
                )));
            }
            bytes.extend_from_slice(&chunk);
        }
        upload = Some((content_type, bytes));
        break;
    }

    let (content_type, bytes) =
        upload.ok_or_else(|| AppError::BadRequest("multipart field `file` is required".into()))?;
    let uploaded = state
        .messages
        .upload_attachment(user.id(), &content_type, bytes)
        .await?;
    Ok(ApiResponse::created(uploaded))
}
