use actix_web::{get, put, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::{ApiResponse, AuthenticatedUser};
use crate::models::DmPrivacy;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct DmPrivacySettings {
    pub dm_privacy: DmPrivacy,
}

#[get("/settings/dm-privacy")]
pub async fn get_dm_privacy(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let dm_privacy = state.relationships.dm_privacy(user.id()).await?;
    Ok(ApiResponse::ok(DmPrivacySettings { dm_privacy }))
}

#[put("/settings/dm-privacy")]
pub async fn update_dm_privacy(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<DmPrivacySettings>,
) -> Result<HttpResponse, AppError> {
    let dm_privacy = state
        .relationships
        .set_dm_privacy(user.id(), body.dm_privacy)
        .await?;
    Ok(ApiResponse::ok(DmPrivacySettings { dm_privacy }))
}
