pub mod attachments;
pub mod blocks;
pub mod conversations;
pub mod health;
pub mod messages;
pub mod reports;
pub mod settings;

use actix_web::web;
use serde::Deserialize;

use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PaginationQuery {
    pub fn limit_or(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Registers every route. Literal segments come before `{id}` captures that share a prefix.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(err.to_string()).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        AppError::BadRequest(err.to_string()).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|_err, _req| AppError::NotFound.into()))
    .service(health::health)
    .service(
        web::scope("/api/v1")
            .service(conversations::unread_count)
            .service(conversations::list_conversations)
            .service(conversations::create_conversation)
            .service(conversations::get_conversation)
            .service(conversations::archive_conversation)
            .service(conversations::mark_read)
            .service(messages::list_messages)
            .service(messages::send_in_conversation)
            .service(messages::send_message)
            .service(messages::edit_message)
            .service(messages::delete_message)
            .service(attachments::upload_attachment)
            .service(blocks::list_blocks)
            .service(blocks::block_user)
            .service(blocks::unblock_user)
            .service(settings::get_dm_privacy)
            .service(settings::update_dm_privacy)
            .service(reports::list_my_reports)
            .service(reports::review_queue)
            .service(reports::submit_report)
            .service(reports::update_report_status)
            .service(reports::report_context),
    );
}
