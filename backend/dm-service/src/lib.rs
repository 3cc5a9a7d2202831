//! Direct messaging service: one-to-one conversations, message lifecycle with edit
//! windows and report locks, abuse reports, and two-tier rate limiting.

pub mod audit;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod models;
pub mod notifications;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;

pub use error::{AppError, AppResult};
pub use state::{AppState, Collaborators};
