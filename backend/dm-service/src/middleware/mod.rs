pub mod auth;
pub mod error_handling;
pub mod rate_limit;

pub use auth::{AuthenticatedUser, JwtSessionResolver, SessionResolver};
pub use error_handling::ApiResponse;
pub use rate_limit::EdgeRateLimit;
