//! Bearer-token session resolution and the `AuthenticatedUser` extractor.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::UserProfile;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // user id
    pub exp: usize,
}

/// Maps a bearer token to a user id.
pub trait SessionResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Uuid>;
}

pub struct JwtSessionResolver {
    key: DecodingKey,
    validation: Validation,
}

impl JwtSessionResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl SessionResolver for JwtSessionResolver {
    fn resolve(&self, token: &str) -> Option<Uuid> {
        match decode::<Claims>(token, &self.key, &self.validation) {
            Ok(data) => Uuid::parse_str(&data.claims.sub).ok(),
            Err(e) => {
                tracing::debug!(error = %e, "Rejected bearer token");
                None
            }
        }
    }
}

pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Caller with a fresh profile snapshot. Rejects with 401 when the token is missing,
/// invalid or names an unknown user, and 403 when the account is not active.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub profile: UserProfile,
}

impl AuthenticatedUser {
    pub fn id(&self) -> Uuid {
        self.profile.id
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let state = req.app_data::<web::Data<AppState>>().cloned();
        let user_id = state
            .as_ref()
            .zip(bearer_token(req))
            .and_then(|(state, token)| state.sessions.resolve(token));

        Box::pin(async move {
            let state = state.ok_or(AppError::Internal)?;
            let user_id = user_id.ok_or(AppError::Unauthorized)?;
            let profile = state
                .repos
                .users
                .get_profile(user_id)
                .await?
                .ok_or(AppError::Unauthorized)?;
            if !profile.account_status.is_active() {
                return Err(AppError::Forbidden("account is not active".into()));
            }
            Ok(AuthenticatedUser { profile })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-test-secret-unit-test-secret!!";

    fn token(sub: &str, secret: &str) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn resolves_valid_subject() {
        let id = Uuid::new_v4();
        let resolver = JwtSessionResolver::new(SECRET);
        assert_eq!(resolver.resolve(&token(&id.to_string(), SECRET)), Some(id));
    }

    #[test]
    fn rejects_wrong_secret_and_bad_subject() {
        let resolver = JwtSessionResolver::new(SECRET);
        let forged = token(&Uuid::new_v4().to_string(), "another-secret-another-secret-xx");
        assert_eq!(resolver.resolve(&forged), None);
        assert_eq!(resolver.resolve(&token("not-a-uuid", SECRET)), None);
        assert_eq!(resolver.resolve("garbage"), None);
    }

    #[test]
    fn bearer_prefix_required() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req), Some("abc"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic abc"))
            .to_http_request();
        assert_eq!(bearer_token(&req), None);
    }
}
