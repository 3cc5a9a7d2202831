use dotenvy::dotenv;
use rate_limiter::RateLimitRule;
use std::env;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    /// Base for public object URLs; defaults to the virtual-hosted bucket URL.
    pub public_base_url: Option<String>,
}

impl S3Config {
    pub fn public_url(&self, path: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), path),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, path
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LimitsConfig {
    pub messages_per_minute: u32,
    pub conversations_per_day: u32,
    pub reports_per_hour: u32,
    pub edge_requests_per_minute: u32,
    pub edit_window_minutes: i64,
    pub max_attachment_bytes: usize,
    pub max_attachments_per_message: usize,
    pub max_body_chars: usize,
}

impl LimitsConfig {
    pub fn message_rule(&self) -> RateLimitRule {
        RateLimitRule::per_minute(self.messages_per_minute)
    }

    pub fn conversation_rule(&self) -> RateLimitRule {
        RateLimitRule::per_day(self.conversations_per_day)
    }

    pub fn report_rule(&self) -> RateLimitRule {
        RateLimitRule::per_hour(self.reports_per_hour)
    }

    pub fn edge_rule(&self) -> RateLimitRule {
        RateLimitRule::per_minute(self.edge_requests_per_minute)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            messages_per_minute: 20,
            conversations_per_day: 25,
            reports_per_hour: 10,
            edge_requests_per_minute: 120,
            edit_window_minutes: 15,
            max_attachment_bytes: 10 * 1024 * 1024,
            max_attachments_per_message: 10,
            max_body_chars: 4000,
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub port: u16,
    pub jwt_secret: String,
    pub s3: S3Config,
    pub limits: LimitsConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"<redacted>")
            .field("database_max_connections", &self.database_max_connections)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "<redacted>"))
            .field("port", &self.port)
            .field("jwt_secret", &"<redacted>")
            .field("s3", &self.s3)
            .field("limits", &self.limits)
            .finish()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| AppError::Config("DATABASE_URL missing".into()))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| AppError::Config("JWT_SECRET missing".into()))?;
        if jwt_secret.len() < 32 {
            return Err(AppError::Config(
                "JWT_SECRET must be at least 32 bytes".into(),
            ));
        }

        let redis_url = env::var("REDIS_URL").ok().filter(|s| !s.is_empty());

        let s3 = S3Config {
            bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "dm-attachments".to_string()),
            region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            endpoint: env::var("S3_ENDPOINT").ok(),
            public_base_url: env::var("S3_PUBLIC_BASE_URL").ok(),
        };

        let defaults = LimitsConfig::default();
        let limits = LimitsConfig {
            messages_per_minute: env_parse("MESSAGES_PER_MINUTE", defaults.messages_per_minute),
            conversations_per_day: env_parse(
                "CONVERSATIONS_PER_DAY",
                defaults.conversations_per_day,
            ),
            reports_per_hour: env_parse("REPORTS_PER_HOUR", defaults.reports_per_hour),
            edge_requests_per_minute: env_parse(
                "EDGE_REQUESTS_PER_MINUTE",
                defaults.edge_requests_per_minute,
            ),
            edit_window_minutes: env_parse("EDIT_WINDOW_MINUTES", defaults.edit_window_minutes),
            max_attachment_bytes: env_parse("MAX_ATTACHMENT_BYTES", defaults.max_attachment_bytes),
            max_attachments_per_message: defaults.max_attachments_per_message,
            max_body_chars: env_parse("MAX_BODY_CHARS", defaults.max_body_chars),
        };

        Ok(Self {
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 20),
            redis_url,
            port: env_parse("PORT", 8085),
            jwt_secret,
            s3,
            limits,
        })
    }

    /// Deterministic configuration for test harnesses; never reads the environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/dm_test".into(),
            database_max_connections: 1,
            redis_url: None,
            port: 0,
            jwt_secret: "test-secret-test-secret-test-secret!".into(),
            s3: S3Config {
                bucket: "dm-attachments".into(),
                region: "us-east-1".into(),
                endpoint: None,
                public_base_url: Some("https://cdn.test".into()),
            },
            limits: LimitsConfig::default(),
        }
    }
}
