use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use dm_service::{
    audit::TracingAuditSink,
    clock::{Clock, SystemClock},
    config::Config,
    db::{self, Repositories},
    logging,
    notifications::{NoopNotificationSink, NotificationSink, RedisNotificationSink},
    routes,
    state::{AppState, Collaborators},
    storage::S3ObjectStorage,
};
use rate_limiter::{EdgeLimiter, PersistentLimiter, PgCounterStore, RateLimitRule};
use std::sync::Arc;
use std::time::Duration;

const EDGE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const COUNTER_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();
    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(?config, "Starting DM service");

    let pool = db::init_pool(&config.database_url, config.database_max_connections)
        .await
        .context("connecting to database")?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let counter_store = PgCounterStore::new(pool.clone());
    let edge_limiter = Arc::new(EdgeLimiter::new());

    let notifications: Arc<dyn NotificationSink> = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str()).context("parsing REDIS_URL")?;
            Arc::new(RedisNotificationSink::new(client))
        }
        None => {
            tracing::warn!("REDIS_URL not set, notifications disabled");
            Arc::new(NoopNotificationSink)
        }
    };

    let storage = S3ObjectStorage::from_config(&config.s3).await;

    // Edge counters are process-local; drop windows that can no longer matter.
    {
        let edge = edge_limiter.clone();
        let clock = clock.clone();
        let window_ms = config.limits.edge_rule().window_ms;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(EDGE_SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                let removed = edge.sweep(window_ms, clock.now_ms());
                tracing::debug!(removed, "Edge limiter swept");
            }
        });
    }
    {
        let store = counter_store.clone();
        let clock = clock.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(COUNTER_PURGE_INTERVAL);
            loop {
                ticker.tick().await;
                let cutoff = clock.now_ms() - 2 * RateLimitRule::DAY_MS;
                match store.purge_before(cutoff).await {
                    Ok(purged) => tracing::debug!(purged, "Stale rate limit counters purged"),
                    Err(e) => tracing::warn!(error = %e, "Rate limit counter purge failed"),
                }
            }
        });
    }

    let port = config.port;
    let state = AppState::new(
        config,
        Collaborators {
            repos: Repositories::postgres(pool),
            persistent_limiter: Arc::new(PersistentLimiter::new(counter_store)),
            edge_limiter,
            storage: Arc::new(storage),
            notifications,
            audit: Arc::new(TracingAuditSink),
            clock,
        },
    );

    let bind_addr = format!("0.0.0.0:{port}");
    tracing::info!(%bind_addr, "DM service listening");

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(state.edge_rate_limit())
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure_routes)
    })
    .bind(&bind_addr)
    .with_context(|| format!("binding {bind_addr}"))?
    .run()
    .await
    .context("running http server")?;

    Ok(())
}
