use std::sync::Arc;

use redis::Client as RedisClient;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use indivio_admin::{
    build_router,
    config::Config,
    db,
    error::StartupError,
    services::assets::LocalBlobStore,
    store::postgres::{spawn_change_relay, PgDocumentStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let result = run().await;
    if let Err(e) = &result {
        error!("Startup failed: {}", e);
    }
    result
}

async fn run() -> Result<(), StartupError> {
    let config = Arc::new(Config::from_env().map_err(StartupError::Config)?);

    let pool = db::create_pool(&config.database_url)
        .await
        .map_err(StartupError::Store)?;
    db::run_migrations(&pool).await.map_err(StartupError::Store)?;
    info!("Database connected and migrations applied");

    let redis_client = RedisClient::open(config.redis_url.as_str())?;
    let redis_conn = redis_client.get_multiplexed_async_connection().await?;
    info!("Redis connected");

    let store = PgDocumentStore::with_redis(pool, redis_conn.clone());
    spawn_change_relay(redis_client, store.event_sender());

    let blobs = LocalBlobStore::new(&config.media_dir, format!("{}/assets", config.api_base_url()));
    blobs.ensure_root().await.map_err(StartupError::Blobs)?;

    let state = AppState::new(config.clone(), Arc::new(store), Arc::new(blobs), redis_conn);
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| StartupError::Listen {
            addr: addr.clone(),
            source,
        })?;
    info!("Indivio admin API listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|source| StartupError::Listen { addr, source })?;
    Ok(())
}
