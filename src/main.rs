use chrono::Duration;
use mimalloc::MiMalloc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use wishlists::db::logical_schema;
use wishlists::{Config, Database, WishlistStore};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let cfg = Config::load()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cfg.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_level(true)
                .with_target(false),
        )
        .init();

    info!(
        database_url = %cfg.redacted_database_url(),
        loglevel = %cfg.loglevel,
        session_ttl_days = cfg.session_ttl_days
    );

    let db = Database::open(&cfg.database_url, cfg.connect_retries).await?;
    info!(engine = %db.engine(), "migrations applied");

    let live = db.introspect().await?;
    debug!(schema = %serde_json::to_string(&live)?, "live schema");

    let drift = logical_schema().diff(&live);
    if !drift.is_empty() {
        for difference in &drift {
            error!(engine = %db.engine(), "schema drift: {difference}");
        }
        return Err(format!("{} schema difference(s) found", drift.len()).into());
    }
    info!(engine = %db.engine(), "schema matches logical model");

    let ttl = Duration::days(i64::from(cfg.session_ttl_days));
    match db.purge_sessions_older_than(ttl).await {
        Ok(0) => {}
        Ok(purged) => info!(purged, "expired sessions removed"),
        Err(e) => warn!(error = %e, "failed to purge expired sessions"),
    }

    info!(
        lists = db.count_lists().await?,
        items = db.count_items().await?,
        users = db.count_users().await?,
        "database ready"
    );
    Ok(())
}
