//! Apply the database migrations to the configured Postgres store.

use anyhow::{Context, bail};

use shopdesk_infra::{PgStore, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    shopdesk_observability::init();

    let config = StoreConfig::from_env()?;
    let StoreConfig::Postgres {
        database_url,
        max_connections,
    } = config
    else {
        bail!("USE_PERSISTENT_STORES is off; nothing to migrate");
    };

    let store = PgStore::connect(&database_url, max_connections)
        .await
        .context("failed to connect to the database")?;
    store.migrate().await.context("failed to run migrations")?;

    tracing::info!("migrations applied");
    Ok(())
}
