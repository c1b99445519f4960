use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use teledex_core::assembler::MediaFetcher;
use teledex_core::catalog::{
    CatalogService, CatalogStore, CategoryStore, MemoryCatalog, MongoCatalog,
};
use teledex_core::cdn::{CdnClient, R2Cdn};
use teledex_core::config::CatalogSettings;
use teledex_core::migrator::AssetMigrator;
use teledex_core::resolver::EntityResolver;
use teledex_core::telegram::{TelegramApi, TeloxideApi};
use tracing::{error, info, warn};

use crate::server::{build_router, serve};
use crate::state::AppState;

/// Run the HTTP transport runtime.
///
/// # Errors
///
/// Returns an error if a required backend cannot be configured or the
/// listener fails.
pub async fn run_server(settings: Arc<CatalogSettings>) -> Result<()> {
    let telegram: Arc<dyn TelegramApi> = Arc::new(TeloxideApi::new(&settings));
    let resolver = EntityResolver::new(telegram);
    info!("Telegram client initialized.");

    let cdn = init_cdn(&settings).await?;
    let migrator = AssetMigrator::from_settings(cdn, &settings);

    let (records, categories) = init_catalog(&settings).await?;
    let catalog = CatalogService::new(
        records,
        categories,
        migrator,
        resolver.clone(),
        settings.catalog_author.clone(),
    );
    if catalog.check_connection().await.is_err() {
        error!("Catalog store connection check returned error.");
    }

    let state = AppState::new(MediaFetcher::new(resolver), catalog);
    let app = build_router(state, settings.body_limit_bytes);

    let addr: SocketAddr = settings
        .listen_addr()
        .parse()
        .with_context(|| format!("Invalid listen address {}", settings.listen_addr()))?;
    serve(addr, app).await.context("HTTP server failed")?;

    Ok(())
}

async fn init_cdn(settings: &CatalogSettings) -> Result<Arc<dyn CdnClient>> {
    let cdn = R2Cdn::new(settings)
        .await
        .context("Failed to initialize R2 CDN")?;
    info!("R2 CDN initialized.");
    if cdn.check_connection().await.is_err() {
        error!("R2 CDN connection check returned error.");
    }
    Ok(Arc::new(cdn))
}

async fn init_catalog(
    settings: &CatalogSettings,
) -> Result<(Arc<dyn CatalogStore>, Arc<dyn CategoryStore>)> {
    if settings.mongo_uri.is_some() {
        let store = Arc::new(
            MongoCatalog::new(settings)
                .await
                .context("Failed to initialize MongoDB catalog")?,
        );
        info!(database = %settings.mongo_database, "MongoDB catalog initialized.");
        let records: Arc<dyn CatalogStore> = store.clone();
        let categories: Arc<dyn CategoryStore> = store;
        return Ok((records, categories));
    }

    warn!("No MongoDB URI configured, records are kept in memory and lost on restart.");
    let store = Arc::new(MemoryCatalog::new());
    let records: Arc<dyn CatalogStore> = store.clone();
    let categories: Arc<dyn CategoryStore> = store;
    Ok((records, categories))
}
