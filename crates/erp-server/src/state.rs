use std::sync::Arc;

use async_trait::async_trait;
use erp_addon::catalog::{AddonCatalog, RouteCatalog};
use erp_addon::client::{
    AddonManager, HttpStateSource, LoaderConfig, ModuleState, ModuleStateSource,
};
use erp_addon::{AddonError, ModuleLifecycle, RouteManager};
use erp_db::entities::module;
use sea_orm::{DatabaseConnection, EntityTrait};

use crate::config::ServerConfig;

/// Shared application state.
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: ServerConfig,
    pub lifecycle: ModuleLifecycle,
    pub routes: Arc<RouteManager>,
    pub addons: Arc<AddonManager>,
}

/// Every addon linked into this binary.
pub fn addon_catalog() -> AddonCatalog {
    AddonCatalog::new().with_source(erp_addon_hr::addon_source())
}

pub fn route_catalog() -> RouteCatalog {
    RouteCatalog::new().with_module(erp_addon_hr::NAME, erp_addon_hr::route_sources())
}

/// Module states read straight from the `modules` table.
pub struct DbStateSource {
    db: DatabaseConnection,
}

impl DbStateSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ModuleStateSource for DbStateSource {
    async fn fetch_states(&self) -> Result<Vec<ModuleState>, AddonError> {
        let rows = module::Entity::find().all(&self.db).await?;
        Ok(rows.iter().map(ModuleState::from).collect())
    }
}

/// State source for the addon loader: the module API at `remote` when
/// configured (a shell host in front of another server), otherwise the
/// local database.
pub fn state_source(
    db: DatabaseConnection,
    remote: Option<LoaderConfig>,
) -> Arc<dyn ModuleStateSource> {
    let Some(config) = remote else {
        return Arc::new(DbStateSource::new(db));
    };
    let api_url = config.api_url.clone();
    match HttpStateSource::new(config) {
        Ok(source) => {
            tracing::info!(api_url = %api_url, "reading module states over HTTP");
            Arc::new(source)
        }
        Err(e) => {
            tracing::warn!("cannot build HTTP state source, using the database: {e}");
            Arc::new(DbStateSource::new(db))
        }
    }
}
