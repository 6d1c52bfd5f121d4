//! Compile-time module tables.
//!
//! Addons are linked into the binary, so "loading" one means looking it up
//! here by name. The [`AddonCatalog`] holds each module's client entry
//! point, the [`RouteCatalog`] its server route sources. Which catalog
//! entries are actually used is decided at runtime by the addon directory
//! scan and the persisted module state.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::ModuleExports;
use crate::error::AddonError;
use crate::routes::RouteExport;

/// Client entry point of an addon.
#[async_trait]
pub trait AddonSource: Send + Sync {
    fn name(&self) -> &str;

    /// Produce a fresh set of exports.
    async fn load(&self) -> Result<ModuleExports, AddonError>;
}

/// Name → client entry point, in registration order.
#[derive(Clone, Default)]
pub struct AddonCatalog {
    sources: Vec<Arc<dyn AddonSource>>,
}

impl AddonCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a source. A later source with the same name replaces the earlier.
    pub fn with_source(mut self, source: Arc<dyn AddonSource>) -> Self {
        self.sources.retain(|s| s.name() != source.name());
        self.sources.push(source);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AddonSource>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// One server route source: the file it stands for and a constructor for
/// its export. The constructor runs on every (re)load.
#[derive(Clone, Copy)]
pub struct RouteSource {
    pub file: &'static str,
    pub export: fn() -> RouteExport,
}

/// Route sources of one module: files of its `routes/` directory, tried
/// first, then its single `api-routes` file.
#[derive(Clone, Default)]
pub struct ModuleRouteSources {
    pub routes: Vec<RouteSource>,
    pub api_routes: Option<RouteSource>,
}

impl ModuleRouteSources {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.api_routes.is_none()
    }
}

#[derive(Clone, Default)]
pub struct RouteCatalog {
    modules: HashMap<String, ModuleRouteSources>,
}

impl RouteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: &str, sources: ModuleRouteSources) -> Self {
        self.modules.insert(name.to_string(), sources);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRouteSources> {
        self.modules.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl AddonSource for Named {
        fn name(&self) -> &str {
            self.0
        }

        async fn load(&self) -> Result<ModuleExports, AddonError> {
            Err(AddonError::Load(self.1.into()))
        }
    }

    #[tokio::test]
    async fn test_later_source_replaces_earlier() {
        let catalog = AddonCatalog::new()
            .with_source(Arc::new(Named("hr", "first")))
            .with_source(Arc::new(Named("sales", "sales")))
            .with_source(Arc::new(Named("hr", "second")));

        assert_eq!(catalog.names(), vec!["sales", "hr"]);
        let err = catalog.get("hr").unwrap().load().await.err().unwrap();
        assert!(err.to_string().contains("second"));
        assert!(catalog.get("finance").is_none());
    }
}
