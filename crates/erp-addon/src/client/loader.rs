use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::AddonCatalog;
use crate::client::{discover, AddonManager};
use crate::error::AddonError;
use crate::registry;

/// Persisted state of one module, as the loader needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub installed: bool,
}

impl From<&erp_db::entities::module::Model> for ModuleState {
    fn from(row: &erp_db::entities::module::Model) -> Self {
        Self {
            name: row.name.clone(),
            active: row.active,
            installed: row.installed,
        }
    }
}

/// Where the loader reads persisted module states from.
#[async_trait]
pub trait ModuleStateSource: Send + Sync {
    async fn fetch_states(&self) -> Result<Vec<ModuleState>, AddonError>;
}

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Base URL of the ERP server, without the `/api` suffix.
    pub api_url: String,
    pub admin_token: Option<String>,
    pub timeout_secs: u64,
}

impl LoaderConfig {
    /// Remote state source settings, present only when `ERP_API_URL` is set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_url = get("ERP_API_URL").filter(|u| !u.trim().is_empty())?;
        Some(Self {
            api_url,
            admin_token: get("ERP_ADMIN_TOKEN").filter(|t| !t.is_empty()),
            timeout_secs: get("ERP_API_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        })
    }
}

/// Reads module states from `GET {api_url}/api/modules`.
pub struct HttpStateSource {
    http: reqwest::Client,
    config: LoaderConfig,
}

impl HttpStateSource {
    pub fn new(config: LoaderConfig) -> Result<Self, AddonError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl ModuleStateSource for HttpStateSource {
    async fn fetch_states(&self) -> Result<Vec<ModuleState>, AddonError> {
        let url = format!("{}/api/modules", self.config.api_url.trim_end_matches('/'));
        let mut req = self.http.get(&url);
        if let Some(token) = &self.config.admin_token {
            req = req.bearer_auth(token);
        }
        let states = req
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<ModuleState>>()
            .await?;
        Ok(states)
    }
}

/// Outcome of a load pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub registered: Vec<String>,
    pub inactive: Vec<String>,
    /// Persisted as active but not registered (unavailable or broken).
    pub missing_active: Vec<String>,
    /// Whether persisted states could be fetched.
    pub states_fetched: bool,
}

/// One-shot startup loader: persisted states + catalog → [`AddonManager`].
pub struct AddonLoader {
    catalog: Arc<AddonCatalog>,
    states: Arc<dyn ModuleStateSource>,
    names: Vec<String>,
}

impl AddonLoader {
    /// Loader over every module in the catalog.
    pub fn new(catalog: Arc<AddonCatalog>, states: Arc<dyn ModuleStateSource>) -> Self {
        let names = catalog.names();
        Self {
            catalog,
            states,
            names,
        }
    }

    /// Restrict loading to the names in `<addons_root>/.registry.json`, when
    /// that file exists.
    pub async fn with_registry(mut self, addons_root: &Path) -> Self {
        match registry::read_registry(addons_root).await {
            Some(names) => self.names = names,
            None => tracing::warn!(
                root = %addons_root.display(),
                "no addon registry found, loading every catalog module"
            ),
        }
        self
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub async fn load(&self, manager: &AddonManager) -> LoadReport {
        let mut report = LoadReport::default();

        let states: HashMap<String, ModuleState> = match self.states.fetch_states().await {
            Ok(states) => {
                report.states_fetched = true;
                states.into_iter().map(|s| (s.name.clone(), s)).collect()
            }
            Err(e) => {
                tracing::warn!("could not fetch module states, treating every module as active: {e}");
                HashMap::new()
            }
        };

        let addons = discover(&self.catalog, &self.names).await;

        for addon in addons {
            let name = addon.name().to_string();
            let active = states.get(&name).map(|s| s.active).unwrap_or(true);
            if !active {
                tracing::debug!(module = %name, "module inactive, not registering");
                report.inactive.push(name);
                continue;
            }
            manager.register_addon(addon);
            report.registered.push(name);
        }

        let mut missing: Vec<String> = states
            .values()
            .filter(|s| s.active && !report.registered.contains(&s.name))
            .map(|s| s.name.clone())
            .collect();
        missing.sort();
        for name in &missing {
            tracing::warn!(module = %name, "module is active in the database but was not loaded");
        }
        report.missing_active = missing;

        manager.set_ready(true);
        tracing::info!(
            registered = report.registered.len(),
            inactive = report.inactive.len(),
            "addon loading complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AddonSource;
    use crate::client::ModuleExports;
    use crate::manifest::ModuleManifest;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Plain(&'static str);

    #[async_trait]
    impl AddonSource for Plain {
        fn name(&self) -> &str {
            self.0
        }

        async fn load(&self) -> Result<ModuleExports, AddonError> {
            let manifest = ModuleManifest::from_toml_str("")?.with_identity(self.0);
            Ok(ModuleExports::from_manifest(manifest))
        }
    }

    struct FixedStates(Result<Vec<ModuleState>, ()>);

    #[async_trait]
    impl ModuleStateSource for FixedStates {
        async fn fetch_states(&self) -> Result<Vec<ModuleState>, AddonError> {
            self.0
                .clone()
                .map_err(|_| AddonError::Load("state endpoint unreachable".into()))
        }
    }

    fn state(name: &str, active: bool) -> ModuleState {
        ModuleState {
            name: name.into(),
            active,
            installed: true,
        }
    }

    fn catalog() -> Arc<AddonCatalog> {
        Arc::new(
            AddonCatalog::new()
                .with_source(Arc::new(Plain("hr")))
                .with_source(Arc::new(Plain("sales")))
                .with_source(Arc::new(Plain("inventory"))),
        )
    }

    #[tokio::test]
    async fn test_activation_filter() {
        let states = FixedStates(Ok(vec![
            state("hr", true),
            state("sales", false),
            state("finance", true),
        ]));
        let loader = AddonLoader::new(catalog(), Arc::new(states));
        let manager = AddonManager::new();

        let report = loader.load(&manager).await;

        // inventory has no row and is active by default.
        assert_eq!(report.registered, vec!["hr", "inventory"]);
        assert_eq!(report.inactive, vec!["sales"]);
        assert_eq!(report.missing_active, vec!["finance"]);
        assert!(manager.get_addon("sales").is_none());
        assert!(manager.is_ready());
    }

    #[tokio::test]
    async fn test_state_failure_is_fail_open() {
        let loader = AddonLoader::new(catalog(), Arc::new(FixedStates(Err(()))));
        let manager = AddonManager::new();

        let report = loader.load(&manager).await;
        assert!(!report.states_fetched);
        assert_eq!(report.registered.len(), 3);
    }

    #[tokio::test]
    async fn test_registry_limits_names() {
        let tmp = tempfile::tempdir().unwrap();
        crate::test_support::write_addon(tmp.path(), "hr", "");
        registry::generate_registry(tmp.path()).await.unwrap();

        let loader = AddonLoader::new(catalog(), Arc::new(FixedStates(Ok(vec![]))))
            .with_registry(tmp.path())
            .await;
        assert_eq!(loader.names(), ["hr".to_string()]);
    }

    #[test]
    fn test_loader_config_requires_api_url() {
        assert!(LoaderConfig::from_lookup(|_| None).is_none());

        let config = LoaderConfig::from_lookup(|key| match key {
            "ERP_API_URL" => Some("http://erp.internal:8080".into()),
            "ERP_API_TIMEOUT" => Some("3".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.api_url, "http://erp.internal:8080");
        assert_eq!(config.timeout_secs, 3);
        assert!(config.admin_token.is_none());
    }

    #[tokio::test]
    async fn test_http_state_source() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/modules"))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "hr", "active": true, "installed": true, "displayName": "HR"},
                {"name": "sales", "active": false}
            ])))
            .mount(&server)
            .await;

        let source = HttpStateSource::new(LoaderConfig {
            api_url: server.uri(),
            admin_token: Some("secret".into()),
            timeout_secs: 5,
        })
        .unwrap();

        let states = source.fetch_states().await.unwrap();
        assert_eq!(states.len(), 2);
        assert!(states[0].active);
        assert!(!states[1].installed);
    }

    #[tokio::test]
    async fn test_http_state_source_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/modules"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let source = HttpStateSource::new(LoaderConfig {
            api_url: server.uri(),
            admin_token: None,
            timeout_secs: 5,
        })
        .unwrap();

        let err = source.fetch_states().await.unwrap_err();
        assert!(matches!(err, AddonError::Http(_)));
    }
}
