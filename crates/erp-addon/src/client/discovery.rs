use tokio::task::JoinSet;

use crate::catalog::AddonCatalog;
use crate::client::Addon;

/// Load every module in `names` from the catalog, concurrently.
///
/// Results come back in `names` order. A name with no catalog entry, a load
/// error, exports missing `manifest` or `routes`, or a panic inside a load
/// only drops that module.
pub async fn discover(catalog: &AddonCatalog, names: &[String]) -> Vec<Addon> {
    let mut tasks = JoinSet::new();

    for (idx, name) in names.iter().enumerate() {
        let Some(source) = catalog.get(name) else {
            tracing::warn!(module = %name, "module not found in addon catalog");
            continue;
        };
        let name = name.clone();
        tasks.spawn(async move {
            let result = source.load().await;
            (idx, name, result)
        });
    }

    let mut slots: Vec<Option<Addon>> = (0..names.len()).map(|_| None).collect();

    while let Some(joined) = tasks.join_next().await {
        let (idx, name, result) = match joined {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("addon load task failed: {e}");
                continue;
            }
        };

        let exports = match result {
            Ok(exports) => exports,
            Err(e) => {
                tracing::warn!(module = %name, "failed to load addon: {e}");
                continue;
            }
        };

        match Addon::try_from(exports) {
            Ok(mut addon) => {
                if addon.manifest.name.is_empty() {
                    addon.manifest = addon.manifest.with_identity(&name);
                }
                slots[idx] = Some(addon);
            }
            Err(e) => tracing::warn!(module = %name, "invalid addon exports: {e}"),
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::catalog::AddonSource;
    use crate::client::ModuleExports;
    use crate::error::AddonError;
    use crate::manifest::ModuleManifest;

    enum Behavior {
        Ok { delay_ms: u64 },
        Fail,
        Panic,
        NoRoutes,
    }

    struct FakeSource {
        name: &'static str,
        behavior: Behavior,
    }

    #[async_trait]
    impl AddonSource for FakeSource {
        fn name(&self) -> &str {
            self.name
        }

        async fn load(&self) -> Result<ModuleExports, AddonError> {
            let manifest = ModuleManifest::from_toml_str("")?.with_identity(self.name);
            match self.behavior {
                Behavior::Ok { delay_ms } => {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(ModuleExports::from_manifest(manifest))
                }
                Behavior::Fail => Err(AddonError::Load("entry point crashed".into())),
                Behavior::Panic => panic!("addon {} blew up", self.name),
                Behavior::NoRoutes => Ok(ModuleExports {
                    manifest: Some(manifest),
                    ..Default::default()
                }),
            }
        }
    }

    fn catalog() -> AddonCatalog {
        let sources = [
            ("slow", Behavior::Ok { delay_ms: 30 }),
            ("fast", Behavior::Ok { delay_ms: 0 }),
            ("broken", Behavior::Fail),
            ("panicky", Behavior::Panic),
            ("partial", Behavior::NoRoutes),
        ];
        sources
            .into_iter()
            .fold(AddonCatalog::new(), |c, (name, behavior)| {
                c.with_source(Arc::new(FakeSource { name, behavior }))
            })
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_results_keep_list_order() {
        let addons = discover(&catalog(), &names(&["slow", "fast"])).await;
        let got: Vec<_> = addons.iter().map(|a| a.name()).collect();
        assert_eq!(got, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_failures_do_not_affect_siblings() {
        let list = names(&["broken", "slow", "panicky", "missing", "partial", "fast"]);
        let addons = discover(&catalog(), &list).await;
        let got: Vec<_> = addons.iter().map(|a| a.name()).collect();
        assert_eq!(got, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_empty_list() {
        assert!(discover(&catalog(), &[]).await.is_empty());
    }
}
