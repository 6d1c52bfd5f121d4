use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::AddonError;
use crate::manifest::{MenuEntry, ModuleManifest, RouteDecl};

/// Lifecycle hook run on registration (`initialize`) or teardown (`cleanup`).
pub type LifecycleHook = Arc<dyn Fn() + Send + Sync>;

/// A renderable component exported by an addon. The host decides what it
/// is; the addon system only stores and hands it back.
pub type Component = Arc<dyn Any + Send + Sync>;

/// The route fragment an addon contributes to the host. Never inspected by
/// the manager, only aggregated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RouteFragment(pub Vec<RouteDecl>);

impl From<Vec<RouteDecl>> for RouteFragment {
    fn from(routes: Vec<RouteDecl>) -> Self {
        Self(routes)
    }
}

/// What an addon's entry point exports. `manifest` and `routes` are
/// required for the addon to be usable.
#[derive(Default)]
pub struct ModuleExports {
    pub manifest: Option<ModuleManifest>,
    pub routes: Option<RouteFragment>,
    pub initialize: Option<LifecycleHook>,
    pub cleanup: Option<LifecycleHook>,
    pub components: Option<HashMap<String, Component>>,
}

impl ModuleExports {
    /// Exports with the manifest's declared routes as the route fragment.
    pub fn from_manifest(manifest: ModuleManifest) -> Self {
        let routes = RouteFragment(manifest.routes.clone());
        Self {
            manifest: Some(manifest),
            routes: Some(routes),
            ..Default::default()
        }
    }

    pub fn with_initialize(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.initialize = Some(Arc::new(hook));
        self
    }

    pub fn with_cleanup(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.cleanup = Some(Arc::new(hook));
        self
    }

    pub fn with_component(mut self, name: &str, component: Component) -> Self {
        self.components
            .get_or_insert_with(HashMap::new)
            .insert(name.to_string(), component);
        self
    }
}

/// A loaded client addon.
#[derive(Clone)]
pub struct Addon {
    pub manifest: ModuleManifest,
    pub routes: RouteFragment,
    pub initialize: Option<LifecycleHook>,
    pub cleanup: Option<LifecycleHook>,
    pub components: HashMap<String, Component>,
}

impl Addon {
    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn menus(&self) -> &[MenuEntry] {
        &self.manifest.menus
    }

    /// Look up a component referenced by a route.
    pub fn resolve_component(&self, name: &str) -> Result<&Component, AddonError> {
        self.components.get(name).ok_or_else(|| {
            AddonError::Load(format!(
                "addon '{}' has no component named '{name}'",
                self.name()
            ))
        })
    }

    /// Components named by the route fragment that the addon does not export.
    pub fn unresolved_components(&self) -> Vec<&str> {
        self.routes
            .0
            .iter()
            .map(|r| r.component.as_str())
            .filter(|c| !self.components.contains_key(*c))
            .collect()
    }
}

impl TryFrom<ModuleExports> for Addon {
    type Error = AddonError;

    fn try_from(exports: ModuleExports) -> Result<Self, Self::Error> {
        let manifest = exports
            .manifest
            .ok_or_else(|| AddonError::Load("exports have no manifest".into()))?;
        let routes = exports
            .routes
            .ok_or_else(|| AddonError::Load(format!("addon '{}' exports no routes", manifest.name)))?;
        Ok(Self {
            manifest,
            routes,
            initialize: exports.initialize,
            cleanup: exports.cleanup,
            components: exports.components.unwrap_or_default(),
        })
    }
}

impl fmt::Debug for Addon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut components: Vec<&String> = self.components.keys().collect();
        components.sort();
        f.debug_struct("Addon")
            .field("name", &self.manifest.name)
            .field("version", &self.manifest.version)
            .field("routes", &self.routes.0.len())
            .field("initialize", &self.initialize.is_some())
            .field("cleanup", &self.cleanup.is_some())
            .field("components", &components)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> ModuleManifest {
        ModuleManifest::from_toml_str(
            r#"
[[routes]]
path = "/hr/employees"
component = "EmployeeList"

[[routes]]
path = "/hr/departments"
component = "DepartmentList"
"#,
        )
        .unwrap()
        .with_identity("hr")
    }

    #[test]
    fn test_exports_without_routes_are_rejected() {
        let exports = ModuleExports {
            manifest: Some(manifest()),
            ..Default::default()
        };
        let err = Addon::try_from(exports).unwrap_err();
        assert!(err.to_string().contains("no routes"));
    }

    #[test]
    fn test_exports_without_manifest_are_rejected() {
        let exports = ModuleExports {
            routes: Some(RouteFragment::default()),
            ..Default::default()
        };
        assert!(Addon::try_from(exports).is_err());
    }

    #[test]
    fn test_component_resolution_is_lazy() {
        let exports = ModuleExports::from_manifest(manifest())
            .with_component("EmployeeList", Arc::new("employee list view"));
        let addon = Addon::try_from(exports).unwrap();

        let component = addon.resolve_component("EmployeeList").unwrap();
        assert_eq!(component.downcast_ref::<&str>(), Some(&"employee list view"));

        assert!(addon.resolve_component("DepartmentList").is_err());
        assert_eq!(addon.unresolved_components(), vec!["DepartmentList"]);
    }
}
