//! Human Resources addon: employees and departments.
//!
//! The directory is both an addon package (`manifest.toml`, `models/`,
//! `routes/`, `api-routes.rs`) and the crate that links the addon into the
//! server through [`addon_source`] and [`route_sources`].

use std::sync::Arc;

use async_trait::async_trait;
use erp_addon::catalog::{AddonSource, ModuleRouteSources, RouteSource};
use erp_addon::client::ModuleExports;
use erp_addon::{AddonError, ModuleManifest};

#[path = "api-routes.rs"]
mod api_routes;
mod routes;

pub const NAME: &str = "hr";

const MANIFEST: &str = include_str!("manifest.toml");

pub const EMPLOYEE_TABLE: &str = "hr_employee";
pub const DEPARTMENT_TABLE: &str = "hr_department";

/// Parsed manifest of this addon.
pub fn manifest() -> Result<ModuleManifest, AddonError> {
    Ok(ModuleManifest::from_toml_str(MANIFEST)?.with_identity(NAME))
}

/// Descriptor of a client view. Rendering belongs to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewDescriptor {
    pub title: &'static str,
    pub endpoint: &'static str,
}

pub struct HrAddon;

#[async_trait]
impl AddonSource for HrAddon {
    fn name(&self) -> &str {
        NAME
    }

    async fn load(&self) -> Result<ModuleExports, AddonError> {
        let exports = ModuleExports::from_manifest(manifest()?)
            .with_component(
                "EmployeeList",
                Arc::new(ViewDescriptor {
                    title: "Employees",
                    endpoint: "/api/hr/employees",
                }),
            )
            .with_component(
                "DepartmentList",
                Arc::new(ViewDescriptor {
                    title: "Departments",
                    endpoint: "/api/hr/departments",
                }),
            )
            .with_initialize(|| tracing::debug!(module = NAME, "hr addon initialized"))
            .with_cleanup(|| tracing::debug!(module = NAME, "hr addon cleaned up"));
        Ok(exports)
    }
}

pub fn addon_source() -> Arc<dyn AddonSource> {
    Arc::new(HrAddon)
}

/// Server route sources, in the order the files are mounted.
pub fn route_sources() -> ModuleRouteSources {
    ModuleRouteSources {
        routes: vec![
            RouteSource {
                file: "routes/departments.rs",
                export: routes::departments::export,
            },
            RouteSource {
                file: "routes/employees.rs",
                export: routes::employees::export,
            },
        ],
        api_routes: Some(RouteSource {
            file: "api-routes.rs",
            export: api_routes::export,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_parses() {
        let m = manifest().unwrap();
        assert_eq!(m.name, "hr");
        assert!(m.auto_install);
        assert_eq!(m.routes.len(), 2);
        assert_eq!(m.menus.len(), 3);
    }

    #[tokio::test]
    async fn test_every_route_component_is_exported() {
        let exports = HrAddon.load().await.unwrap();
        let addon = erp_addon::client::Addon::try_from(exports).unwrap();
        assert!(addon.unresolved_components().is_empty());
        let view = addon.resolve_component("EmployeeList").unwrap();
        assert_eq!(
            view.downcast_ref::<ViewDescriptor>().unwrap().endpoint,
            "/api/hr/employees"
        );
    }

    #[test]
    fn test_route_sources() {
        let sources = route_sources();
        assert_eq!(sources.routes.len(), 2);
        assert!(sources.api_routes.is_some());
    }
}
