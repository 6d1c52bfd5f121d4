//! Addon discovery, registration and routing for the ERP server.
//!
//! Addons live as directories under the addons root (`index.rs` plus a
//! `manifest.toml`), are linked into the binary through the
//! [`AddonCatalog`] and [`RouteCatalog`], and have their state persisted in
//! the `modules` table.
//!
//! - [`lifecycle::ModuleLifecycle`]: scan, install, uninstall, status toggle
//! - [`routes::RouteManager`]: per-module routers under `/api/<module>`
//! - [`client`]: client-side registry, loader and menu aggregation

pub mod catalog;
pub mod client;
pub mod dependency;
pub mod error;
pub mod lifecycle;
pub mod manifest;
pub mod registry;
pub mod routes;
pub mod schema;
pub mod validator;

#[cfg(test)]
mod test_support;

pub use catalog::{AddonCatalog, AddonSource, ModuleRouteSources, RouteCatalog, RouteSource};
pub use error::AddonError;
pub use lifecycle::{ModuleLifecycle, ScanReport, ScanSummary};
pub use manifest::{read_manifest, MenuEntry, ModuleManifest, RouteDecl};
pub use routes::{GlobalMiddleware, ModuleRouter, MountFn, RouteExport, RouteManager, RouteRegistrar};
pub use validator::is_valid_module;
