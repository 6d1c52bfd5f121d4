//! Client-facing addon registry.
//!
//! At startup the [`AddonLoader`] asks for the persisted module states,
//! loads the listed modules from the [`AddonCatalog`](crate::catalog::AddonCatalog),
//! keeps the active ones and registers them into the [`AddonManager`]. The
//! host then reads the aggregated routes and menus from the manager.

mod addon;
mod discovery;
mod loader;
mod manager;
pub mod menu;

pub use addon::{Addon, Component, LifecycleHook, ModuleExports, RouteFragment};
pub use discovery::discover;
pub use loader::{
    AddonLoader, HttpStateSource, LoadReport, LoaderConfig, ModuleState, ModuleStateSource,
};
pub use manager::{AddonManager, ClientView};
pub use menu::{build_menu_tree, MenuNode};
