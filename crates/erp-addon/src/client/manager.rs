use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::client::{Addon, LifecycleHook, RouteFragment};
use crate::manifest::{MenuEntry, ModuleManifest, RouteDecl};

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    addons: HashMap<String, Arc<Addon>>,
    menus: Vec<MenuEntry>,
}

/// In-memory registry of the client addons currently in use.
///
/// Owned by the composition root and shared as `Arc<AddonManager>`.
#[derive(Default)]
pub struct AddonManager {
    inner: RwLock<Inner>,
    ready: AtomicBool,
}

/// Aggregated client view of every registered addon.
#[derive(Debug, Clone, Serialize)]
pub struct ClientView {
    pub addons: Vec<ModuleManifest>,
    pub routes: Vec<RouteDecl>,
    pub menus: Vec<MenuEntry>,
}

fn run_hook(module: &str, hook_name: &str, hook: &LifecycleHook) {
    if catch_unwind(AssertUnwindSafe(|| hook())).is_err() {
        tracing::error!(module = %module, hook = hook_name, "addon hook panicked");
    }
}

impl AddonManager {
    pub fn new() -> Self {
        Self::default()
    }

    // A panicking hook never runs under the lock, so poisoning cannot leave
    // the maps half-written. Recover the guard instead of failing.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an addon, run its `initialize` hook and append its menus.
    ///
    /// Registering a name twice replaces the earlier addon (keeping its
    /// position) and appends the menus again.
    pub fn register_addon(&self, addon: Addon) {
        let name = addon.name().to_string();
        let addon = Arc::new(addon);

        {
            let mut inner = self.write();
            if inner.addons.contains_key(&name) {
                tracing::warn!(module = %name, "addon already registered, overwriting");
            } else {
                inner.order.push(name.clone());
            }
            inner.addons.insert(name.clone(), addon.clone());
            inner.menus.extend(addon.menus().iter().cloned());
        }

        if let Some(hook) = &addon.initialize {
            run_hook(&name, "initialize", hook);
        }

        let unresolved = addon.unresolved_components();
        if !addon.components.is_empty() && !unresolved.is_empty() {
            tracing::debug!(module = %name, ?unresolved, "routes reference unexported components");
        }
        tracing::info!(module = %name, version = %addon.manifest.version, "addon registered");
    }

    pub fn get_addon(&self, name: &str) -> Option<Arc<Addon>> {
        self.read().addons.get(name).cloned()
    }

    /// Registered addons in registration order.
    pub fn get_all_addons(&self) -> Vec<Arc<Addon>> {
        let inner = self.read();
        inner
            .order
            .iter()
            .filter_map(|n| inner.addons.get(n).cloned())
            .collect()
    }

    pub fn get_all_manifests(&self) -> Vec<ModuleManifest> {
        self.get_all_addons()
            .iter()
            .map(|a| a.manifest.clone())
            .collect()
    }

    pub fn get_all_routes(&self) -> Vec<RouteFragment> {
        self.get_all_addons()
            .iter()
            .map(|a| a.routes.clone())
            .collect()
    }

    pub fn get_all_menus(&self) -> Vec<MenuEntry> {
        self.read().menus.clone()
    }

    pub fn client_view(&self) -> ClientView {
        ClientView {
            addons: self.get_all_manifests(),
            routes: self.get_all_routes().into_iter().flat_map(|f| f.0).collect(),
            menus: self.get_all_menus(),
        }
    }

    /// Run every addon's `cleanup` hook, then forget all addons and menus.
    pub fn cleanup(&self) {
        let addons = {
            let mut inner = self.write();
            let order = std::mem::take(&mut inner.order);
            let mut addons = std::mem::take(&mut inner.addons);
            inner.menus.clear();
            order
                .into_iter()
                .filter_map(|n| addons.remove(&n))
                .collect::<Vec<_>>()
        };

        for addon in &addons {
            if let Some(hook) = &addon.cleanup {
                run_hook(addon.name(), "cleanup", hook);
            }
        }
        self.ready.store(false, Ordering::SeqCst);
        tracing::info!(count = addons.len(), "addons cleaned up");
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether the loader has finished registering addons.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
