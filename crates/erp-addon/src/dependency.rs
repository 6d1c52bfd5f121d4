//! Dependency checks between module records.
//!
//! Guards run in both directions: installing or activating a module looks
//! at what it depends on, uninstalling or deactivating looks at what
//! depends on it.

use std::collections::{BTreeMap, BTreeSet};

use erp_db::entities::module;

fn find<'a>(rows: &'a [module::Model], name: &str) -> Option<&'a module::Model> {
    rows.iter().find(|r| r.name == name)
}

/// Dependencies of `target` that are unknown or not installed.
pub fn missing_dependencies(target: &module::Model, rows: &[module::Model]) -> Vec<String> {
    target
        .dependencies
        .iter()
        .filter(|dep| !find(rows, dep).is_some_and(|r| r.installed))
        .cloned()
        .collect()
}

/// Dependencies of `target` that are unknown or not active.
pub fn inactive_dependencies(target: &module::Model, rows: &[module::Model]) -> Vec<String> {
    target
        .dependencies
        .iter()
        .filter(|dep| !find(rows, dep).is_some_and(|r| r.active))
        .cloned()
        .collect()
}

/// Installed modules that list `name` as a dependency.
pub fn installed_dependents(name: &str, rows: &[module::Model]) -> Vec<String> {
    rows.iter()
        .filter(|r| r.name != name && r.installed && r.depends_on(name))
        .map(|r| r.name.clone())
        .collect()
}

/// Active modules that list `name` as a dependency.
pub fn active_dependents(name: &str, rows: &[module::Model]) -> Vec<String> {
    rows.iter()
        .filter(|r| r.name != name && r.active && r.depends_on(name))
        .map(|r| r.name.clone())
        .collect()
}

/// Order `rows` so dependencies come before their dependents.
///
/// Dependencies outside `rows` are ignored (they are either installed
/// already or will be reported missing by the install itself). Ties are
/// broken by name. Returns the ordered names and, separately, the names
/// caught in a cycle.
pub fn partition_install_order(rows: &[module::Model]) -> (Vec<String>, Vec<String>) {
    let names: BTreeSet<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    let mut pending: BTreeMap<&str, BTreeSet<&str>> = rows
        .iter()
        .map(|r| {
            let deps = r
                .dependencies
                .iter()
                .map(String::as_str)
                .filter(|d| names.contains(d))
                .collect();
            (r.name.as_str(), deps)
        })
        .collect();

    let mut ordered = Vec::with_capacity(rows.len());
    loop {
        let ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            break;
        }
        for name in ready {
            pending.remove(name);
            for deps in pending.values_mut() {
                deps.remove(name);
            }
            ordered.push(name.to_string());
        }
    }

    let cyclic = pending.keys().map(|n| n.to_string()).collect();
    (ordered, cyclic)
}
