//! Module persistence and install/uninstall orchestration.
//!
//! The `modules` table mirrors the addon directory. A scan brings the rows
//! in line with what is on disk. Install applies a module's schema,
//! uninstall drops it, and a status toggle switches it on or off. Install
//! and uninstall are two-phase: `pending_operation` is written first and
//! cleared last, and the next scan finishes whatever an interrupted run
//! left behind.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use erp_db::entities::module::{self, PendingOperation, StringList};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use uuid::Uuid;

use crate::dependency;
use crate::error::AddonError;
use crate::manifest::{self, ModuleManifest};
use crate::registry;
use crate::schema::{self, ModelDefinition};
use crate::validator;

/// Counts and per-category module names from a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummary {
    pub total: usize,
    pub valid: usize,
    pub installed: usize,
    pub active: usize,
    pub added: Vec<String>,
    pub missing: Vec<String>,
    pub changed: Vec<String>,
    pub restored: Vec<String>,
    pub reconciled: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub modules: Vec<module::Model>,
    pub summary: ScanSummary,
}

/// Owns the module rows and the addon directory they describe.
#[derive(Clone)]
pub struct ModuleLifecycle {
    db: DatabaseConnection,
    addons_root: PathBuf,
}

enum Upsert {
    Added,
    Changed { restored: bool },
    Unchanged { restored: bool },
}

impl ModuleLifecycle {
    pub fn new(db: DatabaseConnection, addons_root: impl Into<PathBuf>) -> Self {
        Self {
            db,
            addons_root: addons_root.into(),
        }
    }

    pub fn addons_root(&self) -> &Path {
        &self.addons_root
    }

    pub fn module_dir(&self, name: &str) -> PathBuf {
        self.addons_root.join(name)
    }

    pub async fn list_modules(&self) -> Result<Vec<module::Model>, AddonError> {
        Ok(module::Entity::find()
            .order_by_asc(module::Column::Name)
            .all(&self.db)
            .await?)
    }

    pub async fn find_module(&self, name: &str) -> Result<Option<module::Model>, AddonError> {
        Ok(module::Entity::find()
            .filter(module::Column::Name.eq(name))
            .one(&self.db)
            .await?)
    }

    async fn require_module(&self, name: &str) -> Result<module::Model, AddonError> {
        self.find_module(name)
            .await?
            .ok_or_else(|| AddonError::NotFound(name.to_string()))
    }

    /// Model definitions of a module: `models/` files plus inline manifest
    /// models, in association order.
    async fn model_definitions(
        &self,
        name: &str,
        manifest: Option<&ModuleManifest>,
    ) -> Result<Vec<ModelDefinition>, AddonError> {
        let files = schema::load_model_definitions(&self.module_dir(name)).await?;
        let inline = manifest.map(|m| m.models.as_slice()).unwrap_or_default();
        schema::order_by_associations(&schema::merge_definitions(files, inline))
    }

    // ─── Scan ───────────────────────────────────────────────────────

    /// Bring the `modules` table in line with the addon directory.
    pub async fn scan_modules(&self) -> Result<ScanReport, AddonError> {
        let mut summary = ScanSummary::default();

        if let Err(e) = tokio::fs::create_dir_all(&self.addons_root).await {
            tracing::error!(root = %self.addons_root.display(), "failed to create addons root: {e}");
            summary.errors.push(format!("addons root: {e}"));
        }

        if let Err(e) = registry::generate_registry(&self.addons_root).await {
            tracing::warn!("failed to regenerate addon registry: {e}");
            summary.errors.push(format!("registry: {e}"));
        }

        let (dirs, root_listed) = match registry::valid_module_dirs(&self.addons_root).await {
            Ok(dirs) => (dirs, true),
            Err(e) => {
                tracing::error!(root = %self.addons_root.display(), "failed to list addons: {e}");
                summary.errors.push(format!("addons root: {e}"));
                (Vec::new(), false)
            }
        };

        let mut seen = BTreeSet::new();
        for (name, dir) in &dirs {
            let Some(manifest) = manifest::read_manifest(dir).await else {
                summary.errors.push(format!("{name}: invalid or unreadable manifest"));
                continue;
            };
            seen.insert(name.clone());

            match self.upsert_module(name, &manifest).await {
                Ok(Upsert::Added) => summary.added.push(name.clone()),
                Ok(Upsert::Changed { restored }) => {
                    summary.changed.push(name.clone());
                    if restored {
                        summary.restored.push(name.clone());
                    }
                }
                Ok(Upsert::Unchanged { restored }) => {
                    if restored {
                        summary.restored.push(name.clone());
                    }
                }
                Err(e) => {
                    tracing::error!(module = %name, "failed to save module: {e}");
                    summary.errors.push(format!("{name}: {e}"));
                }
            }
        }

        if root_listed {
            self.mark_missing(&seen, &mut summary).await?;
        } else {
            tracing::warn!("addons root unreadable, leaving installable flags untouched");
        }

        let pending = module::Entity::find()
            .filter(module::Column::PendingOperation.is_not_null())
            .all(&self.db)
            .await?;
        for row in pending {
            match self.reconcile(row).await {
                Ok(note) => summary.reconciled.push(note),
                Err(e) => summary.errors.push(format!("reconcile: {e}")),
            }
        }

        let modules = self.list_modules().await?;
        summary.total = modules.len();
        summary.valid = seen.len();
        summary.installed = modules.iter().filter(|m| m.installed).count();
        summary.active = modules.iter().filter(|m| m.active).count();

        tracing::info!(
            total = summary.total,
            valid = summary.valid,
            added = summary.added.len(),
            missing = summary.missing.len(),
            errors = summary.errors.len(),
            "module scan complete"
        );

        Ok(ScanReport { modules, summary })
    }

    async fn upsert_module(&self, name: &str, manifest: &ModuleManifest) -> Result<Upsert, AddonError> {
        let model_names = match self.model_definitions(name, Some(manifest)).await {
            Ok(defs) => defs.into_iter().map(|d| d.name).collect(),
            Err(e) => {
                tracing::warn!(module = %name, "failed to read model definitions: {e}");
                manifest.model_names()
            }
        };
        let dependencies = StringList(manifest.dependencies.clone());
        let models = StringList(model_names);
        let now = Utc::now().fixed_offset();

        let Some(existing) = self.find_module(name).await? else {
            module::ActiveModel {
                id: Set(Uuid::new_v4()),
                name: Set(name.to_string()),
                display_name: Set(manifest.display_name.clone()),
                version: Set(manifest.version.clone()),
                summary: Set(manifest.summary.clone()),
                description: Set(manifest.description.clone()),
                active: Set(false),
                installed: Set(false),
                installable: Set(manifest.installable),
                application: Set(manifest.application),
                auto_install: Set(manifest.auto_install),
                dependencies: Set(dependencies),
                models: Set(models),
                pending_operation: Set(None),
                installed_at: Set(None),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&self.db)
            .await?;
            tracing::info!(module = %name, version = %manifest.version, "new module registered");
            return Ok(Upsert::Added);
        };

        let restored = !existing.installable && manifest.installable;
        let changed = (existing.installable && !manifest.installable)
            || existing.display_name != manifest.display_name
            || existing.version != manifest.version
            || existing.summary != manifest.summary
            || existing.description != manifest.description
            || existing.application != manifest.application
            || existing.auto_install != manifest.auto_install
            || existing.dependencies != dependencies
            || existing.models != models;

        if !changed && !restored {
            return Ok(Upsert::Unchanged { restored: false });
        }

        let mut am = existing.into_active_model();
        am.display_name = Set(manifest.display_name.clone());
        am.version = Set(manifest.version.clone());
        am.summary = Set(manifest.summary.clone());
        am.description = Set(manifest.description.clone());
        am.application = Set(manifest.application);
        am.auto_install = Set(manifest.auto_install);
        am.dependencies = Set(dependencies);
        am.models = Set(models);
        am.installable = Set(manifest.installable);
        am.updated_at = Set(now);
        am.update(&self.db).await?;

        if restored {
            tracing::info!(module = %name, "module files are back, marked installable");
        }
        Ok(if changed {
            Upsert::Changed { restored }
        } else {
            Upsert::Unchanged { restored }
        })
    }

    async fn mark_missing(
        &self,
        seen: &BTreeSet<String>,
        summary: &mut ScanSummary,
    ) -> Result<(), AddonError> {
        let rows = module::Entity::find()
            .filter(module::Column::Installable.eq(true))
            .all(&self.db)
            .await?;

        for row in rows {
            if seen.contains(&row.name) {
                continue;
            }
            let name = row.name.clone();
            let mut am = row.into_active_model();
            am.installable = Set(false);
            am.updated_at = Set(Utc::now().fixed_offset());
            match am.update(&self.db).await {
                Ok(_) => {
                    tracing::warn!(module = %name, "module no longer found on disk, marked not installable");
                    summary.missing.push(name);
                }
                Err(e) => summary.errors.push(format!("{name}: {e}")),
            }
        }
        Ok(())
    }

    /// Finish an install or uninstall that was interrupted.
    async fn reconcile(&self, row: module::Model) -> Result<String, AddonError> {
        let name = row.name.clone();
        let Some(op) = row.pending_operation else {
            return Ok(format!("{name}: nothing pending"));
        };

        let mut am = row.into_active_model();
        am.pending_operation = Set(None);
        am.updated_at = Set(Utc::now().fixed_offset());

        let note = match op {
            PendingOperation::Install => {
                let manifest = manifest::read_manifest(&self.module_dir(&name)).await;
                let defs = match self.model_definitions(&name, manifest.as_ref()).await {
                    Ok(defs) => Some(defs),
                    Err(e) => {
                        tracing::warn!(module = %name, "model definitions unreadable: {e}");
                        None
                    }
                };
                let complete = match &defs {
                    Some(defs) => schema::tables_exist(&self.db, &name, defs).await?,
                    None => false,
                };
                if complete {
                    am.installed = Set(true);
                    am.installed_at = Set(Some(Utc::now().fixed_offset()));
                    format!("{name}: install completed")
                } else {
                    format!("{name}: incomplete install cleared")
                }
            }
            PendingOperation::Uninstall => {
                am.installed = Set(false);
                am.installed_at = Set(None);
                am.active = Set(false);
                format!("{name}: uninstall completed")
            }
        };

        am.update(&self.db).await?;
        tracing::info!(module = %name, operation = %op, "reconciled pending operation: {note}");
        Ok(note)
    }

    async fn set_pending(
        &self,
        row: module::Model,
        op: PendingOperation,
    ) -> Result<module::Model, AddonError> {
        let mut am = row.into_active_model();
        am.pending_operation = Set(Some(op));
        am.updated_at = Set(Utc::now().fixed_offset());
        Ok(am.update(&self.db).await?)
    }

    // ─── Install / uninstall ────────────────────────────────────────

    pub async fn install_module(&self, name: &str) -> Result<module::Model, AddonError> {
        let row = self.require_module(name).await?;
        if row.installed {
            return Err(AddonError::AlreadyInstalled(name.to_string()));
        }

        let dir = self.module_dir(name);
        if !dir.is_dir() || validator::entry_file(&dir).is_none() {
            return Err(AddonError::ModuleFilesMissing(name.to_string()));
        }
        if !row.installable {
            return Err(AddonError::NotInstallable(name.to_string()));
        }

        let rows = self.list_modules().await?;
        let missing = dependency::missing_dependencies(&row, &rows);
        if !missing.is_empty() {
            return Err(AddonError::MissingDependencies {
                name: name.to_string(),
                missing,
            });
        }

        // Bad definitions are rejected before anything is marked pending.
        let manifest = manifest::read_manifest(&dir).await;
        let defs = self.model_definitions(name, manifest.as_ref()).await?;

        let row = self.set_pending(row, PendingOperation::Install).await?;
        tracing::info!(module = %name, "installing module");

        let report = schema::sync_models(&self.db, name, &defs)
            .await
            .map_err(|source| AddonError::SchemaSync {
                name: name.to_string(),
                source,
            })?;

        let now = Utc::now().fixed_offset();
        let mut am = row.into_active_model();
        am.installed = Set(true);
        am.installed_at = Set(Some(now));
        am.pending_operation = Set(None);
        am.models = Set(StringList(defs.into_iter().map(|d| d.name).collect()));
        am.updated_at = Set(now);
        let row = am.update(&self.db).await?;

        tracing::info!(
            module = %name,
            created = report.created.len(),
            altered = report.altered.len(),
            "module installed"
        );
        Ok(row)
    }

    pub async fn uninstall_module(&self, name: &str) -> Result<module::Model, AddonError> {
        let row = self.require_module(name).await?;
        if !row.installed {
            return Err(AddonError::NotInstalled(name.to_string()));
        }

        let rows = self.list_modules().await?;
        let dependents = dependency::installed_dependents(name, &rows);
        if !dependents.is_empty() {
            return Err(AddonError::DependentModules {
                name: name.to_string(),
                action: "uninstall",
                dependents,
            });
        }

        let row = self.set_pending(row, PendingOperation::Uninstall).await?;
        tracing::info!(module = %name, "uninstalling module");

        let manifest = manifest::read_manifest(&self.module_dir(name)).await;
        let defs = match self.model_definitions(name, manifest.as_ref()).await {
            Ok(defs) => defs,
            Err(e) => {
                tracing::warn!(module = %name, "model definitions unavailable, dropping by prefix only: {e}");
                Vec::new()
            }
        };
        let all_tables = match schema::list_tables(&self.db).await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::error!(module = %name, "failed to list tables: {e}");
                Vec::new()
            }
        };
        let others: Vec<String> = rows.into_iter().map(|r| r.name).collect();
        let tables = schema::module_tables(name, &defs, &all_tables, &others);
        let dropped = schema::drop_tables(&self.db, name, &tables).await;

        let mut am = row.into_active_model();
        am.installed = Set(false);
        am.installed_at = Set(None);
        am.active = Set(false);
        am.pending_operation = Set(None);
        am.updated_at = Set(Utc::now().fixed_offset());
        let row = am.update(&self.db).await?;

        tracing::info!(
            module = %name,
            dropped = dropped.dropped.len(),
            failed = dropped.failed.len(),
            "module uninstalled"
        );
        Ok(row)
    }

    // ─── Status ─────────────────────────────────────────────────────

    pub async fn toggle_module_status(
        &self,
        name: &str,
        active: bool,
    ) -> Result<module::Model, AddonError> {
        let row = self.require_module(name).await?;
        if row.active == active {
            return Err(AddonError::AlreadyInState {
                name: name.to_string(),
                state: if active { "active" } else { "inactive" },
            });
        }

        let rows = self.list_modules().await?;
        if active {
            if !row.installed {
                return Err(AddonError::NotInstalled(name.to_string()));
            }
            let inactive = dependency::inactive_dependencies(&row, &rows);
            if !inactive.is_empty() {
                return Err(AddonError::InactiveDependencies {
                    name: name.to_string(),
                    inactive,
                });
            }
        } else {
            let dependents = dependency::active_dependents(name, &rows);
            if !dependents.is_empty() {
                return Err(AddonError::DependentModules {
                    name: name.to_string(),
                    action: "deactivate",
                    dependents,
                });
            }
        }

        let mut am = row.into_active_model();
        am.active = Set(active);
        am.updated_at = Set(Utc::now().fixed_offset());
        let row = am.update(&self.db).await?;

        tracing::info!(module = %name, active, "module status changed");
        Ok(row)
    }

    // ─── Startup ────────────────────────────────────────────────────

    /// Install and activate every installable `auto_install` module that is
    /// not installed yet, dependencies first. Returns the modules that ended
    /// up active. Failures are logged per module.
    pub async fn auto_install(&self) -> Result<Vec<String>, AddonError> {
        let candidates: Vec<module::Model> = self
            .list_modules()
            .await?
            .into_iter()
            .filter(|m| m.installable && m.auto_install && !m.installed)
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let (order, cyclic) = dependency::partition_install_order(&candidates);
        if !cyclic.is_empty() {
            tracing::error!(modules = ?cyclic, "dependency cycle, skipping auto-install for these modules");
        }

        let mut activated = Vec::new();
        for name in order {
            if let Err(e) = self.install_module(&name).await {
                tracing::error!(module = %name, "auto-install failed: {e}");
                continue;
            }
            match self.toggle_module_status(&name, true).await {
                Ok(_) | Err(AddonError::AlreadyInState { .. }) => activated.push(name),
                Err(e) => tracing::error!(module = %name, "auto-activation failed: {e}"),
            }
        }
        Ok(activated)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
