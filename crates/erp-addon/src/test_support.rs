// Shared helpers for the unit tests of this crate
use std::path::{Path, PathBuf};

use erp_db::entities::module;
use erp_migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait,
    IntoActiveModel, QueryFilter, Set,
};

/// Fresh in-memory SQLite database with the `modules` table migrated.
///
/// A single connection keeps every statement on the same in-memory database.
pub async fn sqlite_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

/// Write a minimal valid addon directory `<root>/<name>` with the given
/// manifest body.
pub fn write_addon(root: &Path, name: &str, manifest: &str) -> PathBuf {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("index.rs"), "").unwrap();
    std::fs::write(dir.join("manifest.toml"), manifest).unwrap();
    dir
}

/// Add a model definition file to an addon directory.
pub fn write_model(dir: &Path, file: &str, body: &str) {
    let models = dir.join(crate::schema::MODELS_DIR);
    std::fs::create_dir_all(&models).unwrap();
    std::fs::write(models.join(file), body).unwrap();
}

/// In-memory module record with everything off.
pub fn module_row(name: &str, deps: &[&str]) -> module::Model {
    let now = chrono::Utc::now().fixed_offset();
    module::Model {
        id: uuid::Uuid::new_v4(),
        name: name.to_string(),
        display_name: name.to_string(),
        version: "1.0.0".into(),
        summary: None,
        description: None,
        active: false,
        installed: false,
        installable: true,
        application: false,
        auto_install: false,
        dependencies: deps
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .into(),
        models: Default::default(),
        pending_operation: None,
        installed_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Insert a module record with the given flags.
pub async fn insert_module(
    db: &DatabaseConnection,
    name: &str,
    active: bool,
    installed: bool,
    deps: &[&str],
) -> module::Model {
    let mut row = module_row(name, deps);
    row.active = active;
    row.installed = installed;
    row.into_active_model().reset_all().insert(db).await.unwrap()
}

/// Overwrite the `active`/`installed` flags of an existing record.
pub async fn set_flags(db: &DatabaseConnection, name: &str, active: bool, installed: bool) {
    let row = find_module(db, name).await;
    let mut am = row.into_active_model();
    am.active = Set(active);
    am.installed = Set(installed);
    am.update(db).await.unwrap();
}

pub async fn find_module(db: &DatabaseConnection, name: &str) -> module::Model {
    module::Entity::find()
        .filter(module::Column::Name.eq(name))
        .one(db)
        .await
        .unwrap()
        .unwrap()
}
