//! Addon data models and schema synchronization.
//!
//! Models are declared as data, either in an addon's `models/` directory
//! (one `.toml` or `.json` file per model) or inline in its manifest.
//! Installing a module creates missing tables and adds missing columns;
//! nothing existing is ever altered or removed. Uninstalling drops the
//! tables that carry the module's `<module>_` prefix.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use sea_orm::sea_query::{
    Alias, ColumnDef, ForeignKey, ForeignKeyAction, SimpleExpr, Table, TableCreateStatement,
};
use sea_orm::{
    ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr, Statement, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::error::AddonError;

/// Directory inside an addon holding its model definitions.
pub const MODELS_DIR: &str = "models";

fn default_true() -> bool {
    true
}

/// A data model owned by a module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    #[serde(default)]
    pub name: String,
    /// Explicit table name. Defaults to `<module>_<snake_case(name)>`.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub auto_increment: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    /// Name of another model of the same module. Creates a foreign key to
    /// that model's primary key.
    #[serde(default)]
    pub references: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Text,
    Integer,
    BigInteger,
    Boolean,
    Float,
    Decimal,
    Date,
    Timestamp,
    Json,
    Uuid,
}

/// `EmployeeLeave` → `employee_leave`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for ch in name.chars() {
        if ch.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
            prev_lower = false;
        } else if ch == '-' || ch == ' ' {
            out.push('_');
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_ascii_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Prefix every table of `module` carries.
pub fn table_prefix(module: &str) -> String {
    format!("{module}_")
}

impl ModelDefinition {
    pub fn table_name(&self, module: &str) -> String {
        match &self.table {
            Some(t) if !t.is_empty() => t.clone(),
            _ => format!("{}{}", table_prefix(module), snake_case(&self.name)),
        }
    }

    /// Primary key column; `id` when none is declared (one is generated).
    pub fn primary_key(&self) -> &str {
        self.fields
            .iter()
            .find(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .unwrap_or("id")
    }

    fn has_declared_primary_key(&self) -> bool {
        self.fields.iter().any(|f| f.primary_key)
    }

    fn validate(&self) -> Result<(), AddonError> {
        if self.name.trim().is_empty() {
            return Err(AddonError::InvalidModel("model name must not be empty".into()));
        }
        let mut seen = BTreeSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(AddonError::InvalidModel(format!(
                    "model '{}' declares field '{}' twice",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}

// ─── Loading ────────────────────────────────────────────────────────

/// Load every model definition under `<module_dir>/models`.
///
/// A missing directory yields an empty list. Files are read in name order;
/// a model without a `name` takes its file stem.
pub async fn load_model_definitions(module_dir: &Path) -> Result<Vec<ModelDefinition>, AddonError> {
    let dir = module_dir.join(MODELS_DIR);
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut models = Vec::new();
    for path in paths {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let content = tokio::fs::read_to_string(&path).await?;
        let mut model: ModelDefinition = match ext {
            "toml" => toml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                tracing::debug!(path = %path.display(), "ignoring non-model file");
                continue;
            }
        };
        if model.name.is_empty() {
            model.name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
        }
        model.validate()?;
        models.push(model);
    }

    Ok(models)
}

/// Merge file-based definitions with inline manifest models.
///
/// Inline models only count when they declare fields; a file with the same
/// model name takes precedence.
pub fn merge_definitions(
    files: Vec<ModelDefinition>,
    inline: &[ModelDefinition],
) -> Vec<ModelDefinition> {
    let mut merged = files;
    for model in inline {
        if model.fields.is_empty() || merged.iter().any(|m| m.name == model.name) {
            continue;
        }
        merged.push(model.clone());
    }
    merged
}

/// Order models so that every referenced model comes before the models
/// referencing it.
pub fn order_by_associations(
    models: &[ModelDefinition],
) -> Result<Vec<ModelDefinition>, AddonError> {
    let by_name: HashMap<&str, &ModelDefinition> =
        models.iter().map(|m| (m.name.as_str(), m)).collect();

    for model in models {
        for field in &model.fields {
            if let Some(target) = &field.references {
                if !by_name.contains_key(target.as_str()) {
                    return Err(AddonError::InvalidModel(format!(
                        "{}.{} references unknown model '{target}'",
                        model.name, field.name
                    )));
                }
            }
        }
    }

    let mut ordered: Vec<ModelDefinition> = Vec::with_capacity(models.len());
    let mut placed: BTreeSet<&str> = BTreeSet::new();

    while ordered.len() < models.len() {
        let before = ordered.len();
        for model in models {
            if placed.contains(model.name.as_str()) {
                continue;
            }
            let ready = model.fields.iter().all(|f| match &f.references {
                Some(target) => target == &model.name || placed.contains(target.as_str()),
                None => true,
            });
            if ready {
                placed.insert(model.name.as_str());
                ordered.push(model.clone());
            }
        }
        if ordered.len() == before {
            let stuck: Vec<String> = models
                .iter()
                .filter(|m| !placed.contains(m.name.as_str()))
                .map(|m| m.name.clone())
                .collect();
            return Err(AddonError::InvalidModel(format!(
                "circular references between models: {}",
                stuck.join(", ")
            )));
        }
    }

    Ok(ordered)
}

// ─── Statement building ─────────────────────────────────────────────

fn default_expr(value: &serde_json::Value) -> Option<SimpleExpr> {
    match value {
        serde_json::Value::Bool(b) => Some((*b).into()),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(SimpleExpr::from)
            .or_else(|| n.as_f64().map(SimpleExpr::from)),
        serde_json::Value::String(s) => Some(s.clone().into()),
        _ => None,
    }
}

fn column_def(field: &FieldDefinition, for_alter: bool) -> ColumnDef {
    let mut col = ColumnDef::new(Alias::new(&field.name));
    match field.kind {
        FieldType::String => col.string(),
        FieldType::Text => col.text(),
        FieldType::Integer => col.integer(),
        FieldType::BigInteger => col.big_integer(),
        FieldType::Boolean => col.boolean(),
        FieldType::Float => col.double(),
        FieldType::Decimal => col.decimal(),
        FieldType::Date => col.date(),
        FieldType::Timestamp => col.timestamp_with_time_zone(),
        FieldType::Json => col.json(),
        FieldType::Uuid => col.uuid(),
    };

    if let Some(expr) = field.default.as_ref().and_then(default_expr) {
        col.default(expr);
    }

    if for_alter {
        // Existing rows have no value for a new column unless it has a default.
        if !field.nullable && field.default.is_some() {
            col.not_null();
        }
        return col;
    }

    if field.primary_key {
        col.not_null().primary_key();
        if field.auto_increment {
            col.auto_increment();
        }
    } else if !field.nullable {
        col.not_null();
    }
    if field.unique && !field.primary_key {
        col.unique_key();
    }
    col
}

/// `CREATE TABLE IF NOT EXISTS` for one model, with foreign keys for its
/// associations. `models` is the whole module, used to resolve references.
pub fn create_table_statement(
    module: &str,
    model: &ModelDefinition,
    models: &[ModelDefinition],
) -> TableCreateStatement {
    let table = model.table_name(module);
    let mut stmt = Table::create();
    stmt.table(Alias::new(&table)).if_not_exists();

    if !model.has_declared_primary_key() {
        stmt.col(
            ColumnDef::new(Alias::new("id"))
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        );
    }

    for field in &model.fields {
        stmt.col(&mut column_def(field, false));

        let Some(target) = &field.references else {
            continue;
        };
        let Some(target_model) = models.iter().find(|m| &m.name == target) else {
            continue;
        };
        stmt.foreign_key(
            ForeignKey::create()
                .name(format!("fk_{table}_{}", field.name))
                .from(Alias::new(&table), Alias::new(&field.name))
                .to(
                    Alias::new(target_model.table_name(module)),
                    Alias::new(target_model.primary_key()),
                )
                .on_delete(if field.nullable {
                    ForeignKeyAction::SetNull
                } else {
                    ForeignKeyAction::Cascade
                }),
        );
    }

    stmt.to_owned()
}

// ─── Introspection ──────────────────────────────────────────────────

/// All user tables in the current database/schema.
pub async fn list_tables(db: &DatabaseConnection) -> Result<Vec<String>, DbErr> {
    let backend = db.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Postgres => {
            "SELECT table_name::text AS table_name FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'"
        }
        DatabaseBackend::MySql => {
            "SELECT table_name AS table_name FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'"
        }
        DatabaseBackend::Sqlite => {
            "SELECT name AS table_name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'"
        }
    };

    let rows = db
        .query_all(Statement::from_string(backend, sql.to_owned()))
        .await?;
    let mut tables = rows
        .iter()
        .map(|r| r.try_get::<String>("", "table_name"))
        .collect::<Result<Vec<_>, _>>()?;
    tables.sort();
    Ok(tables)
}

/// Column names of `table`; empty when the table does not exist.
pub async fn existing_columns(db: &DatabaseConnection, table: &str) -> Result<Vec<String>, DbErr> {
    let backend = db.get_database_backend();
    let sql = match backend {
        DatabaseBackend::Postgres => {
            "SELECT column_name::text AS column_name FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1"
        }
        DatabaseBackend::MySql => {
            "SELECT column_name AS column_name FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = ?"
        }
        DatabaseBackend::Sqlite => "SELECT name AS column_name FROM pragma_table_info(?)",
    };

    let rows = db
        .query_all(Statement::from_sql_and_values(backend, sql, [table.into()]))
        .await?;
    rows.iter()
        .map(|r| r.try_get::<String>("", "column_name"))
        .collect()
}

// ─── Sync & drop ────────────────────────────────────────────────────

/// Outcome of a schema sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub created: Vec<String>,
    /// `table.column` entries added to tables that already existed.
    pub altered: Vec<String>,
}

/// Create missing tables and add missing columns for `models`, which must
/// already be in association order.
pub async fn sync_models(
    db: &DatabaseConnection,
    module: &str,
    models: &[ModelDefinition],
) -> Result<SyncReport, DbErr> {
    let backend = db.get_database_backend();
    let existing: BTreeSet<String> = list_tables(db).await?.into_iter().collect();
    let mut report = SyncReport::default();

    for model in models {
        let table = model.table_name(module);

        if !existing.contains(&table) {
            let stmt = create_table_statement(module, model, models);
            db.execute(backend.build(&stmt)).await?;
            tracing::info!(module = %module, table = %table, "created table");
            report.created.push(table);
            continue;
        }

        let columns: BTreeSet<String> = existing_columns(db, &table).await?.into_iter().collect();
        for field in &model.fields {
            if columns.contains(&field.name) {
                continue;
            }
            if field.primary_key {
                tracing::warn!(
                    module = %module,
                    table = %table,
                    column = %field.name,
                    "cannot add a primary key column to an existing table, skipping"
                );
                continue;
            }
            let stmt = Table::alter()
                .table(Alias::new(&table))
                .add_column(&mut column_def(field, true))
                .to_owned();
            db.execute(backend.build(&stmt)).await?;
            tracing::info!(module = %module, table = %table, column = %field.name, "added column");
            report.altered.push(format!("{table}.{}", field.name));
        }
    }

    Ok(report)
}

/// Whether every table declared by `models` exists.
pub async fn tables_exist(
    db: &DatabaseConnection,
    module: &str,
    models: &[ModelDefinition],
) -> Result<bool, DbErr> {
    let existing: BTreeSet<String> = list_tables(db).await?.into_iter().collect();
    Ok(models.iter().all(|m| existing.contains(&m.table_name(module))))
}

/// Tables belonging to `module`, in drop order.
///
/// Declared models come first, dependents before the tables they
/// reference; any other `<module>_` table follows in name order. Tables of
/// a different module whose name extends this one (`hr` vs `hr_payroll`)
/// are left alone.
pub fn module_tables(
    module: &str,
    ordered_models: &[ModelDefinition],
    all_tables: &[String],
    other_modules: &[String],
) -> Vec<String> {
    let prefix = table_prefix(module);
    let foreign_prefixes: Vec<String> = other_modules
        .iter()
        .filter(|o| o.as_str() != module && o.starts_with(&prefix))
        .map(|o| table_prefix(o))
        .collect();

    let mut out: Vec<String> = ordered_models
        .iter()
        .rev()
        .map(|m| m.table_name(module))
        .filter(|t| all_tables.contains(t))
        .collect();

    for table in all_tables {
        if out.contains(table) || !table.starts_with(&prefix) {
            continue;
        }
        if foreign_prefixes.iter().any(|p| table.starts_with(p)) {
            continue;
        }
        out.push(table.clone());
    }
    out
}

/// Outcome of dropping a module's tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DropReport {
    pub dropped: Vec<String>,
    pub failed: Vec<String>,
}

/// Relax foreign-key enforcement on the connection behind `conn`.
///
/// SQLite defers the checks to commit (`PRAGMA foreign_keys` is a no-op
/// inside a transaction); MySQL turns them off for the session.
async fn relax_foreign_keys<C: ConnectionTrait>(conn: &C) -> Result<(), DbErr> {
    let sql = match conn.get_database_backend() {
        DatabaseBackend::Sqlite => "PRAGMA defer_foreign_keys = ON",
        DatabaseBackend::MySql => "SET FOREIGN_KEY_CHECKS = 0",
        // Postgres drops with CASCADE instead.
        DatabaseBackend::Postgres => return Ok(()),
    };
    conn.execute_unprepared(sql).await.map(|_| ())
}

async fn restore_foreign_keys<C: ConnectionTrait>(conn: &C) -> Result<(), DbErr> {
    match conn.get_database_backend() {
        DatabaseBackend::MySql => conn
            .execute_unprepared("SET FOREIGN_KEY_CHECKS = 1")
            .await
            .map(|_| ()),
        // The SQLite pragma resets itself at commit.
        _ => Ok(()),
    }
}

async fn drop_each<C: ConnectionTrait>(conn: &C, module: &str, tables: &[String]) -> DropReport {
    let backend = conn.get_database_backend();
    let mut report = DropReport::default();

    for table in tables {
        let mut stmt = Table::drop();
        stmt.table(Alias::new(table)).if_exists();
        if backend == DatabaseBackend::Postgres {
            stmt.cascade();
        }
        match conn.execute(backend.build(&stmt)).await {
            Ok(_) => {
                tracing::info!(module = %module, table = %table, "dropped table");
                report.dropped.push(table.clone());
            }
            Err(e) => {
                tracing::error!(module = %module, table = %table, "failed to drop table: {e}");
                report.failed.push(table.clone());
            }
        }
    }
    report
}

/// Drop `tables` in order.
///
/// Postgres drops with `CASCADE` straight on the pool. SQLite and MySQL
/// keep the foreign-key switch and the drops on one transaction's
/// connection, so no pooled connection is left with checks relaxed.
///
/// Failures are logged and collected, never returned: a module whose flags
/// are cleared with a few orphaned tables can still be reinstalled, a
/// module stuck half-uninstalled cannot.
pub async fn drop_tables(db: &DatabaseConnection, module: &str, tables: &[String]) -> DropReport {
    if db.get_database_backend() == DatabaseBackend::Postgres {
        return drop_each(db, module, tables).await;
    }

    let txn = match db.begin().await {
        Ok(txn) => txn,
        Err(e) => {
            tracing::error!(module = %module, "failed to open a connection for dropping tables: {e}");
            return DropReport {
                dropped: Vec::new(),
                failed: tables.to_vec(),
            };
        }
    };

    if let Err(e) = relax_foreign_keys(&txn).await {
        tracing::warn!(module = %module, "failed to relax foreign key checks: {e}");
    }
    let mut report = drop_each(&txn, module, tables).await;
    if let Err(e) = restore_foreign_keys(&txn).await {
        tracing::warn!(module = %module, "failed to restore foreign key checks: {e}");
    }

    if let Err(e) = txn.commit().await {
        tracing::error!(module = %module, "failed to commit table drops: {e}");
        let rolled_back = std::mem::take(&mut report.dropped);
        report.failed.extend(rolled_back);
    }
    report
}

// ─── Tests ──────────────────────────────────────────────────────────
