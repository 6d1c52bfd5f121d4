// Shared helpers for the handler tests
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use erp_addon::client::AddonManager;
use erp_addon::ModuleLifecycle;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use tower::ServiceExt;

use crate::config::ServerConfig;
use crate::state::AppState;

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), target).unwrap();
        }
    }
}

/// App over an in-memory database and a temporary addons directory
/// holding a copy of the hr addon and a `finance` addon depending on it.
pub async fn test_app() -> (tempfile::TempDir, Router, Arc<AppState>) {
    let tmp = tempfile::tempdir().unwrap();
    let addons_dir = tmp.path().join("addons");

    let hr_src = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../addons/hr");
    let hr_dst = addons_dir.join("hr");
    std::fs::create_dir_all(&hr_dst).unwrap();
    for file in ["index.rs", "manifest.toml"] {
        std::fs::copy(hr_src.join(file), hr_dst.join(file)).unwrap();
    }
    copy_dir(&hr_src.join("models"), &hr_dst.join("models"));

    let finance = addons_dir.join("finance");
    std::fs::create_dir_all(&finance).unwrap();
    std::fs::write(finance.join("index.rs"), "").unwrap();
    std::fs::write(
        finance.join("manifest.toml"),
        "display_name = \"Finance\"\ndependencies = [\"hr\"]\n",
    )
    .unwrap();

    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    erp_migration::Migrator::up(&db, None).await.unwrap();

    let config = ServerConfig {
        addons_dir: addons_dir.clone(),
        ..ServerConfig::from_lookup(|_| None)
    };
    let state = Arc::new(AppState {
        db: db.clone(),
        lifecycle: ModuleLifecycle::new(db.clone(), addons_dir),
        routes: Arc::new(crate::build_route_manager(db, &config)),
        addons: Arc::new(AddonManager::new()),
        config,
    });

    (tmp, crate::build_app(state.clone()), state)
}

pub async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or_default())
}
