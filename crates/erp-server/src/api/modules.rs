//! Module management API endpoints.
//!
//! All endpoints require the admin token when `ERP_ADMIN_TOKEN` is set.
//! Every successful install, uninstall or status change rebuilds the
//! module's routes so `/api/<module>` reflects the new state immediately.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use erp_addon::{AddonError, ScanSummary};
use erp_db::entities::module;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

// ─── Helpers ────────────────────────────────────────────────────────────

/// Map an addon error to its HTTP status and JSON body.
pub fn error_response(err: AddonError) -> ApiError {
    let status = if err.is_not_found() {
        StatusCode::NOT_FOUND
    } else if err.is_conflict() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("module operation failed: {err}");
    }

    let mut body = json!({ "error": err.to_string() });
    match &err {
        AddonError::MissingDependencies { missing, .. } => {
            body["missingDependencies"] = json!(missing);
        }
        AddonError::DependentModules { dependents, .. } => {
            body["dependentModules"] = json!(dependents);
        }
        AddonError::InactiveDependencies { inactive, .. } => {
            body["inactiveDependencies"] = json!(inactive);
        }
        _ => {}
    }
    (status, Json(body))
}

async fn refresh_routes(state: &AppState, name: &str) {
    match state.routes.reload_module_routes(name).await {
        Ok(mounted) => tracing::debug!(module = %name, mounted, "module routes refreshed"),
        Err(e) => tracing::warn!(module = %name, "failed to refresh module routes: {e}"),
    }
}

// ─── Request / Response types ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
    pub message: &'static str,
    pub modules: Vec<module::Model>,
    pub summary: ScanSummary,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub mounted: Vec<String>,
}

// ─── Handlers ───────────────────────────────────────────────────────────

/// GET /api/modules — List all modules.
pub async fn list_modules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<module::Model>>, ApiError> {
    let modules = state.lifecycle.list_modules().await.map_err(error_response)?;
    Ok(Json(modules))
}

/// GET /api/modules/{name} — Get one module.
pub async fn get_module(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<module::Model>, ApiError> {
    state
        .lifecycle
        .find_module(&name)
        .await
        .map_err(error_response)?
        .map(Json)
        .ok_or_else(|| error_response(AddonError::NotFound(name)))
}

/// PUT /api/modules/{name}/status — Activate or deactivate a module.
pub async fn set_module_status(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<module::Model>, ApiError> {
    let model = state
        .lifecycle
        .toggle_module_status(&name, body.active)
        .await
        .map_err(error_response)?;
    refresh_routes(&state, &name).await;
    Ok(Json(model))
}

/// POST /api/modules/{name}/install — Apply a module's schema.
pub async fn install_module(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<module::Model>, ApiError> {
    let model = state
        .lifecycle
        .install_module(&name)
        .await
        .map_err(error_response)?;
    refresh_routes(&state, &name).await;
    Ok(Json(model))
}

/// POST /api/modules/{name}/uninstall — Drop a module's tables.
pub async fn uninstall_module(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<module::Model>, ApiError> {
    let model = state
        .lifecycle
        .uninstall_module(&name)
        .await
        .map_err(error_response)?;
    refresh_routes(&state, &name).await;
    Ok(Json(model))
}

/// POST /api/modules/scan — Re-read the addons directory.
pub async fn scan_modules(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ScanResponse>, ApiError> {
    let report = state.lifecycle.scan_modules().await.map_err(error_response)?;
    if let Err(e) = state.routes.reload_all_routes().await {
        tracing::warn!("failed to reload module routes after scan: {e}");
    }
    Ok(Json(ScanResponse {
        message: "Module scan complete",
        modules: report.modules,
        summary: report.summary,
    }))
}

/// POST /api/modules/routes/reload — Rebuild every module router.
pub async fn reload_routes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, ApiError> {
    let mounted = state
        .routes
        .reload_all_routes()
        .await
        .map_err(error_response)?;
    Ok(Json(ReloadResponse { mounted }))
}

// ─── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{call, test_app};

    #[test]
    fn test_error_response_statuses() {
        let (status, _) = error_response(AddonError::NotFound("hr".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = error_response(AddonError::ModuleFilesMissing("hr".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = error_response(AddonError::AlreadyInstalled("hr".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = error_response(AddonError::InvalidModel("bad ref".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = error_response(AddonError::Load("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_dependency_lists() {
        let (_, Json(body)) = error_response(AddonError::MissingDependencies {
            name: "finance".into(),
            missing: vec!["hr".into()],
        });
        assert_eq!(body["missingDependencies"], json!(["hr"]));

        let (_, Json(body)) = error_response(AddonError::DependentModules {
            name: "hr".into(),
            action: "deactivate",
            dependents: vec!["finance".into()],
        });
        assert_eq!(body["dependentModules"], json!(["finance"]));

        let (_, Json(body)) = error_response(AddonError::InactiveDependencies {
            name: "finance".into(),
            inactive: vec!["hr".into()],
        });
        assert_eq!(body["inactiveDependencies"], json!(["hr"]));
    }

    #[test]
    fn test_deserialize_status_request() {
        let req: StatusRequest = serde_json::from_str(r#"{"active": true}"#).unwrap();
        assert!(req.active);
    }

    #[tokio::test]
    async fn test_module_lifecycle_over_http() {
        let (_tmp, app, _state) = test_app().await;

        let (status, body) = call(&app, "POST", "/api/modules/scan", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Module scan complete");
        assert_eq!(body["summary"]["added"], json!(["finance", "hr"]));

        let (status, body) = call(&app, "GET", "/api/modules", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[1]["displayName"], "Human Resources");

        let (status, body) = call(&app, "POST", "/api/modules/finance/install", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["missingDependencies"], json!(["hr"]));

        let (status, body) = call(&app, "POST", "/api/modules/hr/install", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["installed"], true);

        // Installed but inactive: not mounted yet.
        let (status, _) = call(&app, "GET", "/api/hr/employees", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &app,
            "PUT",
            "/api/modules/hr/status",
            Some(json!({ "active": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], true);

        let (status, body) = call(&app, "GET", "/api/hr/employees", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!([]));

        let (status, body) = call(&app, "POST", "/api/modules/routes/reload", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["mounted"], json!(["hr"]));

        let (status, body) = call(&app, "POST", "/api/modules/hr/uninstall", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["installed"], false);
        assert_eq!(body["active"], false);

        let (status, _) = call(&app, "GET", "/api/hr/employees", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_module_is_404() {
        let (_tmp, app, _state) = test_app().await;
        call(&app, "POST", "/api/modules/scan", None).await;

        let (status, _) = call(&app, "GET", "/api/modules/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(&app, "POST", "/api/modules/ghost/install", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = call(
            &app,
            "PUT",
            "/api/modules/ghost/status",
            Some(json!({ "active": true })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dependency_guards_over_http() {
        let (_tmp, app, _state) = test_app().await;
        call(&app, "POST", "/api/modules/scan", None).await;
        call(&app, "POST", "/api/modules/hr/install", None).await;
        call(&app, "POST", "/api/modules/finance/install", None).await;

        let (status, body) = call(&app, "POST", "/api/modules/hr/uninstall", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["dependentModules"], json!(["finance"]));

        let active = Some(json!({ "active": true }));
        let (status, body) = call(&app, "PUT", "/api/modules/finance/status", active.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["inactiveDependencies"], json!(["hr"]));

        call(&app, "PUT", "/api/modules/hr/status", active.clone()).await;
        call(&app, "PUT", "/api/modules/finance/status", active).await;

        let (status, body) = call(
            &app,
            "PUT",
            "/api/modules/hr/status",
            Some(json!({ "active": false })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["dependentModules"], json!(["finance"]));
    }
}
