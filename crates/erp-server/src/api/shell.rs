//! Client shell endpoint: the aggregated view of every registered addon.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use erp_addon::client::build_menu_tree;
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// GET /api/shell — Addons, routes and menus for the client host.
///
/// Answers 503 until the addon loader has finished.
pub async fn get_shell(State(state): State<Arc<AppState>>) -> Response {
    if !state.addons.is_ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "loading" })),
        )
            .into_response();
    }

    let view = state.addons.client_view();
    let tree = build_menu_tree(&view.menus);
    Json(json!({
        "addons": view.addons,
        "routes": view.routes,
        "menus": view.menus,
        "menuTree": tree,
    }))
    .into_response()
}
