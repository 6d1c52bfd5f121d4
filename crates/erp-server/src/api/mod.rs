pub mod modules;
pub mod shell;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware as axum_middleware,
    response::Response,
    routing::{get, post, put},
    Router,
};

use crate::auth::{self, AdminToken};
use crate::state::AppState;

/// Everything under `/api`: module management, the client shell, and the
/// module routers as fallback.
pub fn router(state: Arc<AppState>) -> Router {
    let token = AdminToken::new(state.config.admin_token.as_deref());

    let module_admin = Router::new()
        .route("/modules", get(modules::list_modules))
        .route("/modules/scan", post(modules::scan_modules))
        .route("/modules/routes/reload", post(modules::reload_routes))
        .route("/modules/{name}", get(modules::get_module))
        .route("/modules/{name}/status", put(modules::set_module_status))
        .route("/modules/{name}/install", post(modules::install_module))
        .route("/modules/{name}/uninstall", post(modules::uninstall_module))
        .route_layer(axum_middleware::from_fn_with_state(
            token,
            auth::require_admin_token,
        ));

    Router::new()
        .merge(module_admin)
        .route("/shell", get(shell::get_shell))
        .fallback(dispatch_module)
        .with_state(state)
}

/// Fallback: hand the request to the mounted module router.
async fn dispatch_module(State(state): State<Arc<AppState>>, request: Request) -> Response {
    state.routes.dispatch(request).await
}
