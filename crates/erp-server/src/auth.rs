use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use erp_addon::GlobalMiddleware;
use serde_json::json;

/// Expected bearer token for protected routes. `None` disables the check.
#[derive(Clone, Default)]
pub struct AdminToken(pub Option<Arc<str>>);

impl AdminToken {
    pub fn new(token: Option<&str>) -> Self {
        Self(token.map(Arc::from))
    }
}

/// Middleware: require `Authorization: Bearer <ERP_ADMIN_TOKEN>`
pub async fn require_admin_token(
    State(expected): State<AdminToken>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = expected.0 else {
        return next.run(request).await;
    };

    let token = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    match token {
        Some(t) if t == &*expected => next.run(request).await,
        Some(_) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Invalid admin token" })),
        )
            .into_response(),
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Missing or invalid Authorization header" })),
        )
            .into_response(),
    }
}

/// The admin token check as a module-router middleware.
pub fn module_guard(token: AdminToken) -> GlobalMiddleware {
    GlobalMiddleware::new("admin-token", move |router: Router| {
        router.route_layer(axum_middleware::from_fn_with_state(
            token.clone(),
            require_admin_token,
        ))
    })
}
