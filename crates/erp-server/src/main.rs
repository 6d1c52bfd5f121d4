use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use erp_addon::client::{AddonLoader, AddonManager, LoaderConfig};
use erp_addon::{ModuleLifecycle, RouteManager};
use sea_orm_migration::MigratorTrait;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod api;
mod auth;
mod config;
mod state;
#[cfg(test)]
mod test_support;

use config::ServerConfig;
use state::AppState;

#[derive(Serialize)]
struct ApiStatus {
    status: &'static str,
    version: &'static str,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = ServerConfig::from_env();
    if config.admin_token.is_none() {
        tracing::warn!(
            "ERP_ADMIN_TOKEN is not set, module management and module routes are unprotected"
        );
    }

    // Database connection
    let db_config = erp_db::DatabaseConfig::from_env();
    tracing::info!("connecting to database...");
    let db = erp_db::connect(&db_config)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("running database migrations...");
    erp_migration::Migrator::up(&db, None)
        .await
        .expect("failed to run migrations");
    tracing::info!("migrations complete");

    // Sync module rows with the addons directory
    let lifecycle = ModuleLifecycle::new(db.clone(), config.addons_dir.clone());
    let report = lifecycle
        .scan_modules()
        .await
        .expect("failed to scan addons directory");
    tracing::info!(
        addons_dir = %config.addons_dir.display(),
        modules = report.summary.total,
        "addons scanned"
    );

    if config.auto_install {
        match lifecycle.auto_install().await {
            Ok(activated) if !activated.is_empty() => {
                tracing::info!(modules = ?activated, "auto-installed modules");
            }
            Ok(_) => {}
            Err(e) => tracing::error!("auto-install failed: {e}"),
        }
    }

    let routes = Arc::new(build_route_manager(db.clone(), &config));
    if let Err(e) = routes.initialize().await {
        tracing::error!("failed to mount module routes: {e}");
    }

    let addons = Arc::new(AddonManager::new());
    let state = Arc::new(AppState {
        db: db.clone(),
        config: config.clone(),
        lifecycle,
        routes,
        addons: addons.clone(),
    });

    // Client addon registry, loaded in the background; /api/shell answers
    // 503 until it is done.
    let loader = AddonLoader::new(
        Arc::new(state::addon_catalog()),
        state::state_source(db, LoaderConfig::from_env()),
    )
    .with_registry(&config.addons_dir)
    .await;
    let loader_manager = addons.clone();
    tokio::spawn(async move {
        let report = loader.load(&loader_manager).await;
        tracing::info!(registered = ?report.registered, "client addons ready");
    });

    let app = build_app(state);

    tracing::info!(addr = %config.bind_addr, "server started");
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .expect("failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    addons.cleanup();
    tracing::info!("server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

fn build_route_manager(db: sea_orm::DatabaseConnection, config: &ServerConfig) -> RouteManager {
    RouteManager::builder(db, state::route_catalog())
        .global_middleware(auth::module_guard(auth::AdminToken::new(
            config.admin_token.as_deref(),
        )))
        .build()
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::PUT,
        axum::http::Method::DELETE,
        axum::http::Method::OPTIONS,
    ];

    if config.cors_origins.is_empty() {
        tracing::warn!("CORS_ORIGINS not set, defaulting to same-origin only");
        return CorsLayer::new()
            .allow_origin(AllowOrigin::list(Vec::<HeaderValue>::new()))
            .allow_methods(methods);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();
    tracing::info!("CORS allowed origins: {:?}", origins);
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(tower_http::cors::Any)
        .expose_headers(tower_http::cors::Any)
}

/// 500 response for a panicking handler. The panic message is only exposed
/// outside production.
fn panic_response(production: bool, err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| err.downcast_ref::<&str>().map(|s| s.to_string()))
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!("request handler panicked: {detail}");

    let body = if production {
        json!({ "error": "Internal server error" })
    } else {
        json!({ "error": "Internal server error", "message": detail })
    };
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

fn build_app(state: Arc<AppState>) -> Router {
    let production = state.config.is_production();
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api::router(state))
        .layer(CatchPanicLayer::custom(move |err| panic_response(production, err)))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
}

async fn healthz() -> Json<ApiStatus> {
    Json(ApiStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
