//! Server-side module routing.
//!
//! Each active, installed module gets its own axum [`Router`], built from
//! the module's route sources and stored under its name. The
//! [`RouteManager`] answers everything below `/api` that the core API does
//! not: the first path segment picks the module router and the rest of the
//! path is forwarded to it. Routers can be rebuilt or removed at runtime
//! after install, uninstall or a status toggle.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use erp_db::entities::module;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde_json::json;
use tokio::sync::RwLock;
use tower::ServiceExt;

use crate::catalog::{RouteCatalog, RouteSource};
use crate::error::AddonError;

/// A complete router exported by a route source; merged as is.
pub struct ModuleRouter {
    pub router: Router,
}

/// A function that adds routes to the module router it is given.
pub type MountFn = fn(Router) -> Router;

/// An object that adds routes to the module router it is given.
pub trait RouteRegistrar: Send + Sync {
    fn register(&self, router: Router) -> Router;
}

/// Type-erased export of a route source.
///
/// Recognized shapes, tried in this order: [`ModuleRouter`], [`MountFn`],
/// `Arc<dyn RouteRegistrar>`. Anything else is skipped at mount time.
pub struct RouteExport(Box<dyn Any + Send + Sync>);

impl RouteExport {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn router(router: Router) -> Self {
        Self::new(ModuleRouter { router })
    }

    pub fn mount_fn(f: MountFn) -> Self {
        Self::new(f)
    }

    pub fn registrar(registrar: Arc<dyn RouteRegistrar>) -> Self {
        Self::new(registrar)
    }

    /// Apply the export to `router`. `None` when the shape is not recognized.
    fn mount(self, router: Router) -> Option<Router> {
        let any = match self.0.downcast::<ModuleRouter>() {
            Ok(m) => return Some(router.merge(m.router)),
            Err(any) => any,
        };
        let any = match any.downcast::<MountFn>() {
            Ok(f) => return Some((*f)(router)),
            Err(any) => any,
        };
        match any.downcast::<Arc<dyn RouteRegistrar>>() {
            Ok(r) => Some(r.register(router)),
            Err(_) => None,
        }
    }
}

/// Middleware applied to every module router, in registration order.
#[derive(Clone)]
pub struct GlobalMiddleware {
    name: String,
    apply: Arc<dyn Fn(Router) -> Router + Send + Sync>,
}

impl GlobalMiddleware {
    pub fn new(name: &str, apply: impl Fn(Router) -> Router + Send + Sync + 'static) -> Self {
        Self {
            name: name.to_string(),
            apply: Arc::new(apply),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub struct RouteManagerBuilder {
    db: DatabaseConnection,
    catalog: RouteCatalog,
    middleware: Vec<GlobalMiddleware>,
}

impl RouteManagerBuilder {
    pub fn global_middleware(mut self, middleware: GlobalMiddleware) -> Self {
        tracing::debug!(middleware = %middleware.name, "global middleware registered");
        self.middleware.push(middleware);
        self
    }

    pub fn build(self) -> RouteManager {
        RouteManager {
            db: self.db,
            catalog: self.catalog,
            middleware: self.middleware,
            mounted: RwLock::new(BTreeMap::new()),
        }
    }
}

/// Registry of mounted module routers.
pub struct RouteManager {
    db: DatabaseConnection,
    catalog: RouteCatalog,
    middleware: Vec<GlobalMiddleware>,
    mounted: RwLock<BTreeMap<String, Router>>,
}

impl RouteManager {
    pub fn builder(db: DatabaseConnection, catalog: RouteCatalog) -> RouteManagerBuilder {
        RouteManagerBuilder {
            db,
            catalog,
            middleware: Vec::new(),
        }
    }

    /// Mount routes for every module that is active, installed and
    /// installable, in name order. Returns the mounted module names.
    pub async fn initialize(&self) -> Result<Vec<String>, AddonError> {
        let rows = module::Entity::find()
            .filter(module::Column::Active.eq(true))
            .filter(module::Column::Installed.eq(true))
            .filter(module::Column::Installable.eq(true))
            .order_by_asc(module::Column::Name)
            .all(&self.db)
            .await?;

        for row in &rows {
            self.load_module_routes(&row.name).await;
        }

        let mounted = self.mounted_modules().await;
        tracing::info!(count = mounted.len(), "module routes initialized");
        Ok(mounted)
    }

    fn apply_source(&self, module: &str, source: &RouteSource, router: Router) -> (Router, bool) {
        let fallback = router.clone();
        let result = catch_unwind(AssertUnwindSafe(|| (source.export)().mount(router)));
        match result {
            Ok(Some(router)) => {
                tracing::debug!(module = %module, file = source.file, "route source mounted");
                (router, true)
            }
            Ok(None) => {
                tracing::warn!(
                    module = %module,
                    file = source.file,
                    "route source exports no recognized router shape, skipping"
                );
                (fallback, false)
            }
            Err(_) => {
                tracing::error!(module = %module, file = source.file, "route source panicked while mounting");
                (fallback, false)
            }
        }
    }

    /// Build and mount the router of `name`, replacing any previous one.
    /// Returns how many route sources were mounted.
    pub async fn load_module_routes(&self, name: &str) -> usize {
        let mut router = Router::new();
        let mut count = 0;

        if let Some(sources) = self.catalog.get(name) {
            for source in sources.routes.iter().chain(sources.api_routes.iter()) {
                let (next, mounted) = self.apply_source(name, source, router);
                router = next;
                count += usize::from(mounted);
            }
        }

        if count == 0 {
            let module = name.to_string();
            router = Router::new().route(
                "/",
                get(move || async move { Json(json!({ "module": module, "routes": [] })) }),
            );
            tracing::debug!(module = %name, "no route sources mounted, using placeholder");
        }

        for mw in &self.middleware {
            router = (mw.apply)(router);
        }
        router = router.layer(Extension(self.db.clone()));

        self.mounted.write().await.insert(name.to_string(), router);
        tracing::info!(module = %name, path = %format!("/api/{name}"), sources = count, "module routes mounted");
        count
    }

    /// Rebuild the router of `name`, or unmount it when the module is no
    /// longer active, installed and installable. Returns whether it is
    /// mounted afterwards.
    pub async fn reload_module_routes(&self, name: &str) -> Result<bool, AddonError> {
        let row = module::Entity::find()
            .filter(module::Column::Name.eq(name))
            .one(&self.db)
            .await?;

        match row {
            Some(r) if r.active && r.installed && r.installable => {
                self.load_module_routes(name).await;
                Ok(true)
            }
            _ => {
                self.unload_module_routes(name).await;
                Ok(false)
            }
        }
    }

    /// Drop every router and mount again from the database.
    pub async fn reload_all_routes(&self) -> Result<Vec<String>, AddonError> {
        self.mounted.write().await.clear();
        self.initialize().await
    }

    pub async fn unload_module_routes(&self, name: &str) -> bool {
        let removed = self.mounted.write().await.remove(name).is_some();
        if removed {
            tracing::info!(module = %name, "module routes unmounted");
        }
        removed
    }

    pub async fn mounted_modules(&self) -> Vec<String> {
        self.mounted.read().await.keys().cloned().collect()
    }

    pub async fn is_mounted(&self, name: &str) -> bool {
        self.mounted.read().await.contains_key(name)
    }

    async fn documentation(&self) -> serde_json::Value {
        let paths: Vec<String> = self
            .mounted_modules()
            .await
            .into_iter()
            .map(|n| format!("/api/{n}"))
            .collect();
        json!({ "message": "ERP module API", "modules": paths })
    }

    /// Forward a request (path relative to `/api`) to its module router.
    pub async fn dispatch(&self, req: Request) -> Response {
        let path = req.uri().path().trim_start_matches('/');
        let (segment, rest) = match path.split_once('/') {
            Some((segment, rest)) => (segment.to_string(), format!("/{rest}")),
            None => (path.to_string(), "/".to_string()),
        };

        if segment.is_empty() {
            return Json(self.documentation().await).into_response();
        }

        let router = self.mounted.read().await.get(&segment).cloned();
        let Some(router) = router else {
            let mut body = self.documentation().await;
            body["error"] = json!(format!("no module mounted at /api/{segment}"));
            return (StatusCode::NOT_FOUND, Json(body)).into_response();
        };

        let (mut parts, body) = req.into_parts();
        let path_and_query = match parts.uri.query() {
            Some(q) => format!("{rest}?{q}"),
            None => rest,
        };
        let mut uri_parts = parts.uri.clone().into_parts();
        uri_parts.path_and_query = match path_and_query.parse() {
            Ok(pq) => Some(pq),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid request path" })),
                )
                    .into_response()
            }
        };
        parts.uri = match Uri::from_parts(uri_parts) {
            Ok(uri) => uri,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "invalid request path" })),
                )
                    .into_response()
            }
        };

        match router.oneshot(Request::from_parts(parts, body)).await {
            Ok(resp) => resp,
            Err(never) => match never {},
        }
    }

    /// Router answering every path by [`dispatch`](Self::dispatch). Meant to
    /// be nested under `/api` (or used as its fallback).
    pub fn router(self: &Arc<Self>) -> Router {
        let manager = self.clone();
        Router::new().fallback(move |req: Request<Body>| {
            let manager = manager.clone();
            async move { manager.dispatch(req).await }
        })
    }
}
