use axum::routing::get;
use axum::{Extension, Json, Router};
use erp_addon::routes::{MountFn, RouteExport};
use sea_orm::{DatabaseConnection, JsonValue};

use super::{all_rows, db_error, ApiError};
use crate::DEPARTMENT_TABLE;

/// GET /api/hr/departments
async fn list_departments(
    Extension(db): Extension<DatabaseConnection>,
) -> Result<Json<Vec<JsonValue>>, ApiError> {
    let rows = all_rows(&db, DEPARTMENT_TABLE).await.map_err(db_error)?;
    Ok(Json(rows))
}

fn mount(router: Router) -> Router {
    router.route("/departments", get(list_departments))
}

pub fn export() -> RouteExport {
    RouteExport::mount_fn(mount as MountFn)
}
