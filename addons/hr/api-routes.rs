use std::sync::Arc;

use axum::routing::get;
use axum::{Extension, Json, Router};
use erp_addon::routes::{RouteExport, RouteRegistrar};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};

use crate::routes::{count_rows, db_error, ApiError};
use crate::{DEPARTMENT_TABLE, EMPLOYEE_TABLE};

/// GET /api/hr/summary
async fn summary(Extension(db): Extension<DatabaseConnection>) -> Result<Json<Value>, ApiError> {
    let employees = count_rows(&db, EMPLOYEE_TABLE).await.map_err(db_error)?;
    let departments = count_rows(&db, DEPARTMENT_TABLE).await.map_err(db_error)?;
    Ok(Json(json!({
        "module": crate::NAME,
        "employees": employees,
        "departments": departments,
    })))
}

struct HrApi;

impl RouteRegistrar for HrApi {
    fn register(&self, router: Router) -> Router {
        router.route("/summary", get(summary))
    }
}

pub fn export() -> RouteExport {
    RouteExport::registrar(Arc::new(HrApi))
}
