use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use erp_addon::routes::RouteExport;
use sea_orm::{DatabaseConnection, JsonValue};
use serde_json::json;

use super::{all_rows, db_error, row_by_id, ApiError};
use crate::EMPLOYEE_TABLE;

/// GET /api/hr/employees
async fn list_employees(
    Extension(db): Extension<DatabaseConnection>,
) -> Result<Json<Vec<JsonValue>>, ApiError> {
    let rows = all_rows(&db, EMPLOYEE_TABLE).await.map_err(db_error)?;
    Ok(Json(rows))
}

/// GET /api/hr/employees/{id}
async fn get_employee(
    Extension(db): Extension<DatabaseConnection>,
    Path(id): Path<i64>,
) -> Result<Json<JsonValue>, ApiError> {
    row_by_id(&db, EMPLOYEE_TABLE, id)
        .await
        .map_err(db_error)?
        .map(Json)
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("employee {id} not found") })),
            )
        })
}

pub fn router() -> Router {
    Router::new()
        .route("/employees", get(list_employees))
        .route("/employees/{id}", get(get_employee))
}

pub fn export() -> RouteExport {
    RouteExport::router(router())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get_json, hr_db};

    #[tokio::test]
    async fn test_list_and_get() {
        let db = hr_db().await;

        let (status, body) = get_json(router(), db.clone(), "/employees").await;
        assert_eq!(status, 200);
        assert_eq!(body.as_array().unwrap().len(), 3);

        let (status, body) = get_json(router(), db.clone(), "/employees/2").await;
        assert_eq!(status, 200);
        assert_eq!(body["name"], "Grace");

        let (status, _) = get_json(router(), db, "/employees/99").await;
        assert_eq!(status, 404);
    }
}
