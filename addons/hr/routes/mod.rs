pub mod departments;
pub mod employees;

use axum::http::StatusCode;
use axum::Json;
use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, FromQueryResult, JsonValue, Statement};
use serde_json::json;

pub type ApiError = (StatusCode, Json<JsonValue>);

pub fn db_error(e: DbErr) -> ApiError {
    tracing::error!(module = crate::NAME, "query failed: {e}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("DB error: {e}") })),
    )
}

/// Every row of `table` as JSON objects, ordered by id.
pub async fn all_rows(db: &DatabaseConnection, table: &str) -> Result<Vec<JsonValue>, DbErr> {
    let backend = db.get_database_backend();
    JsonValue::find_by_statement(Statement::from_string(
        backend,
        format!("SELECT * FROM {table} ORDER BY id"),
    ))
    .all(db)
    .await
}

/// One row of `table` by id.
pub async fn row_by_id(
    db: &DatabaseConnection,
    table: &str,
    id: i64,
) -> Result<Option<JsonValue>, DbErr> {
    let backend = db.get_database_backend();
    let placeholder = match backend {
        sea_orm::DatabaseBackend::Postgres => "$1",
        _ => "?",
    };
    JsonValue::find_by_statement(Statement::from_sql_and_values(
        backend,
        format!("SELECT * FROM {table} WHERE id = {placeholder}"),
        [id.into()],
    ))
    .one(db)
    .await
}

/// Number of rows in `table`.
pub async fn count_rows(db: &DatabaseConnection, table: &str) -> Result<i64, DbErr> {
    let backend = db.get_database_backend();
    let row = db
        .query_one(Statement::from_string(
            backend,
            format!("SELECT COUNT(*) AS n FROM {table}"),
        ))
        .await?;
    match row {
        Some(r) => r.try_get::<i64>("", "n"),
        None => Ok(0),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::Request;
    use axum::{Extension, Router};
    use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
    use tower::ServiceExt;

    /// SQLite database with the hr tables created from `models/`.
    pub async fn hr_db() -> DatabaseConnection {
        let mut opt = ConnectOptions::new("sqlite::memory:");
        opt.max_connections(1).sqlx_logging(false);
        let db = Database::connect(opt).await.unwrap();

        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
        let defs = erp_addon::schema::load_model_definitions(dir).await.unwrap();
        let defs = erp_addon::schema::order_by_associations(&defs).unwrap();
        erp_addon::schema::sync_models(&db, crate::NAME, &defs)
            .await
            .unwrap();

        for sql in [
            "INSERT INTO hr_department (name) VALUES ('Engineering'), ('Sales')",
            "INSERT INTO hr_employee (name, email, department_id) VALUES \
                ('Ada', 'ada@example.com', 1), \
                ('Grace', 'grace@example.com', 1), \
                ('Linus', 'linus@example.com', 2)",
        ] {
            db.execute_unprepared(sql).await.unwrap();
        }
        db
    }

    pub async fn get_json(router: Router, db: DatabaseConnection, uri: &str) -> (u16, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let resp = router.layer(Extension(db)).oneshot(req).await.unwrap();
        let status = resp.status().as_u16();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or_default())
    }
}
