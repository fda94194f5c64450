//! REST API endpoint tests (tower test utilities, no server needed).

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Float64Array, Int64Array, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use querylane::config::HttpConfig;
use querylane::protocol::rest::create_router;
use querylane::protocol::Handler;
use querylane::{Config, DataFusionExecutor};
use serde_json::{json, Value};
use tower::ServiceExt;

const BASE: &str = "http://127.0.0.1:8080";

fn create_test_app_with(config: &Config) -> (axum::Router, Arc<DataFusionExecutor>) {
    let executor = Arc::new(DataFusionExecutor::new());
    let handler = Arc::new(Handler::new(executor.clone(), config));
    let app = create_router(handler, &config.http);
    (app, executor)
}

fn create_test_app() -> (axum::Router, Arc<DataFusionExecutor>) {
    create_test_app_with(&Config::default())
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap_or(json!({}));
    (status, json)
}

/// Absolute protocol URI → request path.
fn path_of(uri: &str) -> &str {
    uri.strip_prefix(BASE)
        .unwrap_or_else(|| panic!("unexpected base in {uri}"))
}

async fn submit(app: &axum::Router, sql: &str) -> Value {
    let (status, json) = send(app, "POST", "/v1/statement", sql).await;
    assert_eq!(status, StatusCode::OK);
    json
}

/// Follow `nextUri` links until the statement resolves. Returns every
/// result page (or the single error response).
async fn follow(app: &axum::Router, submitted: &Value) -> Vec<Value> {
    assert!(submitted.get("error").is_none(), "rejected: {submitted}");
    let mut next = submitted["nextUri"].as_str().unwrap().to_string();
    let mut pages = Vec::new();

    for _ in 0..500 {
        let (status, json) = send(app, "GET", path_of(&next), "").await;
        assert_eq!(status, StatusCode::OK, "{json}");

        let pending = json.get("stats").is_some();
        if !pending {
            pages.push(json.clone());
        }
        match json.get("nextUri").and_then(Value::as_str) {
            Some(uri) => next = uri.to_string(),
            None => return pages,
        }
        if pending {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
    panic!("statement did not resolve");
}

async fn query(app: &axum::Router, sql: &str) -> Value {
    let submitted = submit(app, sql).await;
    let mut pages = follow(app, &submitted).await;
    assert_eq!(pages.len(), 1, "expected a single page");
    pages.remove(0)
}

fn column(name: &str, sql_type: &str) -> Value {
    json!({
        "name": name,
        "type": sql_type,
        "typeSignature": {"rawType": sql_type, "arguments": []}
    })
}

// Routing

#[tokio::test]
async fn test_routes() {
    let (app, _) = create_test_app();

    let (status, _) = send(&app, "POST", "/v1/statement", "SELECT 1 + 1").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/v1/statement", "SELECT 1 + 1").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, _) = send(&app, "GET", "/v1/empty", "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "GET", "/v1/status/some-wrong-uuid", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "DELETE", "/v1/cancel/some-wrong-uuid", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, "GET", "/v1/cancel/some-wrong-uuid", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_unknown_uuid_is_404() {
    let (app, _) = create_test_app();
    let id = uuid::Uuid::new_v4();
    let (status, json) = send(&app, "GET", &format!("/v1/status/{id}"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"]["message"].as_str().is_some());
}

// Submission

#[tokio::test]
async fn test_submit_returns_handle() {
    let (app, _) = create_test_app();
    let json = submit(&app, "SELECT 1 + 1").await;

    let id = json["id"].as_str().unwrap();
    assert_eq!(json["nextUri"], format!("{BASE}/v1/status/{id}"));
    assert_eq!(json["partialCancelUri"], format!("{BASE}/v1/cancel/{id}"));
    assert!(json.get("error").is_none());
}

#[tokio::test]
async fn test_host_header_drives_uris() {
    let (app, _) = create_test_app();
    let req = Request::builder()
        .method("POST")
        .uri("/v1/statement")
        .header("host", "sql.internal:7000")
        .body(Body::from("SELECT 1"))
        .unwrap();
    let response = app.oneshot(req).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["nextUri"]
        .as_str()
        .unwrap()
        .starts_with("http://sql.internal:7000/v1/status/"));
}

#[tokio::test]
async fn test_wrong_sql_query() {
    let (app, _) = create_test_app();
    let json = submit(&app, "SELECT 1 + ").await;

    assert!(json.get("columns").is_none());
    assert!(json.get("data").is_none());
    assert!(json.get("nextUri").is_none());
    assert!(json["error"]["message"].as_str().is_some());
    assert_eq!(json["error"]["errorName"], "SYNTAX_ERROR");
    assert_eq!(json["error"]["errorType"], "USER_ERROR");
}

#[tokio::test]
async fn test_unknown_table_is_rejected_inline() {
    let (app, _) = create_test_app();
    let json = submit(&app, "SELECT * FROM does_not_exist").await;
    assert!(json["error"]["message"]
        .as_str()
        .unwrap()
        .contains("does_not_exist"));
}

// Results

#[tokio::test]
async fn test_sql_query() {
    let (app, _) = create_test_app();
    let result = query(&app, "SELECT 1 + 1").await;

    assert!(result.get("error").is_none());
    assert!(result.get("nextUri").is_none());
    assert_eq!(
        result["columns"],
        json!([column("Int64(1) + Int64(1)", "bigint")])
    );
    assert_eq!(result["data"], json!([[2]]));
}

#[tokio::test]
async fn test_register_and_query() {
    let (app, executor) = create_test_app();
    let schema = Arc::new(Schema::new(vec![
        Field::new("a", DataType::UInt8, false),
        Field::new("b", DataType::Float64, false),
    ]));
    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(UInt8Array::from_iter_values((0..700).map(|i| (i % 256) as u8))),
            Arc::new(Float64Array::from_iter_values((0..700).map(|i| i as f64 / 2.0))),
        ],
    )
    .unwrap();
    executor.register_batch("new_table", batch).unwrap();

    let result = query(&app, "SELECT * FROM new_table").await;
    assert_eq!(
        result["columns"],
        json!([column("a", "tinyint"), column("b", "double")])
    );
    assert_eq!(result["data"].as_array().unwrap().len(), 700);
    assert_eq!(result["data"][3], json!([3, 1.5]));
}

#[tokio::test]
async fn test_inf_table() {
    let (app, executor) = create_test_app();
    let schema = Arc::new(Schema::new(vec![Field::new("c", DataType::Float64, false)]));
    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(Float64Array::from(vec![
            3.0,
            f64::INFINITY,
            f64::NEG_INFINITY,
        ]))],
    )
    .unwrap();
    executor.register_batch("inf_table", batch).unwrap();

    let result = query(&app, "SELECT * FROM inf_table").await;
    assert_eq!(result["columns"], json!([column("c", "double")]));
    assert_eq!(result["data"], json!([[3.0], ["+Infinity"], ["-Infinity"]]));
}

#[tokio::test]
async fn test_nullable_int_table() {
    let (app, executor) = create_test_app();
    let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
    let batch =
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![None::<i64>]))]).unwrap();
    executor.register_batch("null_table", batch).unwrap();

    let result = query(&app, "SELECT * FROM null_table").await;
    assert_eq!(result["columns"], json!([column("a", "bigint")]));
    assert_eq!(result["data"], json!([[null]]));
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let (app, executor) = create_test_app();
    let schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int64, true)]));
    executor.register_table("empty", schema, vec![]).unwrap();

    let result = query(&app, "SELECT a FROM empty").await;
    assert_eq!(result["columns"], json!([column("a", "bigint")]));
    assert_eq!(result["data"], json!([]));
    assert!(result.get("nextUri").is_none());
}

#[tokio::test]
async fn test_add_csv_table_and_query() {
    let (app, _) = create_test_app();
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "a,b").unwrap();
    for i in 0..700 {
        writeln!(file, "{}.5,{}", i, i * 2).unwrap();
    }
    file.flush().unwrap();

    let ddl = format!(
        "CREATE EXTERNAL TABLE csv_table (a DOUBLE, b DOUBLE) STORED AS CSV LOCATION '{}' \
         OPTIONS ('format.has_header' 'true')",
        file.path().display()
    );
    let created = submit(&app, &ddl).await;
    assert!(created.get("error").is_none(), "{created}");
    follow(&app, &created).await;

    let result = query(&app, "SELECT * FROM csv_table").await;
    assert_eq!(
        result["columns"],
        json!([column("a", "double"), column("b", "double")])
    );
    assert_eq!(result["data"].as_array().unwrap().len(), 700);
}

#[tokio::test]
async fn test_execution_error_is_reported_on_poll() {
    let (app, _) = create_test_app();
    let submitted = submit(&app, "SELECT CAST('abc' AS INT)").await;
    let pages = follow(&app, &submitted).await;

    let failed = &pages[0];
    assert_eq!(failed["id"], submitted["id"]);
    assert!(failed.get("columns").is_none());
    assert!(failed.get("data").is_none());
    assert!(failed["error"]["message"].as_str().is_some());
    assert_eq!(failed["error"]["errorName"], "EXECUTION_ERROR");
}

#[tokio::test]
async fn test_create_table_as_is_polled_like_a_query() {
    let (app, _) = create_test_app();
    let submitted = submit(&app, "CREATE TABLE made AS SELECT 7 AS x").await;
    assert!(submitted.get("error").is_none(), "{submitted}");
    assert!(submitted["nextUri"].as_str().is_some());
    follow(&app, &submitted).await;

    let result = query(&app, "SELECT x FROM made").await;
    assert_eq!(result["data"], json!([[7]]));
}

#[tokio::test]
async fn test_failing_create_table_as_is_reported_on_poll() {
    let (app, _) = create_test_app();
    let submitted = submit(&app, "CREATE TABLE broken AS SELECT CAST('abc' AS INT) AS x").await;
    assert!(submitted.get("error").is_none(), "{submitted}");

    let pages = follow(&app, &submitted).await;
    let failed = pages.last().unwrap();
    assert_eq!(failed["id"], submitted["id"]);
    assert_eq!(failed["error"]["errorName"], "EXECUTION_ERROR");
}

// Pagination

#[tokio::test]
async fn test_pages_partition_rows() {
    let mut config = Config::default();
    config.pagination.max_rows = 3;
    let (app, executor) = create_test_app_with(&config);

    let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, false)]));
    let batch =
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from_iter_values(0..10))]).unwrap();
    executor.register_batch("numbers", batch).unwrap();

    let submitted = submit(&app, "SELECT n FROM numbers").await;
    let pages = follow(&app, &submitted).await;
    assert_eq!(pages.len(), 4);

    let mut rows = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page["columns"], json!([column("n", "bigint")]));
        assert_eq!(page.get("nextUri").is_some(), i + 1 < pages.len());
        rows.extend(page["data"].as_array().unwrap().iter().cloned());
    }
    let expected: Vec<Value> = (0..10).map(|n| json!([n])).collect();
    assert_eq!(rows, expected);
}

#[tokio::test]
async fn test_forged_token_is_404() {
    let mut config = Config::default();
    config.pagination.max_rows = 1;
    let (app, _) = create_test_app_with(&config);

    let submitted = submit(&app, "SELECT * FROM (VALUES (1), (2)) AS t(x)").await;
    let id = submitted["id"].as_str().unwrap().to_string();
    follow(&app, &submitted).await;

    let (status, _) = send(&app, "GET", &format!("/v1/status/{id}/1-deadbeef"), "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// Cancellation

#[tokio::test]
async fn test_sql_query_cancel() {
    let (app, _) = create_test_app();
    let submitted = submit(&app, "SELECT 1 + 1").await;
    let cancel = path_of(submitted["partialCancelUri"].as_str().unwrap()).to_string();

    let (status, _) = send(&app, "DELETE", &cancel, "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, "DELETE", &cancel, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let status_path = path_of(submitted["nextUri"].as_str().unwrap()).to_string();
    let (status, _) = send(&app, "GET", &status_path, "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// Info

#[tokio::test]
async fn test_info_counts() {
    let (app, _) = create_test_app();
    let submitted = submit(&app, "SELECT 1").await;
    follow(&app, &submitted).await;
    submit(&app, "SELECT 1 +").await;

    let (status, json) = send(&app, "GET", "/v1/info", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(json["submitted"], 2);
    assert_eq!(json["rejected"], 1);
    assert_eq!(json["queries"]["finished"], 1);
    assert_eq!(json["queries"]["totalCreated"], 1);
}

#[tokio::test]
async fn test_capacity_exceeded_is_503() {
    let mut config = Config::default();
    config.query.max_queries = 1;
    let executor = Arc::new(DataFusionExecutor::new());
    let handler = Arc::new(Handler::new(executor, &config));
    handler.registry().create("SELECT 1").unwrap();
    let app = create_router(handler, &HttpConfig::default());

    let (status, json) = send(&app, "POST", "/v1/statement", "SELECT 2").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["errorName"], "SERVER_OVERLOADED");
}
