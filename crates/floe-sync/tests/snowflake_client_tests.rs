//! Snowflake SQL API client tests against a local axum server.

#![allow(clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use floe_core::TableIdent;
use floe_sync::command::{Command, CommandKind};
use floe_sync::error::Error;
use floe_sync::executor::CommandExecutor;
use floe_sync::retry::RetryPolicy;
use floe_sync::schema::SchemaMapping;
use floe_sync::warehouse::Warehouse;
use floe_sync::warehouse::snowflake::{
    SnowflakeConfig, SnowflakeWarehouse, TOKEN_TYPE_HEADER, TokenType,
};

const HANDLE: &str = "01b2c3d4-0000-0000-0000-000000000001";

#[derive(Clone, Copy)]
enum ServerMode {
    Immediate,
    Async { pending_polls: usize },
    Reject,
    FailFirst,
    NeverFinishes,
}

#[derive(Debug, Clone)]
struct Recorded {
    query: HashMap<String, String>,
    headers: HashMap<String, String>,
    body: Value,
}

#[derive(Clone)]
struct ServerState {
    mode: ServerMode,
    requests: Arc<Mutex<Vec<Recorded>>>,
    polls: Arc<AtomicUsize>,
}

fn finished() -> Value {
    json!({
        "resultSetMetaData": {"numRows": 1, "rowType": [{"name": "status", "type": "text"}]},
        "data": [["Statement executed successfully."]],
        "code": "090001",
        "statementHandle": HANDLE,
        "message": "Statement executed successfully."
    })
}

fn pending() -> Value {
    json!({
        "code": "333334",
        "message": "Asynchronous execution in progress.",
        "statementHandle": HANDLE,
        "statementStatusUrl": format!("/api/v2/statements/{HANDLE}")
    })
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect()
}

async fn submit_handler(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let count = {
        let mut requests = state.requests.lock().expect("lock");
        requests.push(Recorded {
            query,
            headers: header_map(&headers),
            body,
        });
        requests.len()
    };

    match state.mode {
        ServerMode::Immediate => (StatusCode::OK, Json(finished())),
        ServerMode::Async { .. } | ServerMode::NeverFinishes => {
            (StatusCode::ACCEPTED, Json(pending()))
        }
        ServerMode::Reject => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "code": "002003",
                "message": "SQL compilation error: Table 'T1' does not exist or not authorized."
            })),
        ),
        ServerMode::FailFirst if count == 1 => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"code": "390000", "message": "Service temporarily unavailable."})),
        ),
        ServerMode::FailFirst => (StatusCode::OK, Json(finished())),
    }
}

async fn status_handler(
    State(state): State<ServerState>,
    Path(handle): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if handle != HANDLE {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "unknown handle"})));
    }
    if headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        != Some("Bearer test-token")
    {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "unauthorized"})));
    }

    let polls = state.polls.fetch_add(1, Ordering::SeqCst) + 1;
    match state.mode {
        ServerMode::Async { pending_polls } if polls > pending_polls => {
            (StatusCode::OK, Json(finished()))
        }
        _ => (StatusCode::ACCEPTED, Json(pending())),
    }
}

async fn start_test_server(mode: ServerMode) -> (String, ServerState) {
    let state = ServerState {
        mode,
        requests: Arc::new(Mutex::new(Vec::new())),
        polls: Arc::new(AtomicUsize::new(0)),
    };
    let app = Router::new()
        .route("/api/v2/statements", post(submit_handler))
        .route("/api/v2/statements/{handle}", get(status_handler))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr: SocketAddr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve test server");
    });

    (format!("http://{addr}"), state)
}

fn config(base_url: &str) -> SnowflakeConfig {
    SnowflakeConfig {
        database: Some("DB".into()),
        warehouse: Some("WH".into()),
        token_type: TokenType::OAuth,
        poll_interval: Duration::from_millis(20),
        ..SnowflakeConfig::new(base_url, "test-token")
    }
}

fn requests(state: &ServerState) -> Vec<Recorded> {
    state.requests.lock().expect("lock").clone()
}

#[tokio::test]
async fn sends_statement_with_session_context_and_auth() {
    let (base_url, state) = start_test_server(ServerMode::Immediate).await;
    let warehouse = SnowflakeWarehouse::new(config(&base_url)).expect("client");

    let session = warehouse.connect("ANALYTICS").await.expect("connect");
    let statement = session
        .prepare("DROP ICEBERG IF EXISTS TABLE t1;")
        .await
        .expect("prepare");
    let result = session.execute(&statement).await.expect("execute");
    session.close().await.expect("close");

    assert_eq!(result.columns, ["status"]);
    assert_eq!(result.to_string(), "Result:\nStatement executed successfully.");

    let recorded = requests(&state);
    assert_eq!(recorded.len(), 1);
    let request = &recorded[0];

    let request_id: Uuid = request.query["requestId"].parse().expect("uuid request id");
    assert_eq!(request_id, statement.request_id());
    assert!(!request.query.contains_key("retry"));

    assert_eq!(request.headers["authorization"], "Bearer test-token");
    assert_eq!(
        request.headers[&TOKEN_TYPE_HEADER.to_ascii_lowercase()],
        "OAUTH"
    );
    assert_eq!(request.headers["accept"], "application/json");

    assert_eq!(
        request.body,
        json!({
            "statement": "DROP ICEBERG IF EXISTS TABLE t1;",
            "timeout": 60,
            "database": "DB",
            "schema": "ANALYTICS",
            "warehouse": "WH"
        })
    );
}

#[tokio::test]
async fn polls_asynchronous_statements_until_done() {
    let (base_url, state) = start_test_server(ServerMode::Async { pending_polls: 2 }).await;
    let warehouse = SnowflakeWarehouse::new(config(&base_url)).expect("client");

    let session = warehouse.connect("PUBLIC").await.expect("connect");
    let statement = session
        .prepare("ALTER ICEBERG TABLE t1 REFRESH 'metadata/m.json';")
        .await
        .expect("prepare");
    let result = session.execute(&statement).await.expect("execute");

    assert_eq!(result.rows.len(), 1);
    assert_eq!(state.polls.load(Ordering::SeqCst), 3);
    assert_eq!(requests(&state).len(), 1);
}

#[tokio::test]
async fn maps_server_errors() {
    let (base_url, _state) = start_test_server(ServerMode::Reject).await;
    let warehouse = SnowflakeWarehouse::new(config(&base_url)).expect("client");

    let session = warehouse.connect("PUBLIC").await.expect("connect");
    let statement = session.prepare("DROP ICEBERG IF EXISTS TABLE t1;").await.expect("prepare");
    let err = session.execute(&statement).await.expect_err("rejected");

    let Error::RemoteExecution { statement, message, .. } = &err else {
        panic!("expected remote execution error, got {err:?}");
    };
    assert_eq!(statement, "DROP ICEBERG IF EXISTS TABLE t1;");
    assert!(message.contains("SQL compilation error"), "{message}");
    assert!(message.contains("002003"), "{message}");
}

#[tokio::test]
async fn gives_up_when_statement_never_finishes() {
    let (base_url, _state) = start_test_server(ServerMode::NeverFinishes).await;
    let warehouse = SnowflakeWarehouse::new(SnowflakeConfig {
        statement_timeout: Duration::from_secs(1),
        ..config(&base_url)
    })
    .expect("client");

    let session = warehouse.connect("PUBLIC").await.expect("connect");
    let statement = session.prepare("SELECT 1").await.expect("prepare");
    let err = tokio::time::timeout(Duration::from_secs(10), session.execute(&statement))
        .await
        .expect("client enforces its own timeout")
        .expect_err("timed out");

    assert!(err.to_string().contains("did not complete"), "{err}");
}

#[tokio::test]
async fn resubmission_reuses_request_id_with_retry_flag() {
    let (base_url, state) = start_test_server(ServerMode::FailFirst).await;
    let warehouse = SnowflakeWarehouse::new(config(&base_url)).expect("client");
    let executor = CommandExecutor::new(
        Arc::new(warehouse),
        SchemaMapping::new(["sales"], "PUBLIC"),
        RetryPolicy::new(1, Duration::from_millis(10)),
        CancellationToken::new(),
    );

    let command = Command::new(
        CommandKind::DropTable,
        TableIdent::new("sales", "t1").expect("ident"),
        vec!["DROP ICEBERG IF EXISTS TABLE t1;".to_string()],
    );
    executor.execute(&command).await.expect("second submission succeeds");

    let recorded = requests(&state);
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0].query["requestId"], recorded[1].query["requestId"]);
    assert!(!recorded[0].query.contains_key("retry"));
    assert_eq!(recorded[1].query.get("retry").map(String::as_str), Some("true"));
    assert_eq!(recorded[1].body["schema"], "sales");
}

#[test]
fn rejects_unusable_configuration() {
    let err = SnowflakeWarehouse::new(SnowflakeConfig::new("acct.snowflakecomputing.com", "t"))
        .expect_err("relative url");
    assert!(matches!(err, Error::Configuration(_)));
}
