//! Snowflake warehouse over the SQL API v2.
//!
//! Every statement is a `POST {account_url}/api/v2/statements?requestId=<uuid>`
//! carrying the session context (database, schema, warehouse, role). The API
//! is stateless, so connecting only builds that context and closing is local.
//!
//! Responses:
//!
//! - `200`: finished; the result set comes from `resultSetMetaData.rowType`
//!   and `data`
//! - `202`: still running; the statement handle is polled with
//!   `GET /api/v2/statements/{statementHandle}` until it finishes or the
//!   statement timeout elapses
//! - anything else: failed; the server's `message` and `code` are reported
//!
//! A prepared statement that is submitted again keeps its request id and
//! adds `retry=true`, which lets Snowflake deduplicate the resubmission.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{PreparedStatement, QueryResult, Warehouse, WarehouseSession};
use crate::error::{Error, Result};

/// Header naming the kind of bearer token presented.
pub const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";

/// Default statement timeout.
pub const DEFAULT_STATEMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default interval between status polls of a running statement.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

/// Kind of token sent in the `Authorization` header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenType {
    /// JWT signed with the user's key pair.
    #[default]
    KeypairJwt,
    /// OAuth access token.
    OAuth,
    /// Programmatic access token.
    ProgrammaticAccessToken,
}

impl TokenType {
    /// Header value for this token type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeypairJwt => "KEYPAIR_JWT",
            Self::OAuth => "OAUTH",
            Self::ProgrammaticAccessToken => "PROGRAMMATIC_ACCESS_TOKEN",
        }
    }
}

impl FromStr for TokenType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "KEYPAIR_JWT" => Ok(Self::KeypairJwt),
            "OAUTH" => Ok(Self::OAuth),
            "PROGRAMMATIC_ACCESS_TOKEN" => Ok(Self::ProgrammaticAccessToken),
            _ => Err(Error::configuration(format!(
                "token type must be one of: KEYPAIR_JWT, OAUTH, PROGRAMMATIC_ACCESS_TOKEN (got {s})"
            ))),
        }
    }
}

/// Connection settings for [`SnowflakeWarehouse`].
#[derive(Clone)]
pub struct SnowflakeConfig {
    /// Account URL, e.g. `https://acct.snowflakecomputing.com`.
    pub account_url: String,
    /// Resolved bearer token.
    pub token: String,
    /// Kind of bearer token.
    pub token_type: TokenType,
    /// Session database.
    pub database: Option<String>,
    /// Session virtual warehouse.
    pub warehouse: Option<String>,
    /// Session role.
    pub role: Option<String>,
    /// Server-side statement timeout, also bounding status polling.
    pub statement_timeout: Duration,
    /// Interval between status polls.
    pub poll_interval: Duration,
}

impl std::fmt::Debug for SnowflakeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeConfig")
            .field("account_url", &self.account_url)
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("database", &self.database)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("statement_timeout", &self.statement_timeout)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl SnowflakeConfig {
    /// Creates a config with default timeouts and no session context.
    #[must_use]
    pub fn new(account_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            account_url: account_url.into(),
            token: token.into(),
            token_type: TokenType::default(),
            database: None,
            warehouse: None,
            role: None,
            statement_timeout: DEFAULT_STATEMENT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

struct ClientInner {
    client: reqwest::Client,
    base_url: String,
    auth_header: String,
    token_type: TokenType,
    database: Option<String>,
    warehouse: Option<String>,
    role: Option<String>,
    statement_timeout: Duration,
    poll_interval: Duration,
}

/// Snowflake SQL API client.
#[derive(Clone)]
pub struct SnowflakeWarehouse {
    inner: Arc<ClientInner>,
}

impl std::fmt::Debug for SnowflakeWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnowflakeWarehouse")
            .field("base_url", &self.inner.base_url)
            .field("token_type", &self.inner.token_type)
            .finish_non_exhaustive()
    }
}

impl SnowflakeWarehouse {
    /// Builds a client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the account URL is not an
    /// `http`/`https` URL, the token is empty, or the HTTP client cannot be
    /// built.
    pub fn new(config: SnowflakeConfig) -> Result<Self> {
        let parsed = reqwest::Url::parse(&config.account_url)
            .map_err(|e| Error::configuration(format!("invalid Snowflake account URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::configuration(format!(
                "Snowflake account URL must be http(s), got {}",
                parsed.scheme()
            )));
        }
        if config.token.trim().is_empty() {
            return Err(Error::configuration("Snowflake token must not be empty"));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                client,
                base_url: config.account_url.trim_end_matches('/').to_string(),
                auth_header: format!("Bearer {}", config.token),
                token_type: config.token_type,
                database: config.database,
                warehouse: config.warehouse,
                role: config.role,
                statement_timeout: config.statement_timeout,
                poll_interval: config.poll_interval,
            }),
        })
    }
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    async fn connect(&self, schema: &str) -> Result<Box<dyn WarehouseSession>> {
        if schema.trim().is_empty() {
            return Err(Error::connection("cannot open a session without a schema"));
        }
        tracing::debug!(schema, "opened Snowflake session");
        Ok(Box::new(SnowflakeSession {
            inner: Arc::clone(&self.inner),
            schema: schema.to_string(),
            submitted: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }))
    }
}

#[derive(Debug, Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    database: Option<&'a str>,
    schema: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    warehouse: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<ColumnType>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
}

impl StatementResponse {
    fn into_result(self) -> QueryResult {
        let columns = self
            .result_set_meta_data
            .map(|meta| meta.row_type.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();
        QueryResult::new(columns, self.data)
    }
}

enum Outcome {
    Done(QueryResult),
    Pending(Option<String>),
}

struct SnowflakeSession {
    inner: Arc<ClientInner>,
    schema: String,
    submitted: Mutex<HashSet<Uuid>>,
    closed: AtomicBool,
}

impl SnowflakeSession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::connection("Snowflake session is closed"));
        }
        Ok(())
    }

    fn request_timeout(&self) -> Duration {
        self.inner
            .statement_timeout
            .saturating_add(REQUEST_TIMEOUT_SLACK)
    }

    async fn submit(&self, statement: &PreparedStatement) -> Result<Outcome> {
        let sql = statement.sql();
        let resubmission = !self
            .submitted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(statement.request_id());

        let body = StatementRequest {
            statement: sql,
            timeout: self.inner.statement_timeout.as_secs(),
            database: self.inner.database.as_deref(),
            schema: &self.schema,
            warehouse: self.inner.warehouse.as_deref(),
            role: self.inner.role.as_deref(),
        };

        let mut request = self
            .inner
            .client
            .post(format!("{}/api/v2/statements", self.inner.base_url))
            .query(&[("requestId", statement.request_id().to_string())]);
        if resubmission {
            request = request.query(&[("retry", "true")]);
        }

        tracing::debug!(
            request_id = %statement.request_id(),
            resubmission,
            schema = %self.schema,
            "submitting statement"
        );

        let response = request
            .header(AUTHORIZATION, &self.inner.auth_header)
            .header(TOKEN_TYPE_HEADER, self.inner.token_type.as_str())
            .header(ACCEPT, "application/json")
            .json(&body)
            .timeout(self.request_timeout())
            .send()
            .await
            .map_err(|e| Error::remote_with_source(sql, "statement request failed", e))?;

        read_response(sql, response).await
    }

    async fn poll(&self, sql: &str, mut handle: String) -> Result<QueryResult> {
        let deadline = tokio::time::Instant::now() + self.inner.statement_timeout;

        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::remote(
                    sql,
                    format!(
                        "statement {handle} did not complete within {}s",
                        self.inner.statement_timeout.as_secs()
                    ),
                ));
            }
            tokio::time::sleep(self.inner.poll_interval).await;

            let response = self
                .inner
                .client
                .get(format!("{}/api/v2/statements/{handle}", self.inner.base_url))
                .header(AUTHORIZATION, &self.inner.auth_header)
                .header(TOKEN_TYPE_HEADER, self.inner.token_type.as_str())
                .header(ACCEPT, "application/json")
                .timeout(self.request_timeout())
                .send()
                .await
                .map_err(|e| Error::remote_with_source(sql, "statement status request failed", e))?;

            match read_response(sql, response).await? {
                Outcome::Done(result) => return Ok(result),
                Outcome::Pending(next) => {
                    if let Some(next) = next {
                        handle = next;
                    }
                }
            }
        }
    }
}

async fn read_response(sql: &str, response: reqwest::Response) -> Result<Outcome> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::remote_with_source(sql, "failed to read statement response", e))?;

    match status {
        StatusCode::OK => {
            let parsed: StatementResponse = serde_json::from_str(&body)
                .map_err(|e| Error::remote_with_source(sql, "malformed statement response", e))?;
            Ok(Outcome::Done(parsed.into_result()))
        }
        StatusCode::ACCEPTED => {
            let parsed: StatementResponse = serde_json::from_str(&body).unwrap_or_default();
            Ok(Outcome::Pending(parsed.statement_handle))
        }
        _ => {
            let message = match serde_json::from_str::<StatementResponse>(&body) {
                Ok(StatementResponse {
                    message: Some(message),
                    code,
                    ..
                }) => format!(
                    "{message} (status={status}, code={})",
                    code.as_deref().unwrap_or("unknown")
                ),
                _ => format!("statement failed (status={status}): {body}"),
            };
            Err(Error::remote(sql, message))
        }
    }
}

#[async_trait]
impl WarehouseSession for SnowflakeSession {
    async fn prepare(&self, sql: &str) -> Result<PreparedStatement> {
        self.ensure_open()?;
        Ok(PreparedStatement::new(sql))
    }

    async fn execute(&self, statement: &PreparedStatement) -> Result<QueryResult> {
        self.ensure_open()?;
        match self.submit(statement).await? {
            Outcome::Done(result) => Ok(result),
            Outcome::Pending(Some(handle)) => self.poll(statement.sql(), handle).await,
            Outcome::Pending(None) => Err(Error::remote(
                statement.sql(),
                "asynchronous response without statementHandle",
            )),
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
