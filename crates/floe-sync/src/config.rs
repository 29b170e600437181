//! Environment-driven configuration.
//!
//! | variable | default |
//! |----------|---------|
//! | `FLOE_FORCE_SYNCHRONOUS` | `false` |
//! | `FLOE_CLIENT_THREAD_COUNT` | `8` |
//! | `FLOE_RETRY_COUNT` | `1` |
//! | `FLOE_RETRY_TIMEOUT_MS` | `1000` |
//! | `FLOE_TABLE_FILTER_REGEX` | unset |
//! | `FLOE_DATABASE_FILTER_REGEX` | unset |
//! | `FLOE_SCHEMAS` | empty |
//! | `FLOE_SNOWFLAKE_ACCOUNT_URL` | unset |
//! | `FLOE_SNOWFLAKE_TOKEN` | unset |
//! | `FLOE_SNOWFLAKE_TOKEN_TYPE` | `KEYPAIR_JWT` |
//! | `FLOE_SNOWFLAKE_DATABASE` | unset |
//! | `FLOE_SNOWFLAKE_WAREHOUSE` | unset |
//! | `FLOE_SNOWFLAKE_ROLE` | unset |
//! | `FLOE_SNOWFLAKE_SCHEMA` | `PUBLIC` |
//! | `FLOE_SNOWFLAKE_STATEMENT_TIMEOUT_SECS` | `60` |
//! | `FLOE_LOG_FORMAT` | `pretty` |
//!
//! Empty or whitespace-only values count as unset.

use std::time::Duration;

use floe_core::LogFormat;

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::scheduler::DEFAULT_WORKER_COUNT;
use crate::schema::{DEFAULT_SCHEMA, SchemaMapping};
use crate::warehouse::snowflake::SnowflakeConfig;

/// Runtime configuration for the sync service.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Execute commands inline instead of through the scheduler.
    pub force_synchronous: bool,
    /// Scheduler worker count.
    pub worker_count: usize,
    /// Retry budget for every remote call.
    pub retry: RetryPolicy,
    /// Tables whose name fully matches this pattern are skipped.
    pub table_filter: Option<String>,
    /// Databases whose name fully matches this pattern are skipped.
    pub database_filter: Option<String>,
    /// Databases synced to a schema of the same name.
    pub schemas: Vec<String>,
    /// Schema for every other database.
    pub default_schema: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Snowflake connection, if configured.
    pub snowflake: Option<SnowflakeConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            force_synchronous: false,
            worker_count: DEFAULT_WORKER_COUNT,
            retry: RetryPolicy::default(),
            table_filter: None,
            database_filter: None,
            schemas: Vec::new(),
            default_schema: DEFAULT_SCHEMA.to_string(),
            log_format: LogFormat::default(),
            snowflake: None,
        }
    }
}

impl SyncConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a variable is present but invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration from `lookup`, which maps variable names to values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a variable is present but invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let mut config = Self::default();

        if let Some(sync) = env.bool("FLOE_FORCE_SYNCHRONOUS")? {
            config.force_synchronous = sync;
        }
        if let Some(workers) = env.usize("FLOE_CLIENT_THREAD_COUNT")? {
            if workers == 0 {
                return Err(Error::configuration(
                    "FLOE_CLIENT_THREAD_COUNT must be at least 1",
                ));
            }
            config.worker_count = workers;
        }
        if let Some(retries) = env.u32("FLOE_RETRY_COUNT")? {
            config.retry.max_retries = retries;
        }
        if let Some(delay_ms) = env.u64("FLOE_RETRY_TIMEOUT_MS")? {
            config.retry.delay = Duration::from_millis(delay_ms);
        }

        config.table_filter = env.string("FLOE_TABLE_FILTER_REGEX");
        config.database_filter = env.string("FLOE_DATABASE_FILTER_REGEX");
        if let Some(schemas) = env.string("FLOE_SCHEMAS") {
            config.schemas = parse_list(&schemas);
        }
        if let Some(schema) = env.string("FLOE_SNOWFLAKE_SCHEMA") {
            config.default_schema = schema;
        }
        if let Some(format) = env.string("FLOE_LOG_FORMAT") {
            config.log_format = format
                .parse()
                .map_err(|e| Error::configuration(format!("FLOE_LOG_FORMAT: {e}")))?;
        }

        config.snowflake = snowflake_from_env(&env)?;
        Ok(config)
    }

    /// Returns the Snowflake connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no account URL or token was given.
    pub fn require_snowflake(&self) -> Result<&SnowflakeConfig> {
        self.snowflake.as_ref().ok_or_else(|| {
            Error::configuration(
                "FLOE_SNOWFLAKE_ACCOUNT_URL and FLOE_SNOWFLAKE_TOKEN must be set",
            )
        })
    }

    /// Builds the schema mapping.
    #[must_use]
    pub fn schema_mapping(&self) -> SchemaMapping {
        SchemaMapping::new(self.schemas.iter().cloned(), self.default_schema.clone())
    }
}

fn snowflake_from_env<F>(env: &Env<F>) -> Result<Option<SnowflakeConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    let account_url = env.string("FLOE_SNOWFLAKE_ACCOUNT_URL");
    let token = env.string("FLOE_SNOWFLAKE_TOKEN");
    let (account_url, token) = match (account_url, token) {
        (Some(url), Some(token)) => (url, token),
        (None, None) => return Ok(None),
        (Some(_), None) => {
            return Err(Error::configuration(
                "FLOE_SNOWFLAKE_TOKEN must be set when FLOE_SNOWFLAKE_ACCOUNT_URL is",
            ));
        }
        (None, Some(_)) => {
            return Err(Error::configuration(
                "FLOE_SNOWFLAKE_ACCOUNT_URL must be set when FLOE_SNOWFLAKE_TOKEN is",
            ));
        }
    };

    let mut config = SnowflakeConfig::new(account_url, token);
    if let Some(token_type) = env.string("FLOE_SNOWFLAKE_TOKEN_TYPE") {
        config.token_type = token_type
            .parse()
            .map_err(|e| Error::configuration(format!("FLOE_SNOWFLAKE_TOKEN_TYPE: {e}")))?;
    }
    config.database = env.string("FLOE_SNOWFLAKE_DATABASE");
    config.warehouse = env.string("FLOE_SNOWFLAKE_WAREHOUSE");
    config.role = env.string("FLOE_SNOWFLAKE_ROLE");
    if let Some(secs) = env.u64("FLOE_SNOWFLAKE_STATEMENT_TIMEOUT_SECS")? {
        config.statement_timeout = Duration::from_secs(secs);
    }
    Ok(Some(config))
}

/// Typed accessors over a variable lookup.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name).and_then(|v| {
            let trimmed = v.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }

    fn parsed<T>(&self, name: &str, kind: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        v.parse::<T>()
            .map(Some)
            .map_err(|e| Error::configuration(format!("{name} must be a {kind}: {e}")))
    }

    fn u32(&self, name: &str) -> Result<Option<u32>> {
        self.parsed(name, "u32")
    }

    fn u64(&self, name: &str) -> Result<Option<u64>> {
        self.parsed(name, "u64")
    }

    fn usize(&self, name: &str) -> Result<Option<usize>> {
        self.parsed(name, "usize")
    }

    fn bool(&self, name: &str) -> Result<Option<bool>> {
        let Some(v) = self.string(name) else {
            return Ok(None);
        };
        parse_bool(name, &v).map(Some)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(Error::configuration(format!(
            "{name} must be a boolean (true/false/1/0)"
        ))),
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::snowflake::TokenType;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<SyncConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        SyncConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).expect("config");
        assert!(!config.force_synchronous);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.delay, Duration::from_millis(1000));
        assert_eq!(config.default_schema, "PUBLIC");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.snowflake.is_none());
        assert!(config.require_snowflake().is_err());
    }

    #[test]
    fn parses_all_values() {
        let config = load(&[
            ("FLOE_FORCE_SYNCHRONOUS", "yes"),
            ("FLOE_CLIENT_THREAD_COUNT", "4"),
            ("FLOE_RETRY_COUNT", "3"),
            ("FLOE_RETRY_TIMEOUT_MS", "250"),
            ("FLOE_TABLE_FILTER_REGEX", "tmp_.*"),
            ("FLOE_DATABASE_FILTER_REGEX", "  "),
            ("FLOE_SCHEMAS", "sales, ops,,"),
            ("FLOE_SNOWFLAKE_SCHEMA", "LANDING"),
            ("FLOE_LOG_FORMAT", "json"),
            ("FLOE_SNOWFLAKE_ACCOUNT_URL", "https://acct.snowflakecomputing.com"),
            ("FLOE_SNOWFLAKE_TOKEN", "tok"),
            ("FLOE_SNOWFLAKE_TOKEN_TYPE", "oauth"),
            ("FLOE_SNOWFLAKE_WAREHOUSE", "WH"),
            ("FLOE_SNOWFLAKE_STATEMENT_TIMEOUT_SECS", "30"),
        ])
        .expect("config");

        assert!(config.force_synchronous);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.retry, RetryPolicy::new(3, Duration::from_millis(250)));
        assert_eq!(config.table_filter.as_deref(), Some("tmp_.*"));
        assert!(config.database_filter.is_none());
        assert_eq!(config.schemas, ["sales", "ops"]);
        assert_eq!(config.log_format, LogFormat::Json);

        let mapping = config.schema_mapping();
        assert_eq!(mapping.schema_for("sales"), "sales");
        assert_eq!(mapping.schema_for("hr"), "LANDING");

        let snowflake = config.require_snowflake().expect("snowflake");
        assert_eq!(snowflake.token_type, TokenType::OAuth);
        assert_eq!(snowflake.warehouse.as_deref(), Some("WH"));
        assert!(snowflake.role.is_none());
        assert_eq!(snowflake.statement_timeout, Duration::from_secs(30));
    }

    #[test]
    fn rejects_invalid_values() {
        for vars in [
            [("FLOE_FORCE_SYNCHRONOUS", "maybe")],
            [("FLOE_CLIENT_THREAD_COUNT", "0")],
            [("FLOE_CLIENT_THREAD_COUNT", "-1")],
            [("FLOE_RETRY_COUNT", "many")],
            [("FLOE_LOG_FORMAT", "xml")],
            [("FLOE_SNOWFLAKE_TOKEN", "tok")],
        ] {
            let err = load(&vars).expect_err("invalid");
            assert!(matches!(err, Error::Configuration(_)), "{vars:?}: {err}");
        }
    }

    #[test]
    fn invalid_token_type_is_rejected() {
        let err = load(&[
            ("FLOE_SNOWFLAKE_ACCOUNT_URL", "https://acct.snowflakecomputing.com"),
            ("FLOE_SNOWFLAKE_TOKEN", "tok"),
            ("FLOE_SNOWFLAKE_TOKEN_TYPE", "basic"),
        ])
        .expect_err("invalid");
        assert!(err.to_string().contains("FLOE_SNOWFLAKE_TOKEN_TYPE"));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("TEST", "TRUE").expect("bool"));
        assert!(!parse_bool("TEST", "n").expect("bool"));
        assert!(parse_bool("TEST", "").is_err());
    }
}
