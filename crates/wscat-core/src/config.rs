use crate::app_config::{AppConfig, Environment, SourceKind, StockSourceKind};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so they
/// can be tested against a plain `HashMap`.
///
/// # Errors
///
/// Returns `ConfigError` if required vars are missing or values are invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let database_url = require("DATABASE_URL")?;

    let env = parse_environment(&or_default("WSCAT_ENV", "development"))?;

    let bind_addr: SocketAddr = parse_as(
        "WSCAT_BIND_ADDR",
        &or_default("WSCAT_BIND_ADDR", "0.0.0.0:3000"),
    )?;
    let log_level = or_default("WSCAT_LOG_LEVEL", "info");
    let policy_path = PathBuf::from(or_default("WSCAT_POLICY_PATH", "./config/policy.yaml"));

    let source_kind = parse_source_kind(&or_default("WSCAT_SOURCE_KIND", "csv"))?;
    let source_url = optional("WSCAT_SOURCE_URL");
    let source_page_size: u32 = parse_as(
        "WSCAT_SOURCE_PAGE_SIZE",
        &or_default("WSCAT_SOURCE_PAGE_SIZE", "250"),
    )?;
    let csv_drop_dir = PathBuf::from(or_default("WSCAT_CSV_DROP_DIR", "./data/drops"));
    let override_feed_path = PathBuf::from(or_default(
        "WSCAT_OVERRIDE_FEED_PATH",
        "./data/overrides.csv",
    ));
    let stock_source = parse_stock_source(&or_default("WSCAT_STOCK_SOURCE", "feed"))?;

    if source_url.is_none()
        && (source_kind == SourceKind::Scraper || stock_source == StockSourceKind::Scraper)
    {
        return Err(ConfigError::MissingEnvVar("WSCAT_SOURCE_URL".to_string()));
    }

    let db_max_connections: u32 = parse_as(
        "WSCAT_DB_MAX_CONNECTIONS",
        &or_default("WSCAT_DB_MAX_CONNECTIONS", "10"),
    )?;
    let db_min_connections: u32 = parse_as(
        "WSCAT_DB_MIN_CONNECTIONS",
        &or_default("WSCAT_DB_MIN_CONNECTIONS", "1"),
    )?;
    let db_acquire_timeout_secs: u64 = parse_as(
        "WSCAT_DB_ACQUIRE_TIMEOUT_SECS",
        &or_default("WSCAT_DB_ACQUIRE_TIMEOUT_SECS", "10"),
    )?;

    let scraper_request_timeout_secs: u64 = parse_as(
        "WSCAT_SCRAPER_REQUEST_TIMEOUT_SECS",
        &or_default("WSCAT_SCRAPER_REQUEST_TIMEOUT_SECS", "30"),
    )?;
    let scraper_user_agent = or_default("WSCAT_SCRAPER_USER_AGENT", "wscat/0.1 (catalog-sync)");
    let scraper_inter_request_delay_ms: u64 = parse_as(
        "WSCAT_SCRAPER_INTER_REQUEST_DELAY_MS",
        &or_default("WSCAT_SCRAPER_INTER_REQUEST_DELAY_MS", "250"),
    )?;
    let scraper_max_retries: u32 = parse_as(
        "WSCAT_SCRAPER_MAX_RETRIES",
        &or_default("WSCAT_SCRAPER_MAX_RETRIES", "3"),
    )?;
    let scraper_retry_backoff_base_ms: u64 = parse_as(
        "WSCAT_SCRAPER_RETRY_BACKOFF_BASE_MS",
        &or_default("WSCAT_SCRAPER_RETRY_BACKOFF_BASE_MS", "1000"),
    )?;

    let sync_timeout_secs: u64 = parse_as(
        "WSCAT_SYNC_TIMEOUT_SECS",
        &or_default("WSCAT_SYNC_TIMEOUT_SECS", "900"),
    )?;
    let sync_upsert_concurrency: usize = parse_as(
        "WSCAT_SYNC_UPSERT_CONCURRENCY",
        &or_default("WSCAT_SYNC_UPSERT_CONCURRENCY", "8"),
    )?;
    if sync_upsert_concurrency == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "WSCAT_SYNC_UPSERT_CONCURRENCY".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    let sync_incremental_cron = cron_or_disabled(
        lookup("WSCAT_SYNC_INCREMENTAL_CRON").ok(),
        "0 */15 * * * *",
    );
    let sync_stock_cron = cron_or_disabled(lookup("WSCAT_SYNC_STOCK_CRON").ok(), "0 */5 * * * *");

    let query_default_page_size: u32 = parse_as(
        "WSCAT_QUERY_DEFAULT_PAGE_SIZE",
        &or_default("WSCAT_QUERY_DEFAULT_PAGE_SIZE", "24"),
    )?;
    let query_max_page_size: u32 = parse_as(
        "WSCAT_QUERY_MAX_PAGE_SIZE",
        &or_default("WSCAT_QUERY_MAX_PAGE_SIZE", "100"),
    )?;
    if query_max_page_size == 0 || query_default_page_size > query_max_page_size {
        return Err(ConfigError::InvalidEnvVar {
            var: "WSCAT_QUERY_DEFAULT_PAGE_SIZE".to_string(),
            reason: format!(
                "default page size {query_default_page_size} must be between 1 and max page size {query_max_page_size}"
            ),
        });
    }
    let rate_limit_per_minute: usize = parse_as(
        "WSCAT_RATE_LIMIT_PER_MINUTE",
        &or_default("WSCAT_RATE_LIMIT_PER_MINUTE", "120"),
    )?;

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        policy_path,
        source_kind,
        source_url,
        source_page_size,
        csv_drop_dir,
        override_feed_path,
        stock_source,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        scraper_request_timeout_secs,
        scraper_user_agent,
        scraper_inter_request_delay_ms,
        scraper_max_retries,
        scraper_retry_backoff_base_ms,
        sync_timeout_secs,
        sync_upsert_concurrency,
        sync_incremental_cron,
        sync_stock_cron,
        query_default_page_size,
        query_max_page_size,
        rate_limit_per_minute,
    })
}

/// Parse a trimmed env value, reporting the variable name on failure.
fn parse_as<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            reason: e.to_string(),
        })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s.trim() {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "WSCAT_ENV".to_string(),
            reason: format!("expected development, test, or production; got '{other}'"),
        }),
    }
}

fn parse_source_kind(s: &str) -> Result<SourceKind, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "scraper" => Ok(SourceKind::Scraper),
        "csv" => Ok(SourceKind::Csv),
        other => Err(ConfigError::InvalidEnvVar {
            var: "WSCAT_SOURCE_KIND".to_string(),
            reason: format!("expected scraper or csv; got '{other}'"),
        }),
    }
}

fn parse_stock_source(s: &str) -> Result<StockSourceKind, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "feed" => Ok(StockSourceKind::Feed),
        "scraper" => Ok(StockSourceKind::Scraper),
        other => Err(ConfigError::InvalidEnvVar {
            var: "WSCAT_STOCK_SOURCE".to_string(),
            reason: format!("expected feed or scraper; got '{other}'"),
        }),
    }
}

/// Unset falls back to `default`; an explicitly empty value disables the job.
fn cron_or_disabled(raw: Option<String>, default: &str) -> Option<String> {
    match raw {
        None => Some(default.to_string()),
        Some(value) => {
            let value = value.trim();
            if value.is_empty() || value.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(value.to_string())
            }
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
