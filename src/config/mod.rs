//! Configuration module for the church site backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::{AddrParseError, SocketAddr};
use std::path::PathBuf;

/// Default ceiling for uploaded files (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory holding upload buckets
    pub upload_dir: PathBuf,
    /// Bucket (subdirectory) that uploads are written to
    pub upload_bucket: String,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Base URL used when building links to uploaded files
    pub public_url: String,
    /// Key required to create admin accounts; open signup when unset
    pub signup_key: Option<String>,
    /// Lifetime of a login session
    pub session_ttl_hours: i64,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AddrParseError> {
        dotenvy::dotenv().ok();

        let db_path = env::var("CHURCH_DB_PATH")
            .unwrap_or_else(|_| "./data/site.sqlite".to_string())
            .into();

        let upload_dir = env::var("CHURCH_UPLOAD_DIR")
            .unwrap_or_else(|_| "./data/uploads".to_string())
            .into();

        let upload_bucket =
            env::var("CHURCH_UPLOAD_BUCKET").unwrap_or_else(|_| "site-uploads".to_string());

        let max_upload_bytes = env::var("CHURCH_MAX_UPLOAD_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        let bind_addr: SocketAddr = env::var("CHURCH_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()?;

        let public_url = env::var("CHURCH_PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| format!("http://{}", bind_addr));

        let signup_key = env::var("CHURCH_SIGNUP_KEY")
            .ok()
            .filter(|key| !key.is_empty());

        let session_ttl_hours = env::var("CHURCH_SESSION_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|hours: &i64| *hours > 0)
            .unwrap_or(24 * 7);

        let log_level = env::var("CHURCH_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = env::var("CHURCH_LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or(LogFormat::Pretty);

        Ok(Self {
            db_path,
            upload_dir,
            upload_bucket,
            max_upload_bytes,
            bind_addr,
            public_url,
            signup_key,
            session_ttl_hours,
            log_level,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "CHURCH_DB_PATH",
        "CHURCH_UPLOAD_DIR",
        "CHURCH_UPLOAD_BUCKET",
        "CHURCH_MAX_UPLOAD_BYTES",
        "CHURCH_BIND_ADDR",
        "CHURCH_PUBLIC_URL",
        "CHURCH_SIGNUP_KEY",
        "CHURCH_SESSION_TTL_HOURS",
        "CHURCH_LOG_LEVEL",
        "CHURCH_LOG_FORMAT",
    ];

    #[test]
    fn test_default_config() {
        // Clear any existing env vars
        for var in VARS {
            env::remove_var(var);
        }

        let config = Config::from_env().unwrap();

        assert_eq!(config.db_path, PathBuf::from("./data/site.sqlite"));
        assert_eq!(config.upload_dir, PathBuf::from("./data/uploads"));
        assert_eq!(config.upload_bucket, "site-uploads");
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.public_url, "http://127.0.0.1:8080");
        assert!(config.signup_key.is_none());
        assert_eq!(config.session_ttl_hours, 168);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("whatever"), LogFormat::Pretty);
    }
}
