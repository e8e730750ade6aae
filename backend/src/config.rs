//! Application configuration loaded from environment variables.
//!
//! Required: `HMAC_SECRET`
//! Optional: `HTTP_PORT`, `FULFILLMENT_CONCURRENCY`, `MAX_NUM_WORDS`,
//!           `FORWARDER_ID`, `SNAPSHOT_PATH`

use anyhow::{Context, Result};
use request_ledger::ForwarderId;
use std::path::PathBuf;

/// Application configuration for the oracle node.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Secret key for HMAC-SHA256 randomness generation.
    pub hmac_secret: Vec<u8>,
    /// HTTP server port.
    pub http_port: u16,
    /// Maximum concurrent fulfillment tasks.
    pub fulfillment_concurrency: usize,
    /// Maximum number of random words per request.
    pub max_num_words: u32,
    /// Identity the fulfiller presents to the fulfillment gateway.
    pub forwarder_id: ForwarderId,
    /// Where the ledger snapshot is written. `None` keeps the ledger in memory only.
    pub snapshot_path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let hmac_secret = std::env::var("HMAC_SECRET")
            .context("HMAC_SECRET env var must be set")?
            .into_bytes();
        anyhow::ensure!(!hmac_secret.is_empty(), "HMAC_SECRET must not be empty");

        let http_port = parse_var("HTTP_PORT")?.unwrap_or(8080);
        let fulfillment_concurrency = parse_var("FULFILLMENT_CONCURRENCY")?.unwrap_or(4);
        anyhow::ensure!(
            fulfillment_concurrency > 0,
            "FULFILLMENT_CONCURRENCY must be at least 1"
        );
        let max_num_words = parse_var("MAX_NUM_WORDS")?.unwrap_or(10);

        let forwarder_id = ForwarderId::new(
            std::env::var("FORWARDER_ID").unwrap_or_else(|_| "oracle-node".into()),
        );

        let snapshot_path = std::env::var("SNAPSHOT_PATH")
            .ok()
            .filter(|p| !p.is_empty())
            .map(|p| PathBuf::from(shellexpand::tilde(&p).into_owned()));

        Ok(Self {
            hmac_secret,
            http_port,
            fulfillment_concurrency,
            max_num_words,
            forwarder_id,
            snapshot_path,
        })
    }
}

/// Parse an optional variable; present but malformed values are an error.
fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .with_context(|| format!("invalid {name}: {raw}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable names; the process environment is shared.

    #[test]
    fn parse_var_absent_is_none() {
        let value: Option<u16> = parse_var("ORACLE_NODE_TEST_ABSENT").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn parse_var_rejects_garbage() {
        unsafe { std::env::set_var("ORACLE_NODE_TEST_GARBAGE", "eighty") };
        let err = parse_var::<u16>("ORACLE_NODE_TEST_GARBAGE").unwrap_err();
        assert!(err.to_string().contains("ORACLE_NODE_TEST_GARBAGE"));
    }

    #[test]
    fn from_env_applies_defaults() {
        unsafe {
            std::env::set_var("HMAC_SECRET", "secret");
            std::env::set_var("MAX_NUM_WORDS", "3");
            std::env::remove_var("HTTP_PORT");
            std::env::remove_var("FULFILLMENT_CONCURRENCY");
            std::env::remove_var("FORWARDER_ID");
            std::env::remove_var("SNAPSHOT_PATH");
        }
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.hmac_secret, b"secret");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.fulfillment_concurrency, 4);
        assert_eq!(config.max_num_words, 3);
        assert_eq!(config.forwarder_id, ForwarderId::new("oracle-node"));
        assert!(config.snapshot_path.is_none());
    }
}
