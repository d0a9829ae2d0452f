//! Querier configuration.
//!
//! Every field has a default, so a `[querier]` table only needs the values
//! that differ:
//!
//! ```
//! use component_querier::QuerierConfig;
//!
//! let config = QuerierConfig::from_toml(r#"
//!     [querier]
//!     broadcast_address = "192.168.1.255"
//!     query_timeout_us = 500000
//! "#).unwrap();
//! assert_eq!(config.discovery_port, 20086);
//! ```

use crate::{
    error::{ErrorKind, QuerierError, QuerierResult},
    DEFAULT_BIND_RETRIES, DEFAULT_BIND_RETRY_DELAY_MS, DEFAULT_BROADCAST_ADDRESS,
    DEFAULT_DISCOVERY_PORT, DEFAULT_LISTEN_ADDRESS, DEFAULT_MAX_ATTEMPTS, DEFAULT_PORT_BASE,
    DEFAULT_QUERY_TIMEOUT_US, LISTEN_PORT_SPAN,
};
use serde_derive::Deserialize;
use std::{net::IpAddr, time::Duration};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuerierConfig {
    /// Interface the listen endpoint binds to.
    pub listen_address: String,
    /// Listen ports are drawn from `port_base * 2 .. port_base * 2 + 999`.
    pub port_base: u16,
    /// Bind retries after the first failure.
    pub bind_retries: u32,
    pub bind_retry_delay_ms: u64,
    /// Destination of query datagrams.
    pub broadcast_address: String,
    /// Port queries go to when no explicit port is given.
    pub discovery_port: u16,
    /// Receive window per broadcast, in microseconds.
    pub query_timeout_us: u64,
    /// Poll timeouts tolerated before a receive gives up.
    pub max_attempts: u32,
    /// Overrides the computed host fingerprint.
    pub host_fingerprint: Option<i32>,
}

#[derive(Deserialize, Debug)]
struct QuerierConfigDocument {
    querier: Option<QuerierConfig>,
}

impl Default for QuerierConfig {
    fn default() -> Self {
        QuerierConfig {
            listen_address: String::from(DEFAULT_LISTEN_ADDRESS),
            port_base: DEFAULT_PORT_BASE,
            bind_retries: DEFAULT_BIND_RETRIES,
            bind_retry_delay_ms: DEFAULT_BIND_RETRY_DELAY_MS,
            broadcast_address: String::from(DEFAULT_BROADCAST_ADDRESS),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            query_timeout_us: DEFAULT_QUERY_TIMEOUT_US,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            host_fingerprint: None,
        }
    }
}

impl QuerierConfig {
    /// Reads the `[querier]` table of a `TOML` document. A missing table
    /// yields the defaults.
    pub fn from_toml(toml_str: &str) -> QuerierResult<Self> {
        let doc: QuerierConfigDocument = toml::from_str(toml_str)?;
        let config = doc.querier.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Checks the values a querier cannot run with.
    pub fn validate(&self) -> QuerierResult<()> {
        self.listen_ip()?;
        self.broadcast_ip()?;
        if u32::from(self.port_base) * 2 + LISTEN_PORT_SPAN > 65_536 {
            return Err(QuerierError::new(ErrorKind::Config(format!(
                "port_base {} puts the listen range past 65535",
                self.port_base
            ))));
        }
        if self.discovery_port == 0 {
            return Err(QuerierError::new(ErrorKind::Config(
                "discovery_port cannot be 0".to_string(),
            )));
        }
        Ok(())
    }

    pub fn listen_ip(&self) -> QuerierResult<IpAddr> {
        Ok(self.listen_address.parse()?)
    }

    pub fn broadcast_ip(&self) -> QuerierResult<IpAddr> {
        Ok(self.broadcast_address.parse()?)
    }

    /// Inclusive range the listen port is drawn from.
    pub fn listen_ports(&self) -> (u16, u16) {
        let low = u32::from(self.port_base) * 2;
        let high = (low + LISTEN_PORT_SPAN - 1).min(65_535);
        (low as u16, high as u16)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_micros(self.query_timeout_us)
    }

    pub fn bind_retry_delay(&self) -> Duration {
        Duration::from_millis(self.bind_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_default_missing_tables() {
        let config = QuerierConfig::from_toml("").unwrap();
        assert_eq!(config, QuerierConfig::default());
        assert_eq!(config.listen_ports(), (40000, 40999));
        assert_eq!(config.query_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn it_should_read_partial_tables() {
        let config = QuerierConfig::from_toml(
            r#"
            [querier]
            broadcast_address = "127.0.0.1"
            max_attempts = 2
            host_fingerprint = -7
            "#,
        )
        .unwrap();
        assert_eq!(config.broadcast_address, "127.0.0.1");
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.host_fingerprint, Some(-7));
        assert_eq!(config.bind_retries, 30);
    }

    #[test]
    fn it_should_reject_bad_values() {
        let err = QuerierConfig::from_toml("[querier]\nbroadcast_address = \"nope\"").unwrap_err();
        match err.kind() {
            ErrorKind::Config(_) => (),
            other => panic!("unexpected kind {:?}", other),
        }
        assert!(QuerierConfig::from_toml("[querier]\nport_base = 40000").is_err());
        assert!(QuerierConfig::from_toml("[querier]\nmax_attempts = \"x\"").is_err());
    }
}
