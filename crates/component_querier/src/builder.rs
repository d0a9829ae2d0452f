//! Querier builder definition.

use crate::{config::QuerierConfig, error::QuerierResult, querier::Querier};
use rand::Rng;

/// querier builder
#[derive(Default)]
pub struct QuerierBuilder {
    pub(crate) config: QuerierConfig,
}

impl QuerierBuilder {
    /// Create a new builder with the default configuration
    pub fn new() -> Self {
        QuerierBuilder::default()
    }

    /// Start from an already loaded configuration
    pub fn with_config(config: QuerierConfig) -> Self {
        QuerierBuilder { config }
    }

    /// specify the network interface the listen endpoint binds to
    pub fn listen_address(&mut self, addr: &str) -> &mut Self {
        self.config.listen_address = addr.to_owned();
        self
    }

    /// listen ports are drawn from `base * 2 .. base * 2 + 999`
    pub fn port_base(&mut self, base: u16) -> &mut Self {
        self.config.port_base = base;
        self
    }

    /// how many times a conflicting bind is retried, and how long to sleep in between
    pub fn bind_retries(&mut self, retries: u32, delay_ms: u64) -> &mut Self {
        self.config.bind_retries = retries;
        self.config.bind_retry_delay_ms = delay_ms;
        self
    }

    /// set the address queries are broadcast to
    pub fn broadcast_address(&mut self, addr: &str) -> &mut Self {
        self.config.broadcast_address = addr.to_owned();
        self
    }

    /// set the port queries are broadcast to
    pub fn discovery_port(&mut self, port: u16) -> &mut Self {
        self.config.discovery_port = port;
        self
    }

    /// receive window per broadcast, in microseconds
    pub fn query_timeout_us(&mut self, timeout_us: u64) -> &mut Self {
        self.config.query_timeout_us = timeout_us;
        self
    }

    /// poll timeouts tolerated before a receive gives up
    pub fn max_attempts(&mut self, attempts: u32) -> &mut Self {
        self.config.max_attempts = attempts;
        self
    }

    /// use a fixed host fingerprint instead of the computed one
    pub fn host_fingerprint(&mut self, fingerprint: i32) -> &mut Self {
        self.config.host_fingerprint = Some(fingerprint);
        self
    }

    /// construct the actual querier
    pub fn build(&mut self) -> QuerierResult<Querier> {
        Querier::new(self.config.clone())
    }

    /// construct the querier, drawing its listen port from `rng`
    pub fn build_with_rng<R: Rng>(&mut self, rng: &mut R) -> QuerierResult<Querier> {
        Querier::with_rng(self.config.clone(), rng)
    }
}

#[test]
fn builder_port_test() {
    use rand::{rngs::StdRng, SeedableRng};

    let build = |seed| {
        QuerierBuilder::new()
            .listen_address("127.0.0.1")
            .port_base(21000)
            .host_fingerprint(1)
            .build_with_rng(&mut StdRng::seed_from_u64(seed))
            .expect("Fail to build querier.")
    };

    let querier = build(5);
    let port = querier.listen_port().expect("listen endpoint should be bound");
    assert!(port >= 42000 && port <= 42999);
    assert_eq!(querier.host_fingerprint(), 1);
}
