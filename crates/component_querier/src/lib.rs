//! UDP broadcast discovery of cluster component ids.
//!
//! A process joining the cluster asks "who currently holds the id for this
//! role?" by broadcasting a query on the LAN and decoding the first
//! well-formed answer that comes back.
//!
//! ```no_run
//! use component_querier::{ComponentType, QuerierBuilder};
//!
//! let mut querier = QuerierBuilder::new()
//!     .broadcast_address("192.168.1.255")
//!     .build()
//!     .expect("Fail to build querier.");
//!
//! if querier.is_ready() {
//!     let id = querier.query(ComponentType::CELL_APP_MANAGER, 1000);
//!     println!("resolved: {:?}", id);
//! }
//! ```

extern crate byteorder;
extern crate mio;
extern crate net2;

/// Largest UDP payload over IPv4: 65535 minus the 8 byte UDP header and the
/// 20 byte IP header.
pub const MAX_UDP_PAYLOAD: usize = 65_507;

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_BROADCAST_ADDRESS: &str = "255.255.255.255";
pub const DEFAULT_PORT_BASE: u16 = 20_000;
/// Number of ports in the listen range.
pub const LISTEN_PORT_SPAN: u32 = 1_000;
/// Well-known port discovery responders listen on.
pub const DEFAULT_DISCOVERY_PORT: u16 = 20_086;
pub const DEFAULT_BIND_RETRIES: u32 = 30;
pub const DEFAULT_BIND_RETRY_DELAY_MS: u64 = 10;
pub const DEFAULT_QUERY_TIMEOUT_US: u64 = 2_000_000;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

pub mod error;
pub use error::{ErrorKind, QuerierError, QuerierResult};

pub mod component;
pub use component::{ComponentId, ComponentType};

pub mod config;
pub use config::QuerierConfig;

pub mod builder;
pub use builder::QuerierBuilder;

pub mod wire;
pub use wire::{QueryRequest, RecordStream, ResponseRecord};

pub mod buffer;
pub mod decoder;
pub mod endpoint;
pub mod fingerprint;

pub mod querier;
pub use querier::{Querier, Received};
