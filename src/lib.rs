//! # Zeta4G Routing Driver
//!
//! Cluster-aware connection routing for [Zeta4G](https://github.com/zeta9044/zeta4g).
//!
//! ## Features
//!
//! - **Routing table discovery** - Queries known routers until one returns the cluster topology
//! - **Load balancing** - Round-robin selection of readers and writers
//! - **Failure-driven maintenance** - Unavailable servers are forgotten, demoted leaders leave the writer set
//! - **Singleflight refresh** - Concurrent sessions on a stale table trigger a single discovery
//! - **Connection Pooling** - Per-address pools with purge on topology change
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! zeta4g-routing = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ## Basic Usage
//!
//! The routing core does not speak the wire protocol itself. Plug in a
//! [`Connector`] that opens physical connections:
//!
//! ```rust,ignore
//! use zeta4g_routing::{AuthToken, RoutingDriver, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let driver = RoutingDriver::new(
//!         "zeta4g://server1:7687,server2:7687",
//!         AuthToken::basic("zeta4g", "password"),
//!         BoltConnector::default(),
//!     )?;
//!
//!     let session = driver.session(SessionConfig::builder().with_write_access().build())?;
//!     session.run("CREATE (n:Person {name: 'Alice'})").await?;
//!     session.close().await?;
//!
//!     driver.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Access Modes
//!
//! Sessions can also be opened by mode name. Anything other than `READ` or
//! `WRITE` is rejected before any network activity:
//!
//! ```rust,ignore
//! let reader = driver.session_for_mode("READ")?;
//! assert!(driver.session_for_mode("ADMIN").is_err());
//! ```
//!
//! ## Authentication
//!
//! ```rust
//! use zeta4g_routing::AuthToken;
//!
//! // Basic authentication
//! let auth = AuthToken::basic("username", "password");
//!
//! // Bearer token
//! let auth = AuthToken::bearer("my-token");
//!
//! // No authentication
//! let auth = AuthToken::none();
//! ```
//!
//! ## Configuration
//!
//! Customize driver behavior with [`DriverConfig`]:
//!
//! ```rust
//! use zeta4g_routing::{AuthToken, DriverConfig};
//! use std::time::Duration;
//!
//! let config = DriverConfig::builder("zeta4g://localhost:7687", AuthToken::basic("u", "p"))
//!     .unwrap()
//!     .with_max_connection_pool_size(50)
//!     .with_connection_acquisition_timeout(Duration::from_secs(10))
//!     .build();
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`DriverResult`]:
//!
//! ```rust,ignore
//! match session.run("CREATE (n)").await {
//!     Ok(records) => println!("{} records", records.len()),
//!     Err(DriverError::SessionExpired(msg)) => eprintln!("Retry with a new session: {}", msg),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Configuration, pooling, sessions and errors
//! - [`driver::routing`] - Routing table, rediscovery and the routing driver
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod driver;

// Re-exports for convenience
pub use driver::routing::{RoutingDriver, RoutingDriverMetrics, RoutingSession, RoutingTable};
pub use driver::{
    AccessMode, AuthToken, Connection, Connector, DriverConfig, DriverConfigBuilder, DriverError,
    DriverResult, FailureMetadata, Query, Record, ServerAddress, SessionConfig,
    SessionConfigBuilder, TrustStrategy, Value,
};

/// Config alias for convenience
pub type Config = DriverConfig;
