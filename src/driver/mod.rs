//! Driver Module
//!
//! 클러스터 라우팅 드라이버
//!
//! # Components
//!
//! - 설정/주소 (DriverConfig, ServerAddress, AuthToken, TrustStrategy)
//! - 연결 풀링 (ConnectionPool, PoolConfig, Connector, Connection)
//! - 세션 관리 (Session, SessionConfig, AccessMode)
//! - 라우팅 (RoutingDriver, RoutingTable, CyclicSelector, Rediscovery)
//!
//! 물리 연결과 쿼리 실행은 [`Connector`] / [`Connection`] 구현이 담당한다.
//!
//! # Example
//!
//! ```ignore
//! use zeta4g_routing::driver::{AuthToken, SessionConfig};
//! use zeta4g_routing::driver::routing::RoutingDriver;
//!
//! let driver = RoutingDriver::new(
//!     "zeta4g://server1:7687,server2:7687",
//!     AuthToken::basic("admin", "password"),
//!     MyConnector::default(),
//! )?;
//!
//! driver.verify_connectivity().await?;
//!
//! let session = driver.session(SessionConfig::builder().with_read_access().build())?;
//! for record in session.run("MATCH (n) RETURN n LIMIT 10").await? {
//!     println!("{}", record);
//! }
//!
//! session.close().await?;
//! driver.close().await?;
//! ```

pub mod routing;
mod driver;
mod error;
mod pool;
mod record;
mod session;
#[cfg(test)]
mod test_support;
mod types;

// Re-exports
pub use driver::{
    AuthToken, DriverConfig, DriverConfigBuilder, ServerAddress, TrustStrategy, DEFAULT_PORT,
};
pub use error::{
    DriverError, DriverResult, FailureMetadata, NOT_A_LEADER, PROCEDURE_NOT_FOUND,
    PROTOCOL_ERROR, SERVICE_UNAVAILABLE, SESSION_EXPIRED, UNKNOWN_CODE, UNKNOWN_MESSAGE,
};
pub use pool::{
    Connection, ConnectionPool, ConnectionState, Connector, PoolConfig, PoolConfigBuilder,
    PoolMetrics, PooledConnection,
};
pub use record::Record;
pub use session::{
    AccessMode, ConnectionAddress, OnClose, PendingConnection, Query, Session, SessionConfig,
    SessionConfigBuilder,
};
pub use types::Value;

