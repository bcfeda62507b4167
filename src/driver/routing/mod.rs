//! 라우팅 모듈
//!
//! 클러스터 환경에서 자동 라우팅을 지원합니다.
//!
//! # 개요
//!
//! 라우팅 드라이버는 `zeta4g://` 스킴을 사용하여 클러스터에 연결합니다.
//! 라우터에서 조회한 라우팅 테이블을 기준으로 읽기 세션은 리더(reader)로,
//! 쓰기 세션은 라이터(writer)로 라운드 로빈 분배됩니다. 세션에서 발생한
//! 실패는 드라이버가 분류해 테이블과 연결 풀을 정리합니다.
//!
//! # 예시
//!
//! ```ignore
//! use zeta4g_routing::driver::routing::RoutingDriver;
//! use zeta4g_routing::driver::{AuthToken, SessionConfig};
//!
//! let driver = RoutingDriver::new(
//!     "zeta4g://server1:7687,server2:7687",
//!     AuthToken::basic("zeta4g", "password"),
//!     connector,
//! )?;
//!
//! // 읽기 세션
//! let session = driver.session(SessionConfig::builder().with_read_access().build())?;
//! let records = session.run("MATCH (n) RETURN n LIMIT 10").await?;
//! session.close().await?;
//!
//! // 쓰기 세션
//! let session = driver.session_for_mode("WRITE")?;
//! session.run("CREATE (n:Person)").await?;
//! session.close().await?;
//!
//! driver.close().await?;
//! ```

mod driver;
mod rediscovery;
mod selector;
mod session;
mod table;

pub use driver::{is_routing_uri, parse_routing_uri, RoutingDriver, RoutingDriverMetrics};
pub use rediscovery::{parse_routing_table, Rediscovery, GET_SERVERS_QUERY};
pub use selector::CyclicSelector;
pub use session::{FailureHandler, RoutingSession};
pub use table::{RoutingTable, ServerRole, MAX_TTL};
