//! 라우팅 드라이버
//!
//! 클러스터 환경에서 자동 라우팅을 지원하는 드라이버입니다.
//!
//! 현재 라우팅 테이블은 `ArcSwap`에 보관되며 갱신 시 통째로 교체됩니다.
//! 동시에 들어온 갱신 요청은 하나의 조회로 합쳐집니다.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::super::driver::{AuthToken, DriverConfig, ServerAddress};
use super::super::error::{
    DriverError, DriverResult, NOT_A_LEADER, SERVICE_UNAVAILABLE, SESSION_EXPIRED, UNKNOWN_CODE,
};
use super::super::pool::{ConnectionPool, Connector, PoolMetrics, PooledConnection};
use super::super::session::{AccessMode, ConnectionAddress, OnClose, Session, SessionConfig};
use super::rediscovery::Rediscovery;
use super::session::{FailureHandler, RoutingSession};
use super::table::RoutingTable;

// ============================================================================
// RoutingState - 공유 라우팅 상태
// ============================================================================

/// 진행 중인 갱신. 모든 대기자가 같은 결과를 받는다.
type RefreshFuture = Shared<BoxFuture<'static, DriverResult<Arc<RoutingTable>>>>;

struct RoutingState<K: Connector> {
    /// 현재 라우팅 테이블
    table: ArcSwap<RoutingTable>,
    /// 주소별 연결 풀
    pool: Arc<ConnectionPool<K>>,
    rediscovery: Rediscovery,
    /// 진행 중인 갱신 (singleflight)
    refresh: Mutex<Option<RefreshFuture>>,
    open: AtomicBool,
    refreshes: AtomicU64,
    open_sessions: Arc<AtomicUsize>,
}

impl<K: Connector> RoutingState<K> {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DriverError::session("Driver is closed"))
        }
    }

    /// 최신 라우팅 테이블
    ///
    /// 테이블이 stale이면 갱신한다. 이미 진행 중인 갱신이 있으면 새 조회를
    /// 시작하지 않고 그 결과(성공이든 실패든)를 함께 기다린다.
    async fn fresh_routing_table(self: &Arc<Self>) -> DriverResult<Arc<RoutingTable>> {
        let current = self.table.load_full();
        if !current.is_stale() {
            return Ok(current);
        }

        let refresh = {
            let mut in_flight = self.refresh.lock();
            match in_flight.as_ref() {
                Some(refresh) => {
                    tracing::debug!("Joining in-flight routing table refresh");
                    refresh.clone()
                }
                None => {
                    // 직전 갱신이 끝나며 테이블을 교체했을 수 있다
                    let current = self.table.load_full();
                    if !current.is_stale() {
                        return Ok(current);
                    }

                    let state = Arc::clone(self);
                    let refresh = async move {
                        let result = state.refresh_routing_table(current).await;
                        state.refresh.lock().take();
                        result
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(refresh.clone());
                    refresh
                }
            }
        };

        refresh.await
    }

    /// 알려진 라우터를 순서대로 조회해 첫 번째 성공 결과를 채택
    async fn refresh_routing_table(&self, current: Arc<RoutingTable>) -> DriverResult<Arc<RoutingTable>> {
        let routers = current.known_routers();
        tracing::debug!(?routers, "Refreshing routing table");

        for (i, router) in routers.iter().enumerate() {
            if i > 0 {
                // 직전 라우터는 실패했다
                self.forget(&routers[i - 1]);
            }

            let session = self.discovery_session(router);
            let lookup = self
                .rediscovery
                .lookup_routing_table_on_router(&session, router)
                .await;
            if let Err(e) = session.close().await {
                tracing::debug!(%router, error = %e, "Failed to close discovery session");
            }

            if let Some(table) = lookup? {
                return Ok(self.update_routing_table(&current, table));
            }
        }

        Err(DriverError::service_unavailable(
            "Could not perform discovery. No routing servers available.",
        ))
    }

    fn discovery_session(&self, router: &ServerAddress) -> Session<K::Connection> {
        let pool = Arc::clone(&self.pool);
        let router = router.clone();
        Session::new(async move { pool.acquire(&router).await }.boxed(), None)
    }

    /// 새 테이블 채택 후 더 이상 쓰지 않는 서버의 연결 폐기
    fn update_routing_table(&self, old: &RoutingTable, new: RoutingTable) -> Arc<RoutingTable> {
        let new = Arc::new(new);
        self.table.store(Arc::clone(&new));
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            routers = ?new.known_routers(),
            readers = ?new.readers().to_vec(),
            writers = ?new.writers().to_vec(),
            "Updated routing table"
        );

        for address in old.servers_diff(&new) {
            self.pool.purge(&address);
        }
        new
    }

    /// 모드에 맞는 서버로 연결 획득
    ///
    /// 선택된 주소는 연결을 시도하기 전에 `origin`으로 공개된다. 연결에
    /// 실패해도 실패 분류기가 그 주소를 제거할 수 있다.
    async fn acquire_connection(
        self: &Arc<Self>,
        mode: AccessMode,
        origin: watch::Sender<Option<ServerAddress>>,
    ) -> DriverResult<PooledConnection<K::Connection>> {
        let table = self.fresh_routing_table().await?;
        let selector = match mode {
            AccessMode::Read => table.readers(),
            AccessMode::Write => table.writers(),
        };

        let address = selector.next().ok_or_else(|| {
            DriverError::session_expired(format!(
                "No {} servers available",
                mode.as_str().to_lowercase()
            ))
        })?;

        tracing::debug!(%address, %mode, "Selected server");
        origin.send_replace(Some(address.clone()));
        self.pool.acquire(&address).await
    }

    /// 테이블과 풀에서 주소 제거
    fn forget(&self, address: &ServerAddress) {
        tracing::debug!(%address, "Forgetting server");
        self.table.load().forget(address);
        self.pool.purge(address);
    }

    /// 라이터 목록에서만 주소 제거
    fn forget_writer(&self, address: &ServerAddress) {
        tracing::debug!(%address, "Removing server from writers");
        self.table.load().writers().remove(address);
    }
}

impl<K: Connector> RoutingState<K> {
    /// 세션 실패 분류
    ///
    /// - 서비스 불가/세션 만료: 해당 주소를 테이블과 풀에서 제거하고 원래 에러 반환
    /// - `NotALeader`: 라이터에서만 제거하고 `SessionExpired`로 변환
    /// - 그 외: 그대로 반환
    ///
    /// 주소가 아직 확정되지 않았으면 확정될 때까지 제거를 미룬다.
    fn on_failure(self: &Arc<Self>, error: DriverError, origin: ConnectionAddress) -> DriverError {
        let code = error.code().to_string();
        match code.as_str() {
            SERVICE_UNAVAILABLE | SESSION_EXPIRED => {
                tracing::warn!(address = ?origin.known(), error = %error, "Server unavailable");
                self.when_resolved(origin, Self::forget);
                error
            }
            NOT_A_LEADER => {
                let shown = origin
                    .known()
                    .map(|address| address.to_string())
                    .unwrap_or_else(|| UNKNOWN_CODE.to_string());
                tracing::warn!(address = %shown, "Server is no longer the leader");
                self.when_resolved(origin, Self::forget_writer);
                DriverError::session_expired(format!(
                    "No longer possible to write to server at {}",
                    shown
                ))
            }
            _ => error,
        }
    }

    fn when_resolved(self: &Arc<Self>, origin: ConnectionAddress, action: fn(&Self, &ServerAddress)) {
        if let Some(address) = origin.known() {
            action(self, &address);
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let state = Arc::clone(self);
        handle.spawn(async move {
            if let Some(address) = origin.resolved().await {
                action(&state, &address);
            }
        });
    }
}

// ============================================================================
// RoutingDriver - 라우팅 드라이버
// ============================================================================

/// 라우팅 드라이버
///
/// zeta4g:// 스킴을 사용하여 클러스터에 연결합니다.
pub struct RoutingDriver<K: Connector> {
    state: Arc<RoutingState<K>>,
    config: Arc<DriverConfig>,
}

impl<K: Connector> RoutingDriver<K> {
    /// 새 라우팅 드라이버 생성
    ///
    /// URI 형식: `zeta4g://host1:port1,host2:port2,...`
    pub fn new(uri: &str, auth: AuthToken, connector: K) -> DriverResult<Self> {
        if !is_routing_uri(uri) {
            return Err(DriverError::configuration(format!(
                "Unsupported routing URI: {}",
                uri
            )));
        }
        let config = DriverConfig::new(uri, auth)?;
        Self::with_config(config, connector)
    }

    /// 설정으로 라우팅 드라이버 생성
    pub fn with_config(config: DriverConfig, connector: K) -> DriverResult<Self> {
        config.ensure_routing_compatible()?;

        let config = Arc::new(config);
        let pool = Arc::new(ConnectionPool::new(connector, Arc::clone(&config)));
        let table = RoutingTable::seeded(config.routers.clone());

        Ok(Self {
            state: Arc::new(RoutingState {
                table: ArcSwap::from_pointee(table),
                pool,
                rediscovery: Rediscovery::new(),
                refresh: Mutex::new(None),
                open: AtomicBool::new(true),
                refreshes: AtomicU64::new(0),
                open_sessions: Arc::new(AtomicUsize::new(0)),
            }),
            config,
        })
    }

    /// 세션 생성
    ///
    /// 연결은 첫 쿼리 실행 시 획득된다.
    pub fn session(&self, config: SessionConfig) -> DriverResult<RoutingSession<K::Connection>> {
        self.state.ensure_open()?;

        let mode = config.default_access_mode;
        let state = Arc::clone(&self.state);
        let (origin, address) = ConnectionAddress::pending();
        let pending = async move { state.acquire_connection(mode, origin).await }.boxed();

        let sessions = Arc::clone(&self.state.open_sessions);
        sessions.fetch_add(1, Ordering::Relaxed);
        let on_close: OnClose = Box::new(move || {
            sessions.fetch_sub(1, Ordering::Relaxed);
        });

        let state = Arc::clone(&self.state);
        let on_failure: FailureHandler =
            Arc::new(move |error: DriverError, origin: ConnectionAddress| state.on_failure(error, origin));

        Ok(RoutingSession::new(
            Session::with_address(pending, address, Some(on_close)),
            mode,
            on_failure,
        ))
    }

    /// 모드 문자열로 세션 생성 (`READ` / `WRITE`)
    pub fn session_for_mode(&self, mode: &str) -> DriverResult<RoutingSession<K::Connection>> {
        let mode: AccessMode = mode.parse()?;
        self.session(SessionConfig::new().with_access_mode(mode))
    }

    /// 연결 테스트 (최신 라우팅 테이블 확보)
    pub async fn verify_connectivity(&self) -> DriverResult<()> {
        self.state.ensure_open()?;
        self.state.fresh_routing_table().await.map(|_| ())
    }

    /// 현재 라우팅 테이블 스냅샷
    pub fn routing_table(&self) -> Arc<RoutingTable> {
        self.state.table.load_full()
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }

    /// 드라이버 종료
    pub async fn close(&self) -> DriverResult<()> {
        if !self.state.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::debug!("Closing routing driver");
        self.state.pool.close();
        Ok(())
    }

    /// 드라이버 메트릭
    pub fn metrics(&self) -> RoutingDriverMetrics {
        let table = self.state.table.load();
        RoutingDriverMetrics {
            pool: self.state.pool.metrics(),
            routers: table.routers().len(),
            readers: table.readers().len(),
            writers: table.writers().len(),
            refreshes: self.state.refreshes.load(Ordering::Relaxed),
            open_sessions: self.state.open_sessions.load(Ordering::Relaxed),
        }
    }
}

impl<K: Connector> Clone for RoutingDriver<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            config: Arc::clone(&self.config),
        }
    }
}

impl<K: Connector> fmt::Debug for RoutingDriver<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingDriver")
            .field("routers", &self.config.routers)
            .field("open", &self.is_open())
            .field("table", &self.state.table.load_full())
            .finish()
    }
}

/// 라우팅 드라이버 메트릭
#[derive(Debug, Clone, Default)]
pub struct RoutingDriverMetrics {
    /// 연결 풀 메트릭
    pub pool: PoolMetrics,
    /// 라우터 수
    pub routers: usize,
    /// 리더 수
    pub readers: usize,
    /// 라이터 수
    pub writers: usize,
    /// 라우팅 테이블 교체 횟수
    pub refreshes: u64,
    /// 열린 세션 수
    pub open_sessions: usize,
}

const ROUTING_SCHEMES: [&str; 3] = ["zeta4g://", "zeta4g+s://", "zeta4g+ssc://"];

/// URI가 라우팅 드라이버용인지 확인
pub fn is_routing_uri(uri: &str) -> bool {
    ROUTING_SCHEMES.iter().any(|scheme| uri.starts_with(scheme))
}

/// URI에서 다중 라우터 파싱
pub fn parse_routing_uri(uri: &str) -> DriverResult<Vec<ServerAddress>> {
    let hosts = ROUTING_SCHEMES
        .iter()
        .find_map(|scheme| uri.strip_prefix(scheme))
        .unwrap_or(uri)
        .trim_end_matches('/');

    let routers = hosts
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ServerAddress::parse)
        .collect::<DriverResult<Vec<_>>>()?;

    if routers.is_empty() {
        return Err(DriverError::configuration("No routers specified"));
    }

    Ok(routers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::driver::driver::{TrustStrategy, DEFAULT_PORT};
    use crate::driver::error::PROCEDURE_NOT_FOUND;
    use crate::driver::test_support::{
        addr, discovery_reply, failure_reply, Reply, ScriptedConnection, ScriptedConnector,
    };
    use crate::driver::routing::rediscovery::GET_SERVERS_QUERY;

    fn routing_driver(connector: &ScriptedConnector, uri: &str) -> RoutingDriver<ScriptedConnector> {
        RoutingDriver::new(uri, AuthToken::none(), connector.clone()).unwrap()
    }

    /// r1이 readers [n1, n2], writers [n1]을 알려주는 클러스터
    fn cluster() -> ScriptedConnector {
        let connector = ScriptedConnector::new();
        connector.reply(
            &addr("r1:7687"),
            discovery_reply(300, &["r1:7687"], &["n1:7687", "n2:7687"], &["n1:7687"]),
        );
        connector
    }

    async fn settle(mut done: impl FnMut() -> bool) {
        for _ in 0..50 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    fn known(address: &str) -> (tokio::sync::watch::Sender<Option<ServerAddress>>, ConnectionAddress) {
        let (tx, origin) = ConnectionAddress::pending();
        tx.send_replace(Some(addr(address)));
        (tx, origin)
    }

    #[test]
    fn test_is_routing_uri() {
        assert!(is_routing_uri("zeta4g://localhost:7687"));
        assert!(is_routing_uri("zeta4g+s://localhost:7687"));
        assert!(is_routing_uri("zeta4g+ssc://localhost:7687"));
        assert!(!is_routing_uri("bolt://localhost:7687"));
        assert!(!is_routing_uri("bolt+s://localhost:7687"));
    }

    #[test]
    fn test_parse_routing_uri() {
        let routers = parse_routing_uri("zeta4g://server1:7687,server2:7688").unwrap();
        assert_eq!(
            routers,
            vec![ServerAddress::new("server1", 7687), ServerAddress::new("server2", 7688)]
        );
    }

    #[test]
    fn test_parse_routing_uri_default_port() {
        let routers = parse_routing_uri("zeta4g+s://server1, server2:7688/").unwrap();
        assert_eq!(routers[0].port, DEFAULT_PORT);
        assert_eq!(routers[1].port, 7688);
    }

    #[test]
    fn test_parse_routing_uri_invalid() {
        assert!(parse_routing_uri("zeta4g://").is_err());
        assert!(parse_routing_uri("zeta4g://server1:port").is_err());
    }

    #[test]
    fn test_routing_driver_rejects_non_routing_uri() {
        let err = RoutingDriver::new("bolt://localhost:7687", AuthToken::none(), ScriptedConnector::new())
            .unwrap_err();
        assert!(matches!(err, DriverError::Configuration(_)));
    }

    #[test]
    fn test_routing_driver_rejects_trust_on_first_use() {
        let config = DriverConfig::builder("zeta4g://localhost:7687", AuthToken::none())
            .unwrap()
            .with_trust_strategy(TrustStrategy::TrustOnFirstUse)
            .build();

        let err = RoutingDriver::with_config(config, ScriptedConnector::new()).unwrap_err();
        assert!(matches!(err, DriverError::Configuration(_)));
        assert!(err.message().contains("not compatible with a routing driver"));
    }

    #[test]
    fn test_routing_driver_starts_with_seed_routers() {
        let driver = routing_driver(&ScriptedConnector::new(), "zeta4g://r1:7687,r2:7687");
        let table = driver.routing_table();

        assert!(table.is_stale());
        assert_eq!(table.known_routers(), vec![addr("r1:7687"), addr("r2:7687")]);

        let metrics = driver.metrics();
        assert_eq!(metrics.routers, 2);
        assert_eq!(metrics.pool.addresses, 0);
    }

    #[tokio::test]
    async fn test_first_session_triggers_discovery() {
        let connector = cluster();
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let session = driver.session_for_mode("READ").unwrap();
        assert_eq!(connector.total_connects(), 0);

        session.run("RETURN 1").await.unwrap();

        assert_eq!(connector.queries_to(&addr("r1:7687")), vec![GET_SERVERS_QUERY]);
        assert_eq!(connector.queries_to(&addr("n1:7687")), vec!["RETURN 1"]);
        assert!(!driver.routing_table().is_stale());
        assert_eq!(driver.metrics().refreshes, 1);
    }

    #[tokio::test]
    async fn test_read_sessions_round_robin() {
        let connector = cluster();
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        for _ in 0..3 {
            let session = driver.session_for_mode("read").unwrap();
            session.run("RETURN 1").await.unwrap();
            session.close().await.unwrap();
        }

        assert_eq!(connector.queries_to(&addr("n1:7687")).len(), 2);
        assert_eq!(connector.queries_to(&addr("n2:7687")).len(), 1);
        assert_eq!(connector.queries_to(&addr("r1:7687")).len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_falls_through_failing_routers() {
        let connector = ScriptedConnector::new();
        connector.unreachable(&addr("r1:7687"));
        connector.reply(
            &addr("r2:7687"),
            failure_reply("Neo.TransientError.General.DatabaseUnavailable", "not ready"),
        );
        connector.reply(
            &addr("r3:7687"),
            discovery_reply(300, &["r3:7687"], &["n1:7687"], &["n1:7687"]),
        );
        let driver = routing_driver(&connector, "zeta4g://r1:7687,r2:7687,r3:7687");
        let old = driver.routing_table();

        let table = driver.state.fresh_routing_table().await.unwrap();

        assert_eq!(table.known_routers(), vec![addr("r3:7687")]);
        assert!(Arc::ptr_eq(&table, &driver.routing_table()));

        // 실패한 라우터는 이전 테이블과 풀에서 제거되고 r3는 남는다
        assert_eq!(old.known_routers(), vec![addr("r3:7687")]);
        assert!(!driver.state.pool.has_address(&addr("r1:7687")));
        assert!(!driver.state.pool.has_address(&addr("r2:7687")));
        assert!(driver.state.pool.has_address(&addr("r3:7687")));
    }

    #[tokio::test]
    async fn test_refresh_exhaustion_keeps_table() {
        let connector = ScriptedConnector::new();
        connector.unreachable(&addr("r1:7687"));
        connector.reply(&addr("r2:7687"), Reply::Broken);
        let driver = routing_driver(&connector, "zeta4g://r1:7687,r2:7687");
        let before = driver.routing_table();

        let err = driver.verify_connectivity().await.unwrap_err();

        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
        assert_eq!(err.message(), "Could not perform discovery. No routing servers available.");
        assert!(Arc::ptr_eq(&before, &driver.routing_table()));
        assert_eq!(driver.metrics().refreshes, 0);
    }

    #[tokio::test]
    async fn test_procedure_not_found_aborts_refresh() {
        let connector = ScriptedConnector::new();
        connector.reply(&addr("r1:7687"), failure_reply(PROCEDURE_NOT_FOUND, "unknown procedure"));
        connector.reply(
            &addr("r2:7687"),
            discovery_reply(300, &["r2:7687"], &["n1:7687"], &["n1:7687"]),
        );
        let driver = routing_driver(&connector, "zeta4g://r1:7687,r2:7687");

        let err = driver.verify_connectivity().await.unwrap_err();

        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
        assert!(err.message().contains("r1:7687 could not perform routing"));
        assert!(connector.queries_to(&addr("r2:7687")).is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_run_discovery_once() {
        let connector = cluster();
        connector.delay_queries(Duration::from_millis(20));
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let results = futures::future::join_all((0..5).map(|_| driver.verify_connectivity())).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(connector.queries_to(&addr("r1:7687")).len(), 1);
        assert_eq!(driver.metrics().refreshes, 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_failed_refresh() {
        let connector = ScriptedConnector::new();
        connector.reply(&addr("r1:7687"), Reply::Broken);
        connector.delay_queries(Duration::from_millis(20));
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let results = futures::future::join_all((0..5).map(|_| driver.verify_connectivity())).await;

        for result in results {
            let err = result.unwrap_err();
            assert!(matches!(err, DriverError::ServiceUnavailable(_)));
            assert_eq!(err.message(), "Could not perform discovery. No routing servers available.");
        }
        assert_eq!(connector.connects_to(&addr("r1:7687")), 1);
        assert_eq!(connector.queries_to(&addr("r1:7687")).len(), 1);

        // 실패한 갱신이 끝나면 다음 호출은 새로 조회한다
        assert!(driver.verify_connectivity().await.is_err());
        assert_eq!(connector.queries_to(&addr("r1:7687")).len(), 2);
    }

    #[tokio::test]
    async fn test_refresh_purges_removed_servers() {
        let connector = ScriptedConnector::new();
        connector.reply(
            &addr("r1:7687"),
            discovery_reply(0, &["r1:7687"], &["n1:7687"], &["n2:7687"]),
        );
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let session = driver.session_for_mode("WRITE").unwrap();
        session.run("CREATE (n)").await.unwrap();
        session.close().await.unwrap();
        assert!(driver.state.pool.has_address(&addr("n2:7687")));

        connector.reply(
            &addr("r1:7687"),
            discovery_reply(300, &["r1:7687"], &["n1:7687"], &["n1:7687"]),
        );
        driver.verify_connectivity().await.unwrap();

        assert!(!driver.state.pool.has_address(&addr("n2:7687")));
        assert!(driver.state.pool.has_address(&addr("r1:7687")));
    }

    #[tokio::test]
    async fn test_no_write_servers_available() {
        let connector = ScriptedConnector::new();
        connector.reply(&addr("r1:7687"), discovery_reply(300, &["r1:7687"], &["n1:7687"], &[]));
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let session = driver.session_for_mode("WRITE").unwrap();
        let err = session.run("CREATE (n)").await.unwrap_err();

        assert!(matches!(err, DriverError::SessionExpired(ref m) if m == "No write servers available"));
        assert_eq!(connector.connects_to(&addr("n1:7687")), 0);
    }

    #[tokio::test]
    async fn test_not_a_leader_demotes_writer() {
        let connector = cluster();
        connector.reply(&addr("n1:7687"), failure_reply(NOT_A_LEADER, "not the leader"));
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let session = driver.session_for_mode("WRITE").unwrap();
        let err = session.run("CREATE (n)").await.unwrap_err();

        assert!(matches!(err, DriverError::SessionExpired(_)));
        assert_eq!(err.message(), "No longer possible to write to server at n1:7687");

        let table = driver.routing_table();
        assert!(!table.writers().contains(&addr("n1:7687")));
        assert!(table.readers().contains(&addr("n1:7687")));
        assert!(driver.state.pool.has_address(&addr("n1:7687")));
    }

    #[tokio::test]
    async fn test_not_a_leader_with_unknown_address() {
        let driver = routing_driver(&ScriptedConnector::new(), "zeta4g://r1:7687");
        let (_tx, origin) = ConnectionAddress::pending();

        let err = driver
            .state
            .on_failure(DriverError::server(NOT_A_LEADER, "not the leader"), origin);

        assert_eq!(err.message(), "No longer possible to write to server at UNKNOWN");
    }

    #[tokio::test]
    async fn test_unavailable_server_is_forgotten() {
        let connector = cluster();
        connector.reply(&addr("n1:7687"), Reply::Broken);
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let session = driver.session_for_mode("READ").unwrap();
        let err = session.run("RETURN 1").await.unwrap_err();

        assert!(matches!(err, DriverError::Connection(_)));
        let table = driver.routing_table();
        assert!(!table.readers().contains(&addr("n1:7687")));
        assert!(!table.writers().contains(&addr("n1:7687")));
        assert!(!driver.state.pool.has_address(&addr("n1:7687")));
    }

    #[tokio::test]
    async fn test_unreachable_reader_is_forgotten() {
        let connector = ScriptedConnector::new();
        connector.reply(
            &addr("r1:7687"),
            discovery_reply(300, &["r1:7687"], &["n1:7687", "n2:7687"], &["n3:7687"]),
        );
        connector.unreachable(&addr("n1:7687"));
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let session = driver.session_for_mode("READ").unwrap();
        let err = session.run("RETURN 1").await.unwrap_err();

        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
        assert!(err.message().contains("n1:7687"));
        assert_eq!(session.connection_address().known(), Some(addr("n1:7687")));

        let table = driver.routing_table();
        assert_eq!(table.readers().to_vec(), vec![addr("n2:7687")]);
        assert!(!table.is_stale());
        assert!(!driver.state.pool.has_address(&addr("n1:7687")));

        for _ in 0..4 {
            let session = driver.session_for_mode("READ").unwrap();
            session.run("RETURN 1").await.unwrap();
            session.close().await.unwrap();
        }
        assert_eq!(connector.connects_to(&addr("n1:7687")), 1);
        assert_eq!(connector.queries_to(&addr("n2:7687")).len(), 4);
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_blame_any_server() {
        let connector = ScriptedConnector::new();
        connector.unreachable(&addr("r1:7687"));
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let session = driver.session_for_mode("READ").unwrap();
        let err = session.run("RETURN 1").await.unwrap_err();

        assert!(matches!(err, DriverError::ServiceUnavailable(_)));
        assert!(session.connection_address().known().is_none());
        assert_eq!(driver.routing_table().known_routers(), vec![addr("r1:7687")]);
    }

    #[tokio::test]
    async fn test_repeated_unavailable_failure_is_idempotent() {
        let connector = cluster();
        let driver = routing_driver(&connector, "zeta4g://r1:7687");
        let session = driver.session_for_mode("READ").unwrap();
        session.run("RETURN 1").await.unwrap();
        session.close().await.unwrap();
        assert!(driver.state.pool.has_address(&addr("n1:7687")));

        let (_tx, origin) = known("n1:7687");
        let mut snapshots = Vec::new();
        for _ in 0..2 {
            let err = driver
                .state
                .on_failure(DriverError::service_unavailable("gone"), origin.clone());
            assert!(matches!(err, DriverError::ServiceUnavailable(ref m) if m == "gone"));
            snapshots.push(driver.metrics().pool);
        }

        let table = driver.routing_table();
        assert_eq!(table.readers().to_vec(), vec![addr("n2:7687")]);
        assert_eq!(table.known_routers(), vec![addr("r1:7687")]);
        assert!(!driver.state.pool.has_address(&addr("n1:7687")));
        assert_eq!(snapshots[0], snapshots[1]);
        assert_eq!(snapshots[1].addresses, 1);
    }

    #[tokio::test]
    async fn test_forget_waits_for_pending_address() {
        let driver = routing_driver(&cluster(), "zeta4g://r1:7687");
        driver.verify_connectivity().await.unwrap();
        let (tx, origin) = ConnectionAddress::pending();

        driver
            .state
            .on_failure(DriverError::session_expired("expired"), origin);
        tokio::task::yield_now().await;
        assert!(driver.routing_table().readers().contains(&addr("n2:7687")));

        tx.send_replace(Some(addr("n2:7687")));
        let table = driver.routing_table();
        settle(|| !table.readers().contains(&addr("n2:7687"))).await;
        assert!(!table.readers().contains(&addr("n2:7687")));
    }

    #[tokio::test]
    async fn test_abandoned_address_forgets_nothing() {
        let driver = routing_driver(&cluster(), "zeta4g://r1:7687");
        driver.verify_connectivity().await.unwrap();
        let (tx, origin) = ConnectionAddress::pending();

        driver
            .state
            .on_failure(DriverError::service_unavailable("gone"), origin);
        drop(tx);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(driver.routing_table().all_servers().len(), 3);
    }

    #[tokio::test]
    async fn test_other_failures_pass_through() {
        let driver = routing_driver(&cluster(), "zeta4g://r1:7687");
        driver.verify_connectivity().await.unwrap();
        let (_tx, origin) = known("n1:7687");

        let err = driver.state.on_failure(
            DriverError::server("Neo.ClientError.Statement.SyntaxError", "bad"),
            origin,
        );

        assert_eq!(err.code(), "Neo.ClientError.Statement.SyntaxError");
        assert_eq!(driver.routing_table().all_servers().len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_mode_fails_without_network() {
        let connector = cluster();
        let driver = routing_driver(&connector, "zeta4g://r1:7687");

        let err = driver.session_for_mode("ADMIN").unwrap_err();

        assert!(matches!(err, DriverError::IllegalArgument(_)));
        assert_eq!(connector.total_connects(), 0);
        assert!(driver.routing_table().is_stale());
    }

    #[tokio::test]
    async fn test_open_sessions_metric() {
        let driver = routing_driver(&cluster(), "zeta4g://r1:7687");

        let session = driver.session(SessionConfig::builder().with_read_access().build()).unwrap();
        assert_eq!(session.mode(), AccessMode::Read);
        assert_eq!(driver.metrics().open_sessions, 1);

        drop(session);
        assert_eq!(driver.metrics().open_sessions, 0);
    }

    #[tokio::test]
    async fn test_closed_driver_refuses_sessions() {
        let connector = cluster();
        let driver = routing_driver(&connector, "zeta4g://r1:7687");
        driver.verify_connectivity().await.unwrap();

        driver.close().await.unwrap();
        driver.close().await.unwrap();

        assert!(!driver.is_open());
        assert!(matches!(driver.session_for_mode("READ"), Err(DriverError::Session(_))));
        assert!(driver.verify_connectivity().await.is_err());
        assert_eq!(driver.metrics().pool.addresses, 0);
    }

    #[allow(dead_code)]
    fn assert_send_sync() {
        fn check<T: Send + Sync>() {}
        check::<RoutingDriver<ScriptedConnector>>();
        check::<RoutingSession<ScriptedConnection>>();
    }
}
