//! M9.2: Connection Pool
//!
//! 서버 주소별 연결 풀링
//!
//! 물리 연결 수립은 [`Connector`]가, 쿼리 실행은 [`Connection`]이 담당한다.
//! 풀은 주소별 유휴 연결을 재사용하고, 라우팅 계층이 요청하면 특정 주소의
//! 연결을 모두 버린다(`purge`).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::driver::{DriverConfig, ServerAddress};
use super::error::{DriverError, DriverResult};
use super::record::Record;
use super::session::Query;

// ============================================================================
// Connection / Connector - 전송 계층 경계
// ============================================================================

/// 서버와의 물리 연결
#[async_trait]
pub trait Connection: Send + 'static {
    /// 연결된 서버 주소
    fn address(&self) -> &ServerAddress;

    /// 연결이 아직 사용 가능한지 여부
    fn is_open(&self) -> bool {
        true
    }

    /// 쿼리 실행
    async fn run(&mut self, query: &Query) -> DriverResult<Vec<Record>>;

    /// 연결 닫기
    async fn close(&mut self) -> DriverResult<()>;
}

/// 물리 연결 생성기
///
/// 드라이버 설정(인증, TLS, User Agent 등)은 해석 없이 그대로 전달된다.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// 생성되는 연결 타입
    type Connection: Connection;

    /// 주소에 연결
    async fn connect(
        &self,
        address: &ServerAddress,
        config: &DriverConfig,
    ) -> DriverResult<Self::Connection>;
}

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 주소별 동시 사용 연결 수 |
/// | `max_lifetime` | 1시간 | 연결 최대 수명 |
/// | `idle_timeout` | 5분 | 유휴 타임아웃 |
/// | `acquisition_timeout` | 60초 | 연결 획득 타임아웃 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 주소별 최대 연결 수
    pub max_size: usize,
    /// 연결 최대 수명
    pub max_lifetime: Duration,
    /// 유휴 타임아웃
    pub idle_timeout: Duration,
    /// 연결 획득 타임아웃
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            acquisition_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// 빌더 패턴으로 풀 설정 생성
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }
}

/// 풀 설정 빌더
#[derive(Debug, Clone, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// 최대 연결 수 설정
    pub fn max_size(mut self, size: usize) -> Self {
        self.config.max_size = size;
        self
    }

    /// 연결 최대 수명 설정
    pub fn max_lifetime(mut self, duration: Duration) -> Self {
        self.config.max_lifetime = duration;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn idle_timeout(mut self, duration: Duration) -> Self {
        self.config.idle_timeout = duration;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn acquisition_timeout(mut self, duration: Duration) -> Self {
        self.config.acquisition_timeout = duration;
        self
    }

    /// 설정 빌드
    pub fn build(self) -> PoolConfig {
        self.config
    }
}

// ============================================================================
// ConnectionState - 연결 상태
// ============================================================================

/// 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// 사용 중
    InUse,
    /// 오류 (풀로 돌아가지 않고 닫힘)
    Failed,
}

struct Entry<C> {
    id: u64,
    connection: C,
    created_at: Instant,
    last_used: Instant,
}

impl<C: Connection> Entry<C> {
    fn is_valid(&self, config: &PoolConfig) -> bool {
        self.connection.is_open()
            && self.created_at.elapsed() <= config.max_lifetime
            && self.last_used.elapsed() <= config.idle_timeout
    }
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

/// 풀에서 빌려온 연결
///
/// drop 시 자동으로 풀에 반환된다. 실패로 표시된 연결이나 purge된 주소의
/// 연결은 반환되지 않고 닫힌다.
pub struct PooledConnection<C: Connection> {
    entry: Option<Entry<C>>,
    address: ServerAddress,
    state: ConnectionState,
    pool: Arc<AddressPool<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connection> PooledConnection<C> {
    /// 연결 ID
    pub fn id(&self) -> u64 {
        self.entry.as_ref().map(|e| e.id).unwrap_or_default()
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 연결 상태
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 실패로 표시
    pub fn mark_failed(&mut self) {
        self.state = ConnectionState::Failed;
    }

    /// 쿼리 실행
    pub async fn run(&mut self, query: &Query) -> DriverResult<Vec<Record>> {
        let entry = self
            .entry
            .as_mut()
            .ok_or_else(|| DriverError::connection("Connection already released"))?;
        entry.last_used = Instant::now();
        entry.connection.run(query).await
    }
}

impl<C: Connection> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("id", &self.id())
            .field("address", &self.address)
            .field("state", &self.state)
            .finish()
    }
}

impl<C: Connection> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let reusable = self.state != ConnectionState::Failed;
            self.pool.give_back(entry, reusable);
        }
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 주소 수
    pub addresses: usize,
    /// 현재 크기
    pub size: usize,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 닫힌 연결 수
    pub total_closed: u64,
}

// ============================================================================
// AddressPool - 단일 주소 풀
// ============================================================================

struct AddressPool<C: Connection> {
    address: ServerAddress,
    config: PoolConfig,
    idle: Mutex<VecDeque<Entry<C>>>,
    semaphore: Arc<Semaphore>,
    open: AtomicBool,
    size: AtomicUsize,
    in_use: AtomicUsize,
    total_created: AtomicU64,
    total_acquisitions: AtomicU64,
    total_closed: AtomicU64,
    next_id: AtomicU64,
}

impl<C: Connection> AddressPool<C> {
    fn new(address: ServerAddress, config: PoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_size.max(1)));
        Self {
            address,
            config,
            idle: Mutex::new(VecDeque::new()),
            semaphore,
            open: AtomicBool::new(true),
            size: AtomicUsize::new(0),
            in_use: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
            total_acquisitions: AtomicU64::new(0),
            total_closed: AtomicU64::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// 연결 획득. 대기 중 풀이 닫혔으면 `None`
    async fn acquire<K>(
        self: &Arc<Self>,
        connector: &K,
        driver_config: &DriverConfig,
    ) -> DriverResult<Option<PooledConnection<C>>>
    where
        K: Connector<Connection = C>,
    {
        let permit = tokio::time::timeout(
            self.config.acquisition_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| {
            DriverError::timeout(format!("Connection acquisition timeout for {}", self.address))
        })?
        .map_err(|_| DriverError::pool("Pool semaphore closed"))?;

        if !self.open.load(Ordering::Acquire) {
            return Ok(None);
        }

        let entry = match self.take_idle() {
            Some(entry) => entry,
            None => self.create(connector, driver_config).await?,
        };

        self.total_acquisitions.fetch_add(1, Ordering::Relaxed);
        self.in_use.fetch_add(1, Ordering::Relaxed);

        Ok(Some(PooledConnection {
            entry: Some(entry),
            address: self.address.clone(),
            state: ConnectionState::InUse,
            pool: Arc::clone(self),
            _permit: permit,
        }))
    }

    fn take_idle(&self) -> Option<Entry<C>> {
        let mut idle = self.idle.lock();
        let mut expired = Vec::new();
        let mut found = None;

        while let Some(entry) = idle.pop_front() {
            if entry.is_valid(&self.config) {
                found = Some(entry);
                break;
            }
            expired.push(entry.connection);
        }
        drop(idle);

        self.discard(expired);
        found
    }

    async fn create<K>(&self, connector: &K, driver_config: &DriverConfig) -> DriverResult<Entry<C>>
    where
        K: Connector<Connection = C>,
    {
        let connection = connector
            .connect(&self.address, driver_config)
            .await
            .map_err(|e| match e {
                e if e.is_unavailable() || matches!(e, DriverError::Timeout(_)) => {
                    DriverError::service_unavailable(format!(
                        "Unable to connect to {}: {}",
                        self.address,
                        e.message()
                    ))
                }
                other => other,
            })?;

        tracing::debug!(address = %connection.address(), "Opened connection");
        let now = Instant::now();
        self.size.fetch_add(1, Ordering::Relaxed);
        self.total_created.fetch_add(1, Ordering::Relaxed);

        Ok(Entry {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            connection,
            created_at: now,
            last_used: now,
        })
    }

    fn give_back(&self, mut entry: Entry<C>, reusable: bool) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);

        if reusable && self.open.load(Ordering::Acquire) && entry.is_valid(&self.config) {
            entry.last_used = Instant::now();
            self.idle.lock().push_back(entry);
        } else {
            self.discard(vec![entry.connection]);
        }
    }

    /// 풀 닫기: 유휴 연결을 닫고 이후 반환되는 연결도 닫는다
    fn close(&self) {
        self.open.store(false, Ordering::Release);
        let drained: Vec<C> = self.idle.lock().drain(..).map(|e| e.connection).collect();
        self.discard(drained);
    }

    fn discard(&self, connections: Vec<C>) {
        if connections.is_empty() {
            return;
        }
        self.size.fetch_sub(connections.len(), Ordering::Relaxed);
        self.total_closed
            .fetch_add(connections.len() as u64, Ordering::Relaxed);
        close_detached(&self.address, connections);
    }

    fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            addresses: 1,
            size: self.size.load(Ordering::Relaxed),
            idle: self.idle.lock().len(),
            in_use: self.in_use.load(Ordering::Relaxed),
            total_acquisitions: self.total_acquisitions.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
        }
    }
}

/// 런타임이 있으면 백그라운드에서 연결을 닫는다 (best-effort)
fn close_detached<C: Connection>(address: &ServerAddress, connections: Vec<C>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };

    let address = address.clone();
    handle.spawn(async move {
        for mut connection in connections {
            if let Err(e) = connection.close().await {
                tracing::debug!(%address, error = %e, "Failed to close discarded connection");
            }
        }
    });
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 주소별 연결 풀
pub struct ConnectionPool<K: Connector> {
    connector: Arc<K>,
    driver_config: Arc<DriverConfig>,
    config: PoolConfig,
    pools: RwLock<HashMap<ServerAddress, Arc<AddressPool<K::Connection>>>>,
    open: AtomicBool,
}

impl<K: Connector> ConnectionPool<K> {
    /// 새 연결 풀 생성
    pub fn new(connector: K, driver_config: Arc<DriverConfig>) -> Self {
        let config = driver_config.pool_config();
        Self {
            connector: Arc::new(connector),
            driver_config,
            config,
            pools: RwLock::new(HashMap::new()),
            open: AtomicBool::new(true),
        }
    }

    /// 주소에 대한 연결 획득
    ///
    /// 대기하는 동안 주소가 purge되면 새 풀에서 한 번 더 시도한다.
    pub async fn acquire(&self, address: &ServerAddress) -> DriverResult<PooledConnection<K::Connection>> {
        for _ in 0..2 {
            if !self.open.load(Ordering::Acquire) {
                return Err(DriverError::pool("Pool is closed"));
            }

            let pool = self.get_or_create_pool(address);
            if let Some(connection) = pool.acquire(self.connector.as_ref(), &self.driver_config).await? {
                return Ok(connection);
            }
            tracing::debug!(%address, "Pool was purged while waiting for a connection");
        }

        Err(DriverError::service_unavailable(format!(
            "Connections to {} were purged",
            address
        )))
    }

    /// 주소의 모든 연결 폐기
    ///
    /// 유휴 연결은 즉시 닫히고, 사용 중인 연결은 반환 시점에 닫힌다.
    /// 풀에 없는 주소에 대해서도 안전하다.
    pub fn purge(&self, address: &ServerAddress) {
        let removed = self.pools.write().remove(address);
        if let Some(pool) = removed {
            tracing::debug!(%address, "Purging connections");
            pool.close();
        }
    }

    /// 풀 닫기
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        let pools: Vec<_> = self.pools.write().drain().map(|(_, pool)| pool).collect();
        for pool in pools {
            pool.close();
        }
    }

    /// 풀이 관리 중인 주소인지 확인
    pub fn has_address(&self, address: &ServerAddress) -> bool {
        self.pools.read().contains_key(address)
    }

    /// 관리 중인 주소 목록
    pub fn addresses(&self) -> Vec<ServerAddress> {
        self.pools.read().keys().cloned().collect()
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        self.pools
            .read()
            .values()
            .map(|pool| pool.metrics())
            .fold(PoolMetrics::default(), |mut acc, m| {
                acc.addresses += m.addresses;
                acc.size += m.size;
                acc.idle += m.idle;
                acc.in_use += m.in_use;
                acc.total_acquisitions += m.total_acquisitions;
                acc.total_created += m.total_created;
                acc.total_closed += m.total_closed;
                acc
            })
    }

    fn get_or_create_pool(&self, address: &ServerAddress) -> Arc<AddressPool<K::Connection>> {
        if let Some(pool) = self.pools.read().get(address) {
            return Arc::clone(pool);
        }

        let mut pools = self.pools.write();
        Arc::clone(
            pools
                .entry(address.clone())
                .or_insert_with(|| Arc::new(AddressPool::new(address.clone(), self.config.clone()))),
        )
    }
}

impl<K: Connector> std::fmt::Debug for ConnectionPool<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addresses", &self.addresses())
            .field("open", &self.open.load(Ordering::Relaxed))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
