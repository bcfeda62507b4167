//! M9.4: Session Management
//!
//! 세션 관리
//!
//! 세션은 아직 획득되지 않은 연결(pending)을 들고 시작하며, 첫 쿼리 실행 시
//! 연결을 확정한다. 확정된 주소는 [`ConnectionAddress`]로 외부에 공개된다.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::driver::ServerAddress;
use super::error::{DriverError, DriverResult};
use super::pool::{Connection, PooledConnection};
use super::record::Record;
use super::types::Value;

// ============================================================================
// AccessMode - 접근 모드
// ============================================================================

/// 접근 모드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// 읽기
    Read,
    /// 쓰기
    #[default]
    Write,
}

impl AccessMode {
    /// 모드 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "READ",
            AccessMode::Write => "WRITE",
        }
    }
}

impl FromStr for AccessMode {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "READ" => Ok(AccessMode::Read),
            "WRITE" => Ok(AccessMode::Write),
            _ => Err(DriverError::illegal_argument(format!(
                "Illegal session mode {}",
                s
            ))),
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SessionConfig - 세션 설정
// ============================================================================

/// 세션 설정
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 기본 접근 모드
    pub default_access_mode: AccessMode,
}

impl SessionConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 시작
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::new()
    }

    /// 접근 모드 설정
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.default_access_mode = mode;
        self
    }
}

/// 세션 설정 빌더
#[derive(Debug, Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// 새 빌더 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 읽기 모드로 설정
    pub fn with_read_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Read;
        self
    }

    /// 쓰기 모드로 설정
    pub fn with_write_access(mut self) -> Self {
        self.config.default_access_mode = AccessMode::Write;
        self
    }

    /// 빌드
    pub fn build(self) -> SessionConfig {
        self.config
    }
}

// ============================================================================
// Query - 쿼리
// ============================================================================

/// 쿼리
#[derive(Debug, Clone)]
pub struct Query {
    /// 쿼리 텍스트
    pub text: String,
    /// 파라미터
    pub parameters: HashMap<String, Value>,
}

impl Query {
    /// 새 쿼리 생성
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// ConnectionAddress - 연결 주소 핸들
// ============================================================================

/// 세션 연결의 서버 주소 핸들
///
/// 연결이 확정되기 전에는 주소를 알 수 없다. [`resolved`](Self::resolved)는
/// 주소가 확정될 때까지 기다리며, 연결 획득이 실패하면 `None`을 반환한다.
#[derive(Debug, Clone)]
pub struct ConnectionAddress {
    rx: watch::Receiver<Option<ServerAddress>>,
}

impl ConnectionAddress {
    /// 이미 확정된 주소
    pub fn known(&self) -> Option<ServerAddress> {
        self.rx.borrow().clone()
    }

    /// 주소가 확정될 때까지 대기
    pub async fn resolved(mut self) -> Option<ServerAddress> {
        let address = match self.rx.wait_for(Option::is_some).await {
            Ok(address) => address.clone(),
            Err(_) => None,
        };
        address
    }

    /// 아직 확정되지 않은 핸들과 그 송신단
    pub fn pending() -> (watch::Sender<Option<ServerAddress>>, Self) {
        let (tx, rx) = watch::channel(None);
        (tx, Self { rx })
    }
}

// ============================================================================
// Session - 세션
// ============================================================================

/// 아직 획득되지 않은 풀 연결
pub type PendingConnection<C> = BoxFuture<'static, DriverResult<PooledConnection<C>>>;

/// 세션 종료 콜백
pub type OnClose = Box<dyn FnOnce() + Send>;

enum Slot<C: Connection> {
    Pending(PendingConnection<C>),
    Ready(PooledConnection<C>),
    Failed(String),
    Released,
}

/// 데이터베이스 세션
pub struct Session<C: Connection> {
    slot: tokio::sync::Mutex<Slot<C>>,
    address_tx: Mutex<Option<watch::Sender<Option<ServerAddress>>>>,
    address: ConnectionAddress,
    on_close: Mutex<Option<OnClose>>,
    open: AtomicBool,
}

impl<C: Connection> Session<C> {
    /// 새 세션 생성
    ///
    /// 주소는 연결이 확정될 때 공개된다.
    pub fn new(connection: PendingConnection<C>, on_close: Option<OnClose>) -> Self {
        let (tx, address) = ConnectionAddress::pending();
        Self {
            slot: tokio::sync::Mutex::new(Slot::Pending(connection)),
            address_tx: Mutex::new(Some(tx)),
            address,
            on_close: Mutex::new(on_close),
            open: AtomicBool::new(true),
        }
    }

    /// 주소를 외부에서 공개하는 세션 생성
    ///
    /// `address`의 송신단은 `connection` 쪽이 들고 있어야 한다. 서버를
    /// 고른 뒤 연결 전에 주소를 보내면, 연결 실패도 그 주소에 귀속된다.
    pub fn with_address(
        connection: PendingConnection<C>,
        address: ConnectionAddress,
        on_close: Option<OnClose>,
    ) -> Self {
        Self {
            slot: tokio::sync::Mutex::new(Slot::Pending(connection)),
            address_tx: Mutex::new(None),
            address,
            on_close: Mutex::new(on_close),
            open: AtomicBool::new(true),
        }
    }

    /// 쿼리 실행
    pub async fn run(&self, query: impl Into<Query>) -> DriverResult<Vec<Record>> {
        self.ensure_open()?;
        let query = query.into();

        let mut slot = self.slot.lock().await;
        if matches!(*slot, Slot::Pending(_)) {
            // 획득 도중 취소되면 Failed로 남는다
            let current = std::mem::replace(
                &mut *slot,
                Slot::Failed("Connection acquisition was cancelled".to_string()),
            );
            if let Slot::Pending(pending) = current {
                match pending.await {
                    Ok(connection) => {
                        self.publish_address(connection.address().clone());
                        *slot = Slot::Ready(connection);
                    }
                    Err(e) => {
                        self.abandon_address();
                        *slot = Slot::Failed(e.message());
                        return Err(e);
                    }
                }
            }
        }

        let connection = match &mut *slot {
            Slot::Ready(connection) => connection,
            Slot::Failed(message) => {
                return Err(DriverError::session_expired(format!(
                    "Session has no connection: {}",
                    message
                )))
            }
            Slot::Pending(_) | Slot::Released => {
                return Err(DriverError::session("Session is closed"))
            }
        };

        let result = connection.run(&query).await;
        if let Err(e) = &result {
            if e.is_unavailable() {
                connection.mark_failed();
            }
        }
        result
    }

    /// 연결 주소 핸들
    pub fn connection_address(&self) -> ConnectionAddress {
        self.address.clone()
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// 세션 닫기
    ///
    /// 연결은 풀로 반환되고 종료 콜백은 한 번만 호출된다.
    pub async fn close(&self) -> DriverResult<()> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let released = std::mem::replace(&mut *self.slot.lock().await, Slot::Released);
        if !matches!(released, Slot::Ready(_)) {
            self.abandon_address();
        }
        drop(released);

        self.fire_on_close();
        Ok(())
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(DriverError::session("Session is closed"))
        }
    }

    fn publish_address(&self, address: ServerAddress) {
        if let Some(tx) = self.address_tx.lock().take() {
            // 수신자가 모두 사라졌어도 무시
            let _ = tx.send(Some(address));
        }
    }

    fn abandon_address(&self) {
        self.address_tx.lock().take();
    }

    fn fire_on_close(&self) {
        if let Some(on_close) = self.on_close.lock().take() {
            on_close();
        }
    }
}

impl<C: Connection> Drop for Session<C> {
    fn drop(&mut self) {
        self.fire_on_close();
    }
}

impl<C: Connection> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address.known())
            .field("open", &self.is_open())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
