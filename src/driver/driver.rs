//! M9.1: Driver Configuration
//!
//! 드라이버 설정, 서버 주소, 인증 토큰

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::{DriverError, DriverResult};
use super::pool::PoolConfig;
use super::routing::parse_routing_uri;

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// AuthToken - 인증 토큰
// ============================================================================

/// 인증 토큰
///
/// 라우팅 계층은 토큰을 해석하지 않고 [`Connector`](super::pool::Connector)에 그대로 전달한다.
#[derive(Debug, Clone, Default)]
pub enum AuthToken {
    /// 인증 없음
    #[default]
    None,
    /// Basic 인증 (사용자명/비밀번호)
    Basic {
        username: String,
        password: String,
        realm: Option<String>,
    },
    /// Bearer 토큰
    Bearer { token: String },
}

impl AuthToken {
    /// Basic 인증 토큰 생성
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
            realm: None,
        }
    }

    /// Bearer 토큰 생성
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }

    /// 인증 없음
    pub fn none() -> Self {
        Self::None
    }

    /// 인증 스킴
    pub fn scheme(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Basic { .. } => "basic",
            Self::Bearer { .. } => "bearer",
        }
    }
}

// ============================================================================
// TrustStrategy - TLS 신뢰 전략
// ============================================================================

/// TLS 신뢰 전략
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustStrategy {
    /// 시스템 인증서 사용
    #[default]
    TrustSystemCas,
    /// 모든 인증서 신뢰 (개발용)
    TrustAllCertificates,
    /// 특정 인증서만 신뢰
    TrustCustomCas {
        certificates: Vec<Vec<u8>>,
    },
    /// 최초 접속 시 인증서를 기억 (단일 서버 전용)
    ///
    /// 디스커버리로 알게 된 서버들의 신원을 검증할 수 없으므로 라우팅 드라이버에서는 거부된다.
    TrustOnFirstUse,
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host` 또는 `host:port` 파싱
    pub fn parse(s: &str) -> DriverResult<Self> {
        let s = s.trim();
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [host] if !host.is_empty() => Ok(Self::new(*host, DEFAULT_PORT)),
            [host, port] if !host.is_empty() => {
                let port = port
                    .parse()
                    .map_err(|_| DriverError::configuration(format!("Invalid port in '{}'", s)))?;
                Ok(Self::new(*host, port))
            }
            _ => Err(DriverError::configuration(format!("Invalid server address '{}'", s))),
        }
    }

    /// URI에서 파싱 (스킴 제거 후 `host:port`)
    pub fn from_uri(uri: &str) -> DriverResult<Self> {
        let rest = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
        Self::parse(rest.trim_end_matches('/'))
    }

    /// 소켓 주소로 변환
    pub fn to_socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for ServerAddress {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 초기(시드) 라우터 주소
    pub routers: Vec<ServerAddress>,
    /// 인증 토큰
    pub auth: AuthToken,
    /// TLS 암호화
    pub encrypted: bool,
    /// TLS 신뢰 전략
    pub trust_strategy: TrustStrategy,
    /// 서버별 연결 풀 최대 크기
    pub max_connection_pool_size: usize,
    /// 연결 획득 타임아웃
    pub connection_acquisition_timeout: Duration,
    /// 연결 타임아웃
    pub connection_timeout: Duration,
    /// 연결 최대 수명
    pub max_connection_lifetime: Duration,
    /// 유휴 연결 타임아웃
    pub idle_timeout: Duration,
    /// Keep-Alive 활성화
    pub keep_alive: bool,
    /// User Agent
    pub user_agent: String,
}

impl DriverConfig {
    /// 새 설정 생성
    ///
    /// URI 형식: `zeta4g://host1:port1,host2:port2,...`
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let encrypted = uri.contains("+s://") || uri.contains("+ssc://");
        let routers = parse_routing_uri(uri)?;

        Ok(Self {
            routers,
            auth,
            encrypted,
            ..Self::default()
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 라우팅 드라이버와 호환되는 설정인지 확인
    pub fn ensure_routing_compatible(&self) -> DriverResult<()> {
        if self.trust_strategy == TrustStrategy::TrustOnFirstUse {
            return Err(DriverError::configuration(
                "The chosen trust mode is not compatible with a routing driver",
            ));
        }
        if self.routers.is_empty() {
            return Err(DriverError::configuration("At least one router is required"));
        }
        Ok(())
    }

    /// 서버별 풀 설정
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_size: self.max_connection_pool_size,
            max_lifetime: self.max_connection_lifetime,
            idle_timeout: self.idle_timeout,
            acquisition_timeout: self.connection_acquisition_timeout,
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            routers: vec![ServerAddress::default()],
            auth: AuthToken::default(),
            encrypted: false,
            trust_strategy: TrustStrategy::default(),
            max_connection_pool_size: 100,
            connection_acquisition_timeout: Duration::from_secs(60),
            connection_timeout: Duration::from_secs(30),
            max_connection_lifetime: Duration::from_secs(3600),
            idle_timeout: Duration::from_secs(300),
            keep_alive: true,
            user_agent: format!("Zeta4G/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// TLS 암호화 설정
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.config.encrypted = encrypted;
        self
    }

    /// TLS 신뢰 전략 설정
    pub fn with_trust_strategy(mut self, strategy: TrustStrategy) -> Self {
        self.config.trust_strategy = strategy;
        self
    }

    /// 연결 풀 크기 설정
    pub fn with_max_connection_pool_size(mut self, size: usize) -> Self {
        self.config.max_connection_pool_size = size;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 연결 최대 수명 설정
    pub fn with_max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_connection_lifetime = lifetime;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    /// Keep-Alive 설정
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// Tests
// ============================================================================
