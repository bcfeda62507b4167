//! Driver Error Types
//!
//! 드라이버 에러 정의 및 서버 실패 코드 정규화

use std::collections::HashMap;
use std::fmt;
use std::io;
use thiserror::Error;

use super::types::Value;

// ============================================================================
// Error Codes
// ============================================================================

/// 서비스 불가 클래스 코드
pub const SERVICE_UNAVAILABLE: &str = "ServiceUnavailable";

/// 세션 만료 클래스 코드 (재획득 후 재시도)
pub const SESSION_EXPIRED: &str = "SessionExpired";

/// 프로토콜 에러 클래스 코드
pub const PROTOCOL_ERROR: &str = "ProtocolError";

/// 리더십을 잃은 라이터가 반환하는 서버 코드
pub const NOT_A_LEADER: &str = "Neo.ClientError.Cluster.NotALeader";

/// 라우팅 프로시저가 없는 서버(클러스터 멤버 아님)가 반환하는 서버 코드
pub const PROCEDURE_NOT_FOUND: &str = "Neo.ClientError.Procedure.ProcedureNotFound";

/// 코드가 없는 실패에 사용하는 기본 코드
pub const UNKNOWN_CODE: &str = "UNKNOWN";

/// 메시지가 없는 실패에 사용하는 기본 메시지
pub const UNKNOWN_MESSAGE: &str = "Unknown failure";

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
#[derive(Error, Debug)]
pub enum DriverError {
    /// 연결 에러
    #[error("Connection error: {0}")]
    Connection(String),

    /// 프로토콜 에러
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 세션 에러
    #[error("Session error: {0}")]
    Session(String),

    /// 세션 만료 (새 연결을 획득해 재시도해야 함)
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// 서비스 불가
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 잘못된 인자 (재시도 불가)
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// 타임아웃 에러
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 풀 에러
    #[error("Pool error: {0}")]
    Pool(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),

    /// 서버 에러
    #[error("Server error: {code} - {message}")]
    Server { code: String, message: String },

    /// 서버가 보낸 원시 실패 메타데이터
    #[error("Server failure: {0}")]
    Failure(FailureMetadata),

    /// I/O 에러
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl DriverError {
    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 세션 만료 에러 생성
    pub fn session_expired(msg: impl Into<String>) -> Self {
        Self::SessionExpired(msg.into())
    }

    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 잘못된 인자 에러 생성
    pub fn illegal_argument(msg: impl Into<String>) -> Self {
        Self::IllegalArgument(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 풀 에러 생성
    pub fn pool(msg: impl Into<String>) -> Self {
        Self::Pool(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 서버 에러 생성
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Server {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 정규화된 에러 코드
    ///
    /// 연결 계층 실패(`Connection`, `Io`)는 서비스 불가 클래스로 취급한다.
    /// 서버 실패에 코드가 없으면 [`UNKNOWN_CODE`]를 반환한다.
    pub fn code(&self) -> &str {
        match self {
            Self::ServiceUnavailable(_) | Self::Connection(_) | Self::Io(_) => SERVICE_UNAVAILABLE,
            Self::SessionExpired(_) => SESSION_EXPIRED,
            Self::Protocol(_) => PROTOCOL_ERROR,
            Self::Session(_) => "SessionError",
            Self::IllegalArgument(_) => "IllegalArgument",
            Self::Timeout(_) => "Timeout",
            Self::Pool(_) => "PoolError",
            Self::Configuration(_) => "ConfigurationError",
            Self::TypeConversion(_) => "TypeConversionError",
            Self::Server { code, .. } => non_empty(code).unwrap_or(UNKNOWN_CODE),
            Self::Failure(metadata) => metadata.code().unwrap_or(UNKNOWN_CODE),
        }
    }

    /// 정규화된 에러 메시지
    pub fn message(&self) -> String {
        match self {
            Self::Connection(msg)
            | Self::Protocol(msg)
            | Self::Session(msg)
            | Self::SessionExpired(msg)
            | Self::ServiceUnavailable(msg)
            | Self::IllegalArgument(msg)
            | Self::Timeout(msg)
            | Self::Pool(msg)
            | Self::Configuration(msg)
            | Self::TypeConversion(msg) => msg.clone(),
            Self::Server { message, .. } => non_empty(message).unwrap_or(UNKNOWN_MESSAGE).to_string(),
            Self::Failure(metadata) => metadata.message().unwrap_or(UNKNOWN_MESSAGE).to_string(),
            Self::Io(err) => err.to_string(),
        }
    }

    /// 서비스 불가 또는 세션 만료 클래스 여부
    pub fn is_unavailable(&self) -> bool {
        matches!(self.code(), SERVICE_UNAVAILABLE | SESSION_EXPIRED)
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Server { .. } | Self::Failure(_) => is_retryable_code(self.code()),
            _ => self.is_unavailable(),
        }
    }

    /// 클라이언트 에러 여부
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::IllegalArgument(_) | Self::Configuration(_) | Self::TypeConversion(_)
        )
    }
}

/// 진행 중인 라우팅 갱신 결과를 대기자들과 공유하기 위한 복제
///
/// `io::Error`는 종류와 메시지만 보존한다.
impl Clone for DriverError {
    fn clone(&self) -> Self {
        match self {
            Self::Connection(msg) => Self::Connection(msg.clone()),
            Self::Protocol(msg) => Self::Protocol(msg.clone()),
            Self::Session(msg) => Self::Session(msg.clone()),
            Self::SessionExpired(msg) => Self::SessionExpired(msg.clone()),
            Self::ServiceUnavailable(msg) => Self::ServiceUnavailable(msg.clone()),
            Self::IllegalArgument(msg) => Self::IllegalArgument(msg.clone()),
            Self::Timeout(msg) => Self::Timeout(msg.clone()),
            Self::Pool(msg) => Self::Pool(msg.clone()),
            Self::Configuration(msg) => Self::Configuration(msg.clone()),
            Self::TypeConversion(msg) => Self::TypeConversion(msg.clone()),
            Self::Server { code, message } => Self::Server {
                code: code.clone(),
                message: message.clone(),
            },
            Self::Failure(metadata) => Self::Failure(metadata.clone()),
            Self::Io(err) => Self::Io(io::Error::new(err.kind(), err.to_string())),
        }
    }
}

/// 재시도 가능한 에러 코드 확인
fn is_retryable_code(code: &str) -> bool {
    code.starts_with("Neo.TransientError")
        || code == NOT_A_LEADER
        || code == "Neo.ClientError.General.ForbiddenOnReadOnlyDatabase"
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// FailureMetadata - 원시 서버 실패
// ============================================================================

/// 서버가 보고한 원시 실패 메타데이터
///
/// 서버 구현마다 실패의 모양이 다르다. `code`/`message`가 최상위에 있을 수도 있고,
/// `fields` 리스트의 첫 항목 안에만 있을 수도 있으며, 아예 없을 수도 있다.
/// 조회 메서드는 누락되거나 타입이 맞지 않는 필드를 `None`으로 처리한다.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureMetadata {
    fields: HashMap<String, Value>,
}

impl FailureMetadata {
    /// 메타데이터 맵에서 생성
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self { fields }
    }

    /// 코드와 메시지만으로 생성
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = HashMap::new();
        fields.insert("code".to_string(), Value::String(code.into()));
        fields.insert("message".to_string(), Value::String(message.into()));
        Self { fields }
    }

    /// 원시 필드
    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    /// 실패 코드 (최상위 → `fields[0]` 순으로 조회)
    pub fn code(&self) -> Option<&str> {
        self.lookup("code")
    }

    /// 실패 메시지 (최상위 → `fields[0]` 순으로 조회)
    pub fn message(&self) -> Option<&str> {
        self.lookup("message")
    }

    fn lookup(&self, key: &str) -> Option<&str> {
        string_field(&self.fields, key).or_else(|| {
            self.fields
                .get("fields")
                .and_then(Value::as_list)
                .and_then(|list| list.first())
                .and_then(Value::as_map)
                .and_then(|nested| string_field(nested, key))
        })
    }
}

fn string_field<'a>(map: &'a HashMap<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str).and_then(non_empty)
}

impl fmt::Display for FailureMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.code().unwrap_or(UNKNOWN_CODE),
            self.message().unwrap_or(UNKNOWN_MESSAGE)
        )
    }
}

impl From<FailureMetadata> for DriverError {
    fn from(metadata: FailureMetadata) -> Self {
        DriverError::Failure(metadata)
    }
}

// ============================================================================
// Tests
// ============================================================================
