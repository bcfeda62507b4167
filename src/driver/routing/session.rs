//! 라우팅 세션
//!
//! 실행 실패를 드라이버의 실패 분류기로 넘긴 뒤 호출자에게 돌려줍니다.

use std::fmt;
use std::sync::Arc;

use super::super::error::{DriverError, DriverResult};
use super::super::pool::Connection;
use super::super::record::Record;
use super::super::session::{AccessMode, ConnectionAddress, Query, Session};

/// 실패 분류기: 실패와 그 발생 주소를 받아 호출자에게 보낼 에러를 돌려준다
pub type FailureHandler = Arc<dyn Fn(DriverError, ConnectionAddress) -> DriverError + Send + Sync>;

/// 라우팅 세션
pub struct RoutingSession<C: Connection> {
    session: Session<C>,
    mode: AccessMode,
    on_failure: FailureHandler,
}

impl<C: Connection> RoutingSession<C> {
    /// 새 라우팅 세션 생성
    pub fn new(session: Session<C>, mode: AccessMode, on_failure: FailureHandler) -> Self {
        Self {
            session,
            mode,
            on_failure,
        }
    }

    /// 쿼리 실행
    pub async fn run(&self, query: impl Into<Query>) -> DriverResult<Vec<Record>> {
        self.session
            .run(query)
            .await
            .map_err(|e| (self.on_failure)(e, self.session.connection_address()))
    }

    /// 접근 모드
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// 연결 주소 핸들
    pub fn connection_address(&self) -> ConnectionAddress {
        self.session.connection_address()
    }

    /// 열린 상태 여부
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    /// 세션 닫기
    pub async fn close(&self) -> DriverResult<()> {
        self.session.close().await
    }
}

impl<C: Connection> fmt::Debug for RoutingSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingSession")
            .field("mode", &self.mode)
            .field("session", &self.session)
            .finish()
    }
}
