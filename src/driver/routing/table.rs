//! 라우팅 테이블
//!
//! 클러스터의 서버 역할별 목록과 만료 시각을 관리합니다.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use super::super::driver::ServerAddress;
use super::selector::CyclicSelector;

/// TTL 상한 (약 100년). 이보다 긴 TTL은 이 값으로 잘린다.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// 서버 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerRole {
    /// 라우팅 테이블 제공자
    Route,
    /// 쓰기 처리 (리더)
    Write,
    /// 읽기 처리
    Read,
}

impl ServerRole {
    /// 문자열에서 역할 파싱 (대소문자 무시)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ROUTE" => Some(Self::Route),
            "WRITE" => Some(Self::Write),
            "READ" => Some(Self::Read),
            _ => None,
        }
    }

    /// 역할을 문자열로 변환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Route => "ROUTE",
            Self::Write => "WRITE",
            Self::Read => "READ",
        }
    }
}

/// 라우팅 테이블
///
/// 갱신 시에는 통째로 교체되며, 주소 제거(`forget`)만 제자리에서 일어난다.
#[derive(Debug)]
pub struct RoutingTable {
    routers: CyclicSelector,
    readers: CyclicSelector,
    writers: CyclicSelector,
    expires_at: Instant,
}

impl RoutingTable {
    /// 새 라우팅 테이블 생성
    pub fn new(
        routers: Vec<ServerAddress>,
        readers: Vec<ServerAddress>,
        writers: Vec<ServerAddress>,
        expires_at: Instant,
    ) -> Self {
        Self {
            routers: CyclicSelector::new(routers),
            readers: CyclicSelector::new(readers),
            writers: CyclicSelector::new(writers),
            expires_at,
        }
    }

    /// 지금부터 `ttl` 후 만료되는 테이블 생성
    pub fn with_ttl(
        routers: Vec<ServerAddress>,
        readers: Vec<ServerAddress>,
        writers: Vec<ServerAddress>,
        ttl: Duration,
    ) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl.min(MAX_TTL))
            .or_else(|| now.checked_add(Duration::from_secs(24 * 60 * 60)))
            .unwrap_or(now);
        Self::new(routers, readers, writers, expires_at)
    }

    /// 초기 라우터만 가진 테이블 (이미 만료됨)
    pub fn seeded(routers: Vec<ServerAddress>) -> Self {
        Self::new(routers, Vec::new(), Vec::new(), Instant::now())
    }

    /// 갱신 필요 여부
    ///
    /// 만료되었거나 리더/라이터가 하나도 없으면 stale이다.
    pub fn is_stale(&self) -> bool {
        Instant::now() >= self.expires_at || self.readers.is_empty() || self.writers.is_empty()
    }

    /// 현재 라우터 스냅샷
    pub fn known_routers(&self) -> Vec<ServerAddress> {
        self.routers.to_vec()
    }

    /// 모든 역할의 주소 집합
    pub fn all_servers(&self) -> HashSet<ServerAddress> {
        self.routers
            .to_vec()
            .into_iter()
            .chain(self.readers.to_vec())
            .chain(self.writers.to_vec())
            .collect()
    }

    /// 이 테이블에는 있지만 `newer`에는 없는 주소
    pub fn servers_diff(&self, newer: &RoutingTable) -> HashSet<ServerAddress> {
        let retained = newer.all_servers();
        self.all_servers()
            .into_iter()
            .filter(|address| !retained.contains(address))
            .collect()
    }

    /// 모든 역할에서 주소 제거
    pub fn forget(&self, address: &ServerAddress) {
        self.routers.remove(address);
        self.readers.remove(address);
        self.writers.remove(address);
    }

    /// 라우터 선택기
    pub fn routers(&self) -> &CyclicSelector {
        &self.routers
    }

    /// 리더 선택기
    pub fn readers(&self) -> &CyclicSelector {
        &self.readers
    }

    /// 라이터 선택기
    pub fn writers(&self) -> &CyclicSelector {
        &self.writers
    }

    /// 만료 시각
    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }
}
