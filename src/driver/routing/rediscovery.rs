//! 라우팅 테이블 조회
//!
//! 라우터에서 클러스터 구성(`getServers`)을 조회해 새 라우팅 테이블을 만듭니다.

use std::time::Duration;

use super::super::driver::ServerAddress;
use super::super::error::{DriverError, DriverResult, PROCEDURE_NOT_FOUND};
use super::super::pool::Connection;
use super::super::record::Record;
use super::super::session::{Query, Session};
use super::super::types::Value;
use super::table::{RoutingTable, ServerRole};

/// 클러스터 구성 조회 프로시저
pub const GET_SERVERS_QUERY: &str = "CALL dbms.cluster.routing.getServers";

/// 라우팅 테이블 조회기
#[derive(Debug, Clone, Default)]
pub struct Rediscovery;

impl Rediscovery {
    /// 새 조회기 생성
    pub fn new() -> Self {
        Self
    }

    /// 라우터에서 라우팅 테이블 조회
    ///
    /// 연결 실패나 잘못된 응답은 `Ok(None)`으로 처리해 호출자가 다음 라우터를
    /// 시도하게 한다. 라우터가 클러스터 멤버가 아니면(`ProcedureNotFound`)
    /// 더 시도해도 소용없으므로 `ServiceUnavailable`을 반환한다.
    pub async fn lookup_routing_table_on_router<C: Connection>(
        &self,
        session: &Session<C>,
        router: &ServerAddress,
    ) -> DriverResult<Option<RoutingTable>> {
        let records = match session.run(Query::new(GET_SERVERS_QUERY)).await {
            Ok(records) => records,
            Err(e) if e.code() == PROCEDURE_NOT_FOUND => {
                return Err(DriverError::service_unavailable(format!(
                    "Server {} could not perform routing. Make sure you are connecting to a causal cluster",
                    router
                )));
            }
            Err(e) => {
                tracing::warn!(%router, error = %e, "Routing table lookup failed");
                return Ok(None);
            }
        };

        match parse_routing_table(&records) {
            Ok(table) => Ok(Some(table)),
            Err(e) => {
                tracing::warn!(%router, error = %e, "Invalid routing table received");
                Ok(None)
            }
        }
    }
}

/// `getServers` 응답을 라우팅 테이블로 변환
///
/// 응답은 `ttl`(초)과 `servers`(`role`, `addresses` 맵 목록)를 가진 레코드
/// 하나여야 한다. 알 수 없는 역할과 파싱할 수 없는 주소는 무시한다.
pub fn parse_routing_table(records: &[Record]) -> DriverResult<RoutingTable> {
    let record = match records {
        [record] => record,
        _ => {
            return Err(DriverError::protocol(format!(
                "Expected exactly one routing record, received {}",
                records.len()
            )))
        }
    };

    let ttl = record
        .get("ttl")
        .and_then(Value::as_int)
        .ok_or_else(|| DriverError::protocol("Routing record has no integer 'ttl'"))?;
    let servers = record
        .get("servers")
        .and_then(Value::as_list)
        .ok_or_else(|| DriverError::protocol("Routing record has no 'servers' list"))?;

    let mut routers = Vec::new();
    let mut readers = Vec::new();
    let mut writers = Vec::new();

    for server in servers {
        let Some(entry) = server.as_map() else {
            continue;
        };
        let Some(role) = entry.get("role").and_then(Value::as_str).and_then(ServerRole::parse) else {
            continue;
        };
        let addresses = entry
            .get("addresses")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_str)
            .filter_map(|s| ServerAddress::parse(s).ok());

        match role {
            ServerRole::Route => routers.extend(addresses),
            ServerRole::Read => readers.extend(addresses),
            ServerRole::Write => writers.extend(addresses),
        }
    }

    if routers.is_empty() {
        return Err(DriverError::protocol("Received no routers"));
    }
    if readers.is_empty() {
        return Err(DriverError::protocol("Received no readers"));
    }

    let ttl = Duration::from_secs(u64::try_from(ttl).unwrap_or(0));
    Ok(RoutingTable::with_ttl(routers, readers, writers, ttl))
}
