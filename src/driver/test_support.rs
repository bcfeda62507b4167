//! 테스트용 스크립트 커넥터
//!
//! 주소별로 도달 불가, 실패, 응답을 미리 정해 두고 연결/쿼리 횟수를 기록한다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::driver::{DriverConfig, ServerAddress};
use super::error::{DriverError, DriverResult, FailureMetadata};
use super::pool::{Connection, Connector};
use super::record::Record;
use super::session::Query;
use super::types::Value;

/// 주소에 대한 쿼리 응답
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// 레코드 반환
    Records(Vec<Record>),
    /// 서버 실패 반환
    Failure(FailureMetadata),
    /// 연결이 끊어짐
    Broken,
}

#[derive(Debug, Default)]
struct ScriptState {
    unreachable: HashSet<ServerAddress>,
    replies: HashMap<ServerAddress, Reply>,
    connects: Vec<ServerAddress>,
    queries: Vec<(ServerAddress, String)>,
    closed: usize,
    delay: Option<Duration>,
}

/// 스크립트 커넥터
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedConnector {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn unreachable(&self, address: &ServerAddress) {
        self.state.lock().unreachable.insert(address.clone());
    }

    pub(crate) fn reply(&self, address: &ServerAddress, reply: Reply) {
        self.state.lock().replies.insert(address.clone(), reply);
    }

    /// 모든 쿼리 응답 전에 대기
    pub(crate) fn delay_queries(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    pub(crate) fn connects_to(&self, address: &ServerAddress) -> usize {
        self.state.lock().connects.iter().filter(|a| *a == address).count()
    }

    pub(crate) fn total_connects(&self) -> usize {
        self.state.lock().connects.len()
    }

    pub(crate) fn queries_to(&self, address: &ServerAddress) -> Vec<String> {
        self.state
            .lock()
            .queries
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, q)| q.clone())
            .collect()
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.lock().closed
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Connection = ScriptedConnection;

    async fn connect(
        &self,
        address: &ServerAddress,
        _config: &DriverConfig,
    ) -> DriverResult<ScriptedConnection> {
        let mut state = self.state.lock();
        state.connects.push(address.clone());
        if state.unreachable.contains(address) {
            return Err(DriverError::connection(format!("Connection refused: {}", address)));
        }
        Ok(ScriptedConnection {
            address: address.clone(),
            state: Arc::clone(&self.state),
            open: true,
        })
    }
}

/// 스크립트 연결
#[derive(Debug)]
pub(crate) struct ScriptedConnection {
    address: ServerAddress,
    state: Arc<Mutex<ScriptState>>,
    open: bool,
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn address(&self) -> &ServerAddress {
        &self.address
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn run(&mut self, query: &Query) -> DriverResult<Vec<Record>> {
        let (reply, delay) = {
            let mut state = self.state.lock();
            state.queries.push((self.address.clone(), query.text.clone()));
            let reply = state
                .replies
                .get(&self.address)
                .cloned()
                .unwrap_or(Reply::Records(Vec::new()));
            (reply, state.delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Reply::Records(records) => Ok(records),
            Reply::Failure(metadata) => Err(DriverError::Failure(metadata)),
            Reply::Broken => {
                self.open = false;
                Err(DriverError::connection(format!("Connection reset by {}", self.address)))
            }
        }
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.open = false;
        self.state.lock().closed += 1;
        Ok(())
    }
}

/// `host:port` 주소
pub(crate) fn addr(s: &str) -> ServerAddress {
    ServerAddress::parse(s).unwrap()
}

/// 디스커버리 응답 레코드
pub(crate) fn discovery_record(ttl: i64, routers: &[&str], readers: &[&str], writers: &[&str]) -> Record {
    let entry = |role: &str, addresses: &[&str]| {
        let mut map = HashMap::new();
        map.insert("role".to_string(), Value::from(role));
        map.insert(
            "addresses".to_string(),
            Value::List(addresses.iter().map(|a| Value::from(*a)).collect()),
        );
        Value::Map(map)
    };

    Record::new(
        vec!["ttl".into(), "servers".into()],
        vec![
            Value::Integer(ttl),
            Value::List(vec![
                entry("ROUTE", routers),
                entry("READ", readers),
                entry("WRITE", writers),
            ]),
        ],
    )
}

/// 디스커버리 응답
pub(crate) fn discovery_reply(ttl: i64, routers: &[&str], readers: &[&str], writers: &[&str]) -> Reply {
    Reply::Records(vec![discovery_record(ttl, routers, readers, writers)])
}

/// 서버 실패 응답
pub(crate) fn failure_reply(code: &str, message: &str) -> Reply {
    Reply::Failure(FailureMetadata::with_code(code, message))
}
