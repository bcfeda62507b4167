//! 순환 선택기
//!
//! 주소 목록을 라운드 로빈으로 순회합니다.

use parking_lot::Mutex;

use super::super::driver::ServerAddress;

#[derive(Debug, Default)]
struct Cycle {
    items: Vec<ServerAddress>,
    cursor: usize,
}

/// 라운드 로빈 주소 선택기
///
/// 내부 잠금으로 `next`와 `remove`가 경합하지 않는다.
#[derive(Debug, Default)]
pub struct CyclicSelector {
    inner: Mutex<Cycle>,
}

impl CyclicSelector {
    /// 주소 목록으로 선택기 생성
    pub fn new(items: impl IntoIterator<Item = ServerAddress>) -> Self {
        Self {
            inner: Mutex::new(Cycle {
                items: items.into_iter().collect(),
                cursor: 0,
            }),
        }
    }

    /// 다음 주소 (비어 있으면 `None`)
    pub fn next(&self) -> Option<ServerAddress> {
        let mut cycle = self.inner.lock();
        if cycle.items.is_empty() {
            return None;
        }

        let index = cycle.cursor % cycle.items.len();
        cycle.cursor = (index + 1) % cycle.items.len();
        Some(cycle.items[index].clone())
    }

    /// 주소의 모든 항목 제거
    ///
    /// 남은 항목의 순서는 유지되며, 순회는 제거된 항목 다음 항목부터 이어진다.
    pub fn remove(&self, address: &ServerAddress) {
        let mut cycle = self.inner.lock();
        let before_cursor = cycle.items[..cycle.cursor.min(cycle.items.len())]
            .iter()
            .filter(|item| *item == address)
            .count();

        cycle.items.retain(|item| item != address);
        cycle.cursor -= before_cursor;
        if cycle.cursor >= cycle.items.len() {
            cycle.cursor = 0;
        }
    }

    /// 주소 스냅샷
    pub fn to_vec(&self) -> Vec<ServerAddress> {
        self.inner.lock().items.clone()
    }

    /// 주소 포함 여부
    pub fn contains(&self, address: &ServerAddress) -> bool {
        self.inner.lock().items.contains(address)
    }

    /// 주소 수
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

impl FromIterator<ServerAddress> for CyclicSelector {
    fn from_iter<I: IntoIterator<Item = ServerAddress>>(iter: I) -> Self {
        Self::new(iter)
    }
}
