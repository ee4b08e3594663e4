//! 노드 선택 (로드 밸런서)
//!
//! 연결 수립 전에 대상 노드를 고른다. 송신 경로에서는 사용하지 않는다.
//!
//! - RoundRobin: 등록 순서대로 순환, 비활성 노드 건너뜀
//! - WeightedRoundRobin: 가중치 비례 랜덤 선택
//! - LeastConnections: 활성 연결 수 최소 노드
//! - Random: 균등 랜덤 선택

use std::fmt;
use std::str::FromStr;

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// 노드 선택 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    Random,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::RoundRobin => "round-robin",
            Strategy::WeightedRoundRobin => "weighted-round-robin",
            Strategy::LeastConnections => "least-connections",
            Strategy::Random => "random",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "round-robin" => Ok(Strategy::RoundRobin),
            "weighted-round-robin" => Ok(Strategy::WeightedRoundRobin),
            "least-connections" => Ok(Strategy::LeastConnections),
            "random" => Ok(Strategy::Random),
            _ => Err(Error::UnknownStrategy(s.to_string())),
        }
    }
}

/// 선택된 노드 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub address: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address.contains(':') {
            write!(f, "[{}]:{}", self.address, self.port)
        } else {
            write!(f, "{}:{}", self.address, self.port)
        }
    }
}

/// 노드 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// 주소 (address, port 쌍이 키)
    pub address: String,

    /// 포트
    pub port: u16,

    /// 가중치 (>= 1)
    pub weight: u32,

    /// 현재 활성 연결 수
    pub active_connections: u32,

    /// 활성 상태
    pub is_active: bool,
}

impl NodeInfo {
    fn new(address: &str, port: u16, weight: u32) -> Self {
        Self {
            address: address.to_string(),
            port,
            weight: weight.max(1),
            active_connections: 0,
            is_active: true,
        }
    }

    fn matches(&self, address: &str, port: u16) -> bool {
        self.address == address && self.port == port
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }
}

/// 균등 난수 공급원
pub trait RandomSource: Send {
    /// `[0, upper)` 범위의 균등 난수 (`upper > 0`)
    fn draw(&mut self, upper: u64) -> u64;
}

/// 스레드 로컬 RNG 기반 난수 공급원
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn draw(&mut self, upper: u64) -> u64 {
        rand::thread_rng().gen_range(0..upper)
    }
}

/// 잠금 하나로 보호되는 선택기 상태
struct Registry {
    nodes: Vec<NodeInfo>,
    strategy: Strategy,

    /// 마지막 라운드로빈 선택 위치 (None 이면 처음부터)
    cursor: Option<usize>,

    rng: Box<dyn RandomSource>,
}

impl Registry {
    fn position(&self, address: &str, port: u16) -> Option<usize> {
        self.nodes.iter().position(|n| n.matches(address, port))
    }

    fn round_robin(&mut self) -> Option<usize> {
        let len = self.nodes.len();
        let start = self.cursor.map_or(0, |c| c + 1);

        for step in 0..len {
            let idx = (start + step) % len;
            if self.nodes[idx].is_active {
                self.cursor = Some(idx);
                return Some(idx);
            }
        }
        None
    }

    fn weighted(&mut self) -> Option<usize> {
        let total: u64 = self
            .nodes
            .iter()
            .filter(|n| n.is_active)
            .map(|n| n.weight as u64)
            .sum();
        if total == 0 {
            return None;
        }

        let point = self.rng.draw(total);
        let mut cumulative = 0u64;

        for (idx, node) in self.nodes.iter().enumerate() {
            if !node.is_active {
                continue;
            }
            cumulative += node.weight as u64;
            if cumulative > point {
                return Some(idx);
            }
        }

        // 폴백: 첫 번째 활성 노드
        self.nodes.iter().position(|n| n.is_active)
    }

    fn least_connections(&self) -> Option<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_active)
            // min_by_key 는 동률일 때 마지막을 고르므로 직접 비교
            .fold(None, |best: Option<(usize, u32)>, (idx, n)| match best {
                Some((_, conns)) if conns <= n.active_connections => best,
                _ => Some((idx, n.active_connections)),
            })
            .map(|(idx, _)| idx)
    }

    fn random(&mut self) -> Option<usize> {
        let active: Vec<usize> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_active)
            .map(|(idx, _)| idx)
            .collect();
        if active.is_empty() {
            return None;
        }

        let pick = self.rng.draw(active.len() as u64) as usize;
        active.get(pick).copied()
    }
}

/// 노드 선택기
///
/// 모든 연산은 하나의 잠금 구간에서 수행되므로 `Arc` 로 공유할 수 있다.
pub struct NodeSelector {
    inner: Mutex<Registry>,
}

impl Default for NodeSelector {
    fn default() -> Self {
        Self::new(Strategy::RoundRobin)
    }
}

impl fmt::Debug for NodeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("NodeSelector")
            .field("strategy", &inner.strategy)
            .field("nodes", &inner.nodes)
            .finish()
    }
}

impl NodeSelector {
    /// 새 선택기 생성
    pub fn new(strategy: Strategy) -> Self {
        Self::with_random(strategy, ThreadRandom)
    }

    /// 난수 공급원 지정 생성
    pub fn with_random(strategy: Strategy, rng: impl RandomSource + 'static) -> Self {
        Self {
            inner: Mutex::new(Registry {
                nodes: Vec::new(),
                strategy,
                cursor: None,
                rng: Box::new(rng),
            }),
        }
    }

    /// 노드 추가 (이미 있으면 가중치 갱신 후 활성화)
    pub fn add_node(&self, address: &str, port: u16, weight: u32) {
        let mut inner = self.inner.lock();
        match inner.position(address, port) {
            Some(idx) => {
                let node = &mut inner.nodes[idx];
                node.weight = weight.max(1);
                node.is_active = true;
            }
            None => {
                inner.nodes.push(NodeInfo::new(address, port, weight));
                debug!("노드 추가: {}:{} (weight={})", address, port, weight.max(1));
            }
        }
    }

    /// 노드 제거
    ///
    /// 라운드로빈 위치는 제거 전에 마지막으로 고른 노드를 계속 가리킨다.
    /// 그 노드가 제거되면 바로 앞 노드로 옮긴다.
    pub fn remove_node(&self, address: &str, port: u16) {
        let mut inner = self.inner.lock();
        let Some(idx) = inner.position(address, port) else {
            return;
        };
        inner.nodes.remove(idx);

        inner.cursor = match inner.cursor {
            _ if inner.nodes.is_empty() => None,
            Some(cursor) if idx < cursor => Some(cursor - 1),
            Some(cursor) if idx == cursor => cursor.checked_sub(1),
            other => other,
        };
        debug!("노드 제거: {}:{}", address, port);
    }

    /// 노드 활성 상태 변경
    pub fn set_active(&self, address: &str, port: u16, is_active: bool) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.position(address, port) {
            inner.nodes[idx].is_active = is_active;
            debug!("노드 상태 변경: {}:{} active={}", address, port, is_active);
        }
    }

    /// 전략 변경 (라운드로빈 위치 초기화)
    pub fn set_strategy(&self, strategy: Strategy) {
        let mut inner = self.inner.lock();
        inner.strategy = strategy;
        inner.cursor = None;
    }

    pub fn strategy(&self) -> Strategy {
        self.inner.lock().strategy
    }

    /// 다음 노드 선택
    pub fn next(&self) -> Result<Endpoint> {
        let mut inner = self.inner.lock();
        if inner.nodes.is_empty() {
            return Err(Error::NoActiveNodes);
        }

        let picked = match inner.strategy {
            Strategy::RoundRobin => inner.round_robin(),
            Strategy::WeightedRoundRobin => inner.weighted(),
            Strategy::LeastConnections => inner.least_connections(),
            Strategy::Random => inner.random(),
        };

        let idx = picked.ok_or(Error::NoActiveNodes)?;
        let endpoint = inner.nodes[idx].endpoint();
        debug!("노드 선택 ({}): {}", inner.strategy, endpoint);
        Ok(endpoint)
    }

    /// 연결 수 증가
    pub fn acquire(&self, address: &str, port: u16) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.position(address, port) {
            let node = &mut inner.nodes[idx];
            node.active_connections = node.active_connections.saturating_add(1);
        }
    }

    /// 연결 수 감소
    pub fn release(&self, address: &str, port: u16) {
        let mut inner = self.inner.lock();
        if let Some(idx) = inner.position(address, port) {
            let node = &mut inner.nodes[idx];
            node.active_connections = node.active_connections.saturating_sub(1);
        }
    }

    /// 등록된 노드 복사 (등록 순서)
    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.inner.lock().nodes.clone()
    }

    /// 전체 노드 수
    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 활성 노드 수
    pub fn active_count(&self) -> usize {
        self.inner.lock().nodes.iter().filter(|n| n.is_active).count()
    }
}
