//! 전송 설정

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::selector::Strategy;
use crate::{
    Result, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE,
    DEFAULT_RECV_BUFFER_SIZE, INITIAL_SSTHRESH,
};

/// ATP 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 최소 청크 크기 (바이트)
    pub min_chunk_size: u32,

    /// 최대 청크 크기 (바이트)
    pub max_chunk_size: u32,

    /// 품질 측정 전 초기 청크 크기 (바이트)
    pub initial_chunk_size: u32,

    /// 초기 Slow Start 임계값 (세그먼트)
    pub initial_ssthresh: u32,

    /// 혼잡 윈도우 1 단위당 바이트 수
    /// 1이면 윈도우 값을 그대로 바이트 수로 사용
    pub window_unit: usize,

    /// 수신 버퍼 크기 (바이트)
    pub recv_buffer_size: usize,

    /// 연결 타임아웃 (밀리초, 0이면 OS 기본값)
    pub connect_timeout_ms: u64,

    /// 읽기 타임아웃 (밀리초, 0이면 무제한)
    pub read_timeout_ms: u64,

    /// 쓰기 타임아웃 (밀리초, 0이면 무제한)
    pub write_timeout_ms: u64,

    /// 노드 선택 전략
    pub strategy: Strategy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            initial_chunk_size: DEFAULT_CHUNK_SIZE,
            initial_ssthresh: INITIAL_SSTHRESH,
            window_unit: 1,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            connect_timeout_ms: 0,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
            strategy: Strategy::RoundRobin,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 이름으로 프리셋 선택
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "low-spec" => Some(Self::low_spec()),
            "high-performance" => Some(Self::high_performance()),
            "unstable-network" => Some(Self::unstable_network()),
            _ => None,
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        millis(self.write_timeout_ms)
    }

    /// 전략 이름 파싱 후 설정
    pub fn with_strategy_name(mut self, name: &str) -> Result<Self> {
        self.strategy = name.parse::<Strategy>()?;
        Ok(self)
    }

    /// 저사양 기기용 설정
    pub fn low_spec() -> Self {
        Self {
            min_chunk_size: 512,
            max_chunk_size: 16 * 1024,        // 16KB
            initial_chunk_size: 2 * 1024,
            initial_ssthresh: 32,
            window_unit: 536,                 // 최소 MSS
            recv_buffer_size: 2048,
            connect_timeout_ms: 5000,
            read_timeout_ms: 10000,
            write_timeout_ms: 10000,
            strategy: Strategy::LeastConnections,
        }
    }

    /// 고성능 기기용 설정
    pub fn high_performance() -> Self {
        Self {
            min_chunk_size: 4 * 1024,
            max_chunk_size: 256 * 1024,       // 256KB
            initial_chunk_size: 64 * 1024,
            initial_ssthresh: 128,
            window_unit: 1460,                // 이더넷 MSS
            recv_buffer_size: 64 * 1024,
            connect_timeout_ms: 2000,
            read_timeout_ms: 3000,
            write_timeout_ms: 3000,
            strategy: Strategy::WeightedRoundRobin,
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            min_chunk_size: 256,              // 작은 청크
            max_chunk_size: 8 * 1024,
            initial_chunk_size: 1024,
            initial_ssthresh: 16,
            window_unit: 536,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            connect_timeout_ms: 10000,
            read_timeout_ms: 15000,
            write_timeout_ms: 15000,
            strategy: Strategy::RoundRobin,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
