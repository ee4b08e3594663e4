//! # ATP (Adaptive Transport Protocol)
//!
//! 신뢰성 있는 바이트 스트림 위의 적응형 전송 계층
//!
//! ## 핵심 특징
//! - **혼잡 윈도우**: Slow Start / Congestion Avoidance / Fast Recovery 상태 머신
//! - **적응형 청크**: 네트워크 품질 점수에 따라 청크 크기 조정
//! - **노드 선택**: 라운드로빈, 가중치, 최소 연결, 랜덤 정책
//! - **세션**: 청크를 윈도우 크기 조각으로 쓰고 결과를 윈도우에 반영
//!
//! 노드 선택은 연결 수립 단계에서만 사용되고, 송신 경로는 윈도우와 청크만 본다.

pub mod chunk;
pub mod config;
pub mod congestion;
pub mod error;
pub mod probe;
pub mod selector;
pub mod session;
pub mod stats;
pub mod stream;

pub use chunk::ChunkPlanner;
pub use config::Config;
pub use congestion::{CongestionSnapshot, CongestionWindow, Phase};
pub use error::{Error, Result};
pub use selector::{Endpoint, NodeInfo, NodeSelector, RandomSource, Strategy, ThreadRandom};
pub use session::{SessionState, TransportSession};
pub use stats::SessionStats;
pub use stream::{ByteStream, TcpByteStream};

/// 초기 혼잡 윈도우 (세그먼트)
pub const INITIAL_CWND: u32 = 1;

/// 초기 Slow Start 임계값 (세그먼트)
pub const INITIAL_SSTHRESH: u32 = 64;

/// 기본 최소 청크 크기 (바이트)
pub const DEFAULT_MIN_CHUNK_SIZE: u32 = 1024; // 1KB

/// 기본 최대 청크 크기 (바이트)
pub const DEFAULT_MAX_CHUNK_SIZE: u32 = 64 * 1024; // 64KB

/// 기본 청크 크기 (바이트)
pub const DEFAULT_CHUNK_SIZE: u32 = 8 * 1024; // 8KB

/// 기본 수신 버퍼 크기 (바이트)
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 4096;
