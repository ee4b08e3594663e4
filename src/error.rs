//! 에러 타입 정의

use thiserror::Error;

/// ATP 전송 계층 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("연결되지 않은 세션")]
    NotConnected,

    #[error("연결 실패: {host}:{port} ({source})")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("쓰기 실패: {0}")]
    WriteFailed(#[source] std::io::Error),

    #[error("읽기 실패: {0}")]
    ReadFailed(#[source] std::io::Error),

    #[error("활성 노드 없음")]
    NoActiveNodes,

    #[error("알 수 없는 선택 전략: {0}")]
    UnknownStrategy(String),

    #[error("알 수 없는 혼잡제어 단계: {0}")]
    UnknownPhase(String),

    #[error("유효하지 않은 네트워크 품질 값: {0} (0.0 ~ 1.0 범위 필요)")]
    InvalidQuality(f64),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
