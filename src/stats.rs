//! 세션 전송 통계

use std::time::{Duration, Instant};

/// 세션 전송 통계
#[derive(Debug, Clone)]
pub struct SessionStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 총 송신 바이트 (스트림이 수락한 바이트)
    pub bytes_sent: u64,

    /// 총 수신 바이트
    pub bytes_received: u64,

    /// 완전히 전송된 청크 수
    pub chunks_sent: u64,

    /// 스트림 write 호출 수
    pub writes: u64,

    /// 요청보다 적게 수락된 write 수
    pub partial_writes: u64,

    /// 실패한 write 수 (타임아웃으로 반영)
    pub write_failures: u64,

    /// 실패한 read 수
    pub read_failures: u64,

    /// 성공한 send 호출 수
    pub sends_completed: u64,

    /// 실패한 send 호출 수
    pub sends_failed: u64,

    /// 마지막 실패 시간
    pub last_failure_time: Option<Instant>,

    /// 마지막 연결 수립에 걸린 시간
    pub connect_time: Option<Duration>,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            bytes_sent: 0,
            bytes_received: 0,
            chunks_sent: 0,
            writes: 0,
            partial_writes: 0,
            write_failures: 0,
            read_failures: 0,
            sends_completed: 0,
            sends_failed: 0,
            last_failure_time: None,
            connect_time: None,
        }
    }

    /// write 결과 기록
    pub(crate) fn record_write(&mut self, requested: usize, accepted: usize) {
        self.writes += 1;
        self.bytes_sent += accepted as u64;
        if accepted < requested {
            self.partial_writes += 1;
        }
    }

    pub(crate) fn record_write_failure(&mut self) {
        self.writes += 1;
        self.write_failures += 1;
        self.sends_failed += 1;
        self.last_failure_time = Some(Instant::now());
    }

    pub(crate) fn record_connect(&mut self, elapsed: Duration) {
        self.connect_time = Some(elapsed);
    }

    pub(crate) fn record_read(&mut self, size: usize) {
        self.bytes_received += size as u64;
    }

    pub(crate) fn record_read_failure(&mut self) {
        self.read_failures += 1;
        self.last_failure_time = Some(Instant::now());
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 송신 처리율 (bytes/sec)
    pub fn send_throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_sent as f64 / elapsed
    }

    /// write 호출당 평균 바이트
    pub fn average_write_size(&self) -> f64 {
        let ok = self.writes - self.write_failures;
        if ok == 0 {
            return 0.0;
        }
        self.bytes_sent as f64 / ok as f64
    }

    /// write 실패율
    pub fn write_failure_rate(&self) -> f64 {
        if self.writes == 0 {
            return 0.0;
        }
        self.write_failures as f64 / self.writes as f64
    }

    /// 통계 리셋
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Sent: {} bytes ({} chunks, {} writes, {} partial) | Recv: {} bytes | Throughput: {:.2} MB/s | Failures: {} write / {} read",
            self.elapsed().as_secs_f64(),
            self.bytes_sent,
            self.chunks_sent,
            self.writes,
            self.partial_writes,
            self.bytes_received,
            self.send_throughput() / 1_000_000.0,
            self.write_failures,
            self.read_failures,
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}
