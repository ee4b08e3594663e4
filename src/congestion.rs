//! 혼잡 윈도우 상태 머신
//!
//! - Slow Start: 성공마다 cwnd 2배
//! - Congestion Avoidance: 성공마다 cwnd + 1
//! - Fast Retransmit / Fast Recovery: 손실 의심 시 cwnd를 절반 + 3으로 축소
//! - 타임아웃: cwnd = 1, Slow Start 복귀
//!
//! 모든 자동 전이는 [`CongestionWindow::on_result`] 하나를 거친다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{Error, INITIAL_CWND, INITIAL_SSTHRESH};

/// Fast Recovery 진입 시 ssthresh에 더하는 세그먼트 수
const FAST_RECOVERY_INFLATION: u32 = 3;

/// 혼잡제어 단계
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    SlowStart,
    CongestionAvoidance,
    FastRetransmit,
    FastRecovery,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::SlowStart => "slow-start",
            Phase::CongestionAvoidance => "congestion-avoidance",
            Phase::FastRetransmit => "fast-retransmit",
            Phase::FastRecovery => "fast-recovery",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow-start" => Ok(Phase::SlowStart),
            "congestion-avoidance" => Ok(Phase::CongestionAvoidance),
            "fast-retransmit" => Ok(Phase::FastRetransmit),
            "fast-recovery" => Ok(Phase::FastRecovery),
            _ => Err(Error::UnknownPhase(s.to_string())),
        }
    }
}

/// 혼잡 윈도우 상태 스냅샷 (진단용)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CongestionSnapshot {
    pub phase: Phase,
    pub cwnd: u32,
    pub ssthresh: u32,
}

/// 혼잡 윈도우
///
/// 불변식: `cwnd >= 1`, `ssthresh >= 1`
#[derive(Debug, Clone)]
pub struct CongestionWindow {
    phase: Phase,
    cwnd: u32,
    ssthresh: u32,

    /// reset() 시 복원할 초기 ssthresh
    initial_ssthresh: u32,
}

impl Default for CongestionWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl CongestionWindow {
    /// cwnd=1, ssthresh=64, Slow Start 로 생성
    pub fn new() -> Self {
        Self::with_threshold(INITIAL_SSTHRESH)
    }

    /// 초기 ssthresh 지정 생성
    pub fn with_threshold(initial_ssthresh: u32) -> Self {
        let initial_ssthresh = initial_ssthresh.max(1);
        Self {
            phase: Phase::SlowStart,
            cwnd: INITIAL_CWND,
            ssthresh: initial_ssthresh,
            initial_ssthresh,
        }
    }

    /// 현재 허용 윈도우 (세그먼트 단위)
    pub fn current_limit(&self) -> u32 {
        self.cwnd
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    /// 전송 결과 반영 (유일한 상태 전이 함수)
    ///
    /// 타임아웃은 `acknowledged` 값과 관계없이 우선한다.
    pub fn on_result(&mut self, acknowledged: bool, timed_out: bool) {
        let before = self.phase;

        if timed_out {
            self.ssthresh = half(self.cwnd);
            self.cwnd = INITIAL_CWND;
            self.phase = Phase::SlowStart;
        } else if !acknowledged {
            // 중복 ACK 등 재전송 신호
            self.enter_fast_recovery();
        } else {
            match self.phase {
                Phase::SlowStart => {
                    self.cwnd = self.cwnd.saturating_mul(2);
                    if self.cwnd >= self.ssthresh {
                        self.phase = Phase::CongestionAvoidance;
                    }
                }
                Phase::CongestionAvoidance => {
                    self.cwnd = self.cwnd.saturating_add(1);
                }
                Phase::FastRecovery => {
                    self.cwnd = self.ssthresh;
                    self.phase = Phase::CongestionAvoidance;
                }
                Phase::FastRetransmit => self.enter_fast_recovery(),
            }
        }

        trace!(
            "윈도우 갱신: ack={}, timeout={}, cwnd={}, ssthresh={}",
            acknowledged,
            timed_out,
            self.cwnd,
            self.ssthresh
        );
        if before != self.phase {
            debug!("혼잡제어 단계 전이: {} -> {}", before, self.phase);
        }
    }

    fn enter_fast_recovery(&mut self) {
        self.ssthresh = half(self.cwnd);
        self.cwnd = self.ssthresh.saturating_add(FAST_RECOVERY_INFLATION);
        self.phase = Phase::FastRecovery;
    }

    /// 단계 강제 설정 (cwnd/ssthresh 유지, 정상 전이 로직 우회)
    pub fn set_algorithm(&mut self, phase: Phase) {
        debug!("혼잡제어 단계 강제 설정: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// ssthresh 강제 설정 (정상 전이 로직 우회)
    pub fn set_threshold(&mut self, threshold: u32) {
        self.ssthresh = threshold.max(1);
    }

    /// 초기 상태로 복원
    pub fn reset(&mut self) {
        self.phase = Phase::SlowStart;
        self.cwnd = INITIAL_CWND;
        self.ssthresh = self.initial_ssthresh;
    }

    pub fn snapshot(&self) -> CongestionSnapshot {
        CongestionSnapshot {
            phase: self.phase,
            cwnd: self.cwnd,
            ssthresh: self.ssthresh,
        }
    }
}

fn half(cwnd: u32) -> u32 {
    (cwnd / 2).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let cw = CongestionWindow::new();
        assert_eq!(
            cw.snapshot(),
            CongestionSnapshot {
                phase: Phase::SlowStart,
                cwnd: 1,
                ssthresh: 64,
            }
        );
        assert_eq!(cw.current_limit(), 1);
    }

    #[test]
    fn test_slow_start_reaches_threshold() {
        let mut cw = CongestionWindow::new();
        let expected = [2, 4, 8, 16, 32];
        for cwnd in expected {
            cw.on_result(true, false);
            assert_eq!(cw.current_limit(), cwnd);
            assert_eq!(cw.phase(), Phase::SlowStart);
        }

        cw.on_result(true, false);
        assert_eq!(cw.current_limit(), 64);
        assert_eq!(cw.phase(), Phase::CongestionAvoidance);

        cw.on_result(true, false);
        assert_eq!(cw.current_limit(), 65);
    }

    #[test]
    fn test_acks_never_shrink_window() {
        let mut cw = CongestionWindow::new();
        let mut prev = cw.current_limit();
        for _ in 0..200 {
            cw.on_result(true, false);
            assert!(cw.current_limit() >= prev);
            prev = cw.current_limit();
        }
    }

    #[test]
    fn test_timeout_resets_from_any_phase() {
        for phase in [
            Phase::SlowStart,
            Phase::CongestionAvoidance,
            Phase::FastRetransmit,
            Phase::FastRecovery,
        ] {
            let mut cw = CongestionWindow::new();
            for _ in 0..8 {
                cw.on_result(true, false);
            }
            cw.set_algorithm(phase);
            let cwnd = cw.current_limit();

            // 타임아웃이 ack 플래그보다 우선
            cw.on_result(true, true);
            assert_eq!(cw.current_limit(), 1);
            assert_eq!(cw.phase(), Phase::SlowStart);
            assert_eq!(cw.ssthresh(), cwnd / 2);
        }
    }

    #[test]
    fn test_timeout_at_minimum_window_keeps_threshold_positive() {
        let mut cw = CongestionWindow::new();
        cw.on_result(false, true);
        assert_eq!(cw.current_limit(), 1);
        assert_eq!(cw.ssthresh(), 1);

        // ssthresh=1 이면 다음 성공에서 바로 Congestion Avoidance
        cw.on_result(true, false);
        assert_eq!(cw.current_limit(), 2);
        assert_eq!(cw.phase(), Phase::CongestionAvoidance);
    }

    #[test]
    fn test_duplicate_ack_enters_fast_recovery() {
        let mut cw = CongestionWindow::new();
        for _ in 0..4 {
            cw.on_result(true, false);
        }
        assert_eq!(cw.current_limit(), 16);

        cw.on_result(false, false);
        assert_eq!(
            cw.snapshot(),
            CongestionSnapshot {
                phase: Phase::FastRecovery,
                cwnd: 11,
                ssthresh: 8,
            }
        );

        // 새 ACK: cwnd = ssthresh, Congestion Avoidance
        cw.on_result(true, false);
        assert_eq!(cw.current_limit(), 8);
        assert_eq!(cw.phase(), Phase::CongestionAvoidance);
    }

    #[test]
    fn test_fast_retransmit_only_via_set_algorithm() {
        let mut cw = CongestionWindow::new();
        for _ in 0..3 {
            cw.on_result(true, false);
        }
        assert_eq!(cw.current_limit(), 8);

        cw.set_algorithm(Phase::FastRetransmit);
        assert_eq!(cw.current_limit(), 8);

        cw.on_result(true, false);
        assert_eq!(
            cw.snapshot(),
            CongestionSnapshot {
                phase: Phase::FastRecovery,
                cwnd: 7,
                ssthresh: 4,
            }
        );
    }

    #[test]
    fn test_set_threshold_and_reset() {
        let mut cw = CongestionWindow::new();
        cw.set_threshold(4);
        cw.on_result(true, false);
        assert_eq!(cw.phase(), Phase::SlowStart);
        cw.on_result(true, false);
        assert_eq!(cw.current_limit(), 4);
        assert_eq!(cw.phase(), Phase::CongestionAvoidance);

        cw.set_threshold(0);
        assert_eq!(cw.ssthresh(), 1);

        cw.reset();
        assert_eq!(cw.snapshot(), CongestionWindow::new().snapshot());
    }

    #[test]
    fn test_custom_initial_threshold_survives_reset() {
        let mut cw = CongestionWindow::with_threshold(16);
        for _ in 0..10 {
            cw.on_result(true, false);
        }
        cw.reset();
        assert_eq!(cw.ssthresh(), 16);
        assert_eq!(cw.current_limit(), 1);
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("fast-recovery".parse::<Phase>().unwrap(), Phase::FastRecovery);
        assert_eq!(
            Phase::CongestionAvoidance.to_string().parse::<Phase>().unwrap(),
            Phase::CongestionAvoidance
        );
        assert!(matches!(
            "cubic".parse::<Phase>(),
            Err(Error::UnknownPhase(name)) if name == "cubic"
        ));
    }
}
