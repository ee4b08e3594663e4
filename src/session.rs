//! 전송 세션
//!
//! - 송신 데이터를 품질 기반 청크로 분할
//! - 청크마다 혼잡 윈도우 크기 조각으로 쓰기
//! - 쓰기 결과를 혼잡 윈도우에 반영 (성공 = ACK, 실패 = 타임아웃)
//!
//! 블로킹 단일 스레드 모델. 타임아웃은 스트림 쪽에서 적용한다.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::chunk::ChunkPlanner;
use crate::congestion::{CongestionSnapshot, CongestionWindow, Phase};
use crate::selector::{Endpoint, NodeSelector};
use crate::stats::SessionStats;
use crate::stream::ByteStream;
use crate::{Config, Error, Result};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// 노드 선택기에서 얻은 연결 (close 시 반납)
struct NodeLease {
    selector: Arc<NodeSelector>,
    endpoint: Endpoint,
}

/// 전송 세션
pub struct TransportSession<S: ByteStream> {
    /// 하부 스트림
    stream: S,

    /// 설정
    config: Config,

    /// 연결 상태
    state: SessionState,

    /// 혼잡 윈도우
    congestion: CongestionWindow,

    /// 청크 계획기
    planner: ChunkPlanner,

    /// 전송 통계
    stats: SessionStats,

    /// 연결된 원격지
    peer: Option<Endpoint>,

    lease: Option<NodeLease>,
}

impl<S: ByteStream> TransportSession<S> {
    /// 새 세션 생성 (연결 전)
    pub fn new(stream: S, config: Config) -> Self {
        Self {
            congestion: CongestionWindow::with_threshold(config.initial_ssthresh),
            planner: ChunkPlanner::new(
                config.min_chunk_size,
                config.max_chunk_size,
                config.initial_chunk_size,
            ),
            stream,
            config,
            state: SessionState::Disconnected,
            stats: SessionStats::new(),
            peer: None,
            lease: None,
        }
    }

    /// 원격지 연결
    ///
    /// 이미 연결되어 있으면 기존 연결을 닫고 다시 연결한다.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.is_connected() {
            debug!("재연결 전 기존 연결 종료");
            self.close();
        }

        let start = Instant::now();
        if let Err(source) = self.stream.connect(host, port) {
            warn!("연결 실패: {}:{} ({})", host, port, source);
            return Err(Error::ConnectionFailed {
                host: host.to_string(),
                port,
                source,
            });
        }

        self.stats.record_connect(start.elapsed());
        self.state = SessionState::Connected;
        self.peer = Some(Endpoint::new(host, port));
        info!("세션 연결: {}:{}", host, port);
        Ok(())
    }

    /// 노드 선택기로 대상을 고른 뒤 연결
    ///
    /// 성공하면 노드의 연결 수를 늘리고, close 시 되돌린다.
    pub fn connect_via(&mut self, selector: &Arc<NodeSelector>) -> Result<Endpoint> {
        let endpoint = selector.next()?;
        self.connect(&endpoint.address, endpoint.port)?;

        selector.acquire(&endpoint.address, endpoint.port);
        self.lease = Some(NodeLease {
            selector: Arc::clone(selector),
            endpoint: endpoint.clone(),
        });
        Ok(endpoint)
    }

    /// 혼잡제어 단계 강제 설정
    pub fn configure_congestion(&mut self, phase: Phase) {
        self.congestion.set_algorithm(phase);
    }

    /// 네트워크 품질 반영 (청크 크기 재계산)
    pub fn adjust_quality(&mut self, quality: f64) -> Result<u32> {
        self.planner.adjust_size(quality)
    }

    /// 데이터 송신
    ///
    /// 쓰기 실패 시 전체 송신을 중단한다. 이어보내기 상태는 남기지 않으므로
    /// 호출자가 처음부터 다시 보내야 한다.
    pub fn send(&mut self, data: impl Into<Bytes>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let data = data.into();
        let chunks = self.planner.chunk(&data);
        debug!(
            "송신 시작: {} bytes, {} 청크 (청크 크기 {})",
            data.len(),
            chunks.len(),
            self.planner.current_size()
        );

        for chunk in &chunks {
            self.send_chunk(chunk)?;
            self.stats.chunks_sent += 1;
        }

        self.stats.sends_completed += 1;
        Ok(())
    }

    fn send_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let mut offset = 0;

        while offset < chunk.len() {
            let limit = (self.congestion.current_limit() as usize)
                .saturating_mul(self.config.window_unit.max(1));
            let requested = limit.min(chunk.len() - offset);

            let accepted = match self.stream.write(&chunk[offset..offset + requested]) {
                Ok(0) => Err(io::Error::from(io::ErrorKind::WriteZero)),
                Ok(n) => Ok(n.min(requested)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e),
            };

            match accepted {
                Ok(n) => {
                    self.congestion.on_result(true, false);
                    self.stats.record_write(requested, n);
                    offset += n;
                }
                Err(e) => {
                    self.congestion.on_result(false, true);
                    self.stats.record_write_failure();
                    warn!(
                        "쓰기 실패 ({} / {} bytes 전송됨): {}",
                        offset,
                        chunk.len(),
                        e
                    );
                    return Err(Error::WriteFailed(e));
                }
            }
        }

        Ok(())
    }

    /// 현재 읽을 수 있는 데이터 수신
    ///
    /// 버퍼보다 적게 읽히면 멈춘다. 에러가 나면 그때까지 읽은 데이터를 돌려주고,
    /// 아무것도 못 읽었으면 `ReadFailed` 를 반환한다.
    pub fn receive(&mut self) -> Result<Bytes> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let capacity = self.config.recv_buffer_size.max(1);
        let mut buf = vec![0u8; capacity];
        let mut received = BytesMut::new();

        loop {
            match self.stream.read(&mut buf) {
                Ok(n) => {
                    received.extend_from_slice(&buf[..n]);
                    self.stats.record_read(n);
                    if n < capacity {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.stats.record_read_failure();
                    if received.is_empty() {
                        return Err(Error::ReadFailed(e));
                    }
                    warn!("읽기 중단 ({} bytes 수신됨): {}", received.len(), e);
                    break;
                }
            }
        }

        Ok(received.freeze())
    }

    /// 연결 종료 (여러 번 호출 가능)
    pub fn close(&mut self) {
        self.stream.close();

        if let Some(lease) = self.lease.take() {
            lease
                .selector
                .release(&lease.endpoint.address, lease.endpoint.port);
        }

        if self.state == SessionState::Connected {
            if let Some(peer) = self.peer.take() {
                info!("세션 종료: {} | {}", peer, self.stats.summary());
            }
        }
        self.state = SessionState::Disconnected;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// 연결된 원격지
    pub fn peer(&self) -> Option<&Endpoint> {
        self.peer.as_ref()
    }

    pub fn congestion_snapshot(&self) -> CongestionSnapshot {
        self.congestion.snapshot()
    }

    /// 현재 청크 크기
    pub fn chunk_size(&self) -> u32 {
        self.planner.current_size()
    }

    /// 마지막 연결 수립 시간 (연결 지연 추정치)
    pub fn connect_latency(&self) -> Option<Duration> {
        self.stats.connect_time
    }

    /// 통계 반환
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 하부 스트림 참조
    pub fn stream(&self) -> &S {
        &self.stream
    }
}

impl<S: ByteStream> Drop for TransportSession<S> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Read;
    use std::net::TcpListener;
    use std::thread;

    use crate::selector::Strategy;
    use crate::stream::TcpByteStream;

    /// 동작을 미리 정해두는 메모리 스트림
    #[derive(Default)]
    struct FakeStream {
        refuse_connect: bool,
        /// write 한 번에 수락할 최대 바이트
        accept_limit: Option<usize>,
        /// n 번째 write (0부터) 에서 실패
        fail_at_write: Option<usize>,
        incoming: VecDeque<io::Result<Vec<u8>>>,

        written: Vec<u8>,
        requested: Vec<usize>,
        calls: usize,
        closes: usize,
    }

    impl ByteStream for FakeStream {
        fn connect(&mut self, _host: &str, _port: u16) -> io::Result<()> {
            self.calls += 1;
            if self.refuse_connect {
                Err(io::Error::from(io::ErrorKind::ConnectionRefused))
            } else {
                Ok(())
            }
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.calls += 1;
            let index = self.requested.len();
            self.requested.push(buf.len());
            if self.fail_at_write == Some(index) {
                return Err(io::Error::from(io::ErrorKind::BrokenPipe));
            }

            let n = self.accept_limit.map_or(buf.len(), |l| l.min(buf.len()));
            self.written.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            match self.incoming.pop_front() {
                Some(Ok(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    if n < data.len() {
                        self.incoming.push_front(Ok(data[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn close(&mut self) {
            self.closes += 1;
        }
    }

    fn connected(stream: FakeStream, config: Config) -> TransportSession<FakeStream> {
        let mut session = TransportSession::new(stream, config);
        session.connect("10.0.0.1", 7000).unwrap();
        session
    }

    fn payload(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_send_requires_connection() {
        let mut session = TransportSession::new(FakeStream::default(), Config::default());
        assert!(matches!(session.send(payload(10)), Err(Error::NotConnected)));
        assert!(matches!(session.receive(), Err(Error::NotConnected)));
        assert_eq!(session.stream().calls, 0);
        assert_eq!(session.congestion_snapshot(), CongestionWindow::new().snapshot());
    }

    #[test]
    fn test_connect_failure() {
        let stream = FakeStream {
            refuse_connect: true,
            ..Default::default()
        };
        let mut session = TransportSession::new(stream, Config::default());

        let err = session.connect("10.0.0.1", 7000).unwrap_err();
        assert!(matches!(err, Error::ConnectionFailed { port: 7000, .. }));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(session.peer().is_none());
        assert!(session.connect_latency().is_none());
    }

    #[test]
    fn test_connect_latency_from_single_connect() {
        let selector = Arc::new(NodeSelector::new(Strategy::RoundRobin));
        selector.add_node("10.0.0.1", 7000, 1);

        let mut session = TransportSession::new(FakeStream::default(), Config::default());
        assert!(session.connect_latency().is_none());

        session.connect_via(&selector).unwrap();
        let latency = session.connect_latency().unwrap();
        assert!(latency < Duration::from_secs(1));
        // 지연 값은 세션 연결에서 얻으므로 추가 연결 없음
        assert_eq!(session.stream().calls, 1);
        assert_eq!(session.stats().connect_time, Some(latency));
    }

    #[test]
    fn test_window_sized_slices() {
        let mut session = connected(FakeStream::default(), Config::default());
        let data = payload(10);

        session.send(data.clone()).unwrap();

        assert_eq!(session.stream().requested, vec![1, 2, 4, 3]);
        assert_eq!(session.stream().written, data);
        assert_eq!(session.congestion_snapshot().cwnd, 16);
        assert_eq!(session.stats().chunks_sent, 1);
        assert_eq!(session.stats().sends_completed, 1);
    }

    #[test]
    fn test_partial_writes_advance_by_accepted() {
        let stream = FakeStream {
            accept_limit: Some(1),
            ..Default::default()
        };
        let config = Config {
            window_unit: 100,
            ..Config::default()
        };
        let mut session = connected(stream, config);
        let data = payload(10);

        session.send(data.clone()).unwrap();

        assert_eq!(session.stream().written, data);
        assert_eq!(
            session.stream().requested,
            vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]
        );
        assert_eq!(session.stats().writes, 10);
        assert_eq!(session.stats().partial_writes, 9);
        assert_eq!(session.stats().bytes_sent, 10);
    }

    #[test]
    fn test_chunks_bound_slices() {
        let config = Config {
            min_chunk_size: 4,
            max_chunk_size: 4,
            initial_chunk_size: 4,
            window_unit: 1000,
            ..Config::default()
        };
        let mut session = connected(FakeStream::default(), config);
        let data = payload(10);

        session.send(data.clone()).unwrap();

        assert_eq!(session.stream().requested, vec![4, 4, 2]);
        assert_eq!(session.stream().written, data);
        assert_eq!(session.stats().chunks_sent, 3);
    }

    #[test]
    fn test_write_failure_aborts_and_times_out() {
        let stream = FakeStream {
            fail_at_write: Some(2),
            ..Default::default()
        };
        let mut session = connected(stream, Config::default());

        let err = session.send(payload(100)).unwrap_err();
        assert!(matches!(err, Error::WriteFailed(_)));

        // 1, 2 바이트 성공 후 실패: cwnd 4 -> 타임아웃
        assert_eq!(session.stream().written.len(), 3);
        assert_eq!(
            session.congestion_snapshot(),
            CongestionSnapshot {
                phase: Phase::SlowStart,
                cwnd: 1,
                ssthresh: 2,
            }
        );
        assert_eq!(session.stats().write_failures, 1);
        assert_eq!(session.stats().sends_failed, 1);

        // 다음 송신은 처음부터
        session.send(payload(5)).unwrap();
        assert_eq!(&session.stream().written[3..], payload(5).as_slice());
        assert!(session.is_connected());
    }

    #[test]
    fn test_zero_length_write_is_failure() {
        let stream = FakeStream {
            accept_limit: Some(0),
            ..Default::default()
        };
        let mut session = connected(stream, Config::default());

        assert!(matches!(session.send(payload(3)), Err(Error::WriteFailed(_))));
        assert_eq!(session.congestion_snapshot().cwnd, 1);
    }

    #[test]
    fn test_empty_send() {
        let mut session = connected(FakeStream::default(), Config::default());
        session.send(Bytes::new()).unwrap();
        assert!(session.stream().requested.is_empty());
        assert_eq!(session.stats().sends_completed, 1);
    }

    #[test]
    fn test_configure_congestion() {
        let config = Config {
            window_unit: 1000,
            ..Config::default()
        };
        let mut session = connected(FakeStream::default(), config);
        session.configure_congestion(Phase::FastRetransmit);
        assert_eq!(session.congestion_snapshot().phase, Phase::FastRetransmit);

        session.send(payload(10)).unwrap();
        assert_eq!(
            session.congestion_snapshot(),
            CongestionSnapshot {
                phase: Phase::FastRecovery,
                cwnd: 4,
                ssthresh: 1,
            }
        );
    }

    #[test]
    fn test_adjust_quality() {
        let mut session = TransportSession::new(FakeStream::default(), Config::default());
        assert_eq!(session.adjust_quality(1.0).unwrap(), 64 * 1024);
        assert_eq!(session.chunk_size(), 64 * 1024);
        assert!(matches!(
            session.adjust_quality(-0.5),
            Err(Error::InvalidQuality(_))
        ));
        assert_eq!(session.chunk_size(), 64 * 1024);
    }

    #[test]
    fn test_receive_until_short_read() {
        let mut stream = FakeStream::default();
        stream.incoming.push_back(Ok(b"abcd".to_vec()));
        stream.incoming.push_back(Ok(b"ef".to_vec()));
        stream.incoming.push_back(Ok(b"later".to_vec()));
        let config = Config {
            recv_buffer_size: 4,
            ..Config::default()
        };
        let mut session = connected(stream, config);

        assert_eq!(session.receive().unwrap(), Bytes::from_static(b"abcdef"));
        assert_eq!(session.receive().unwrap(), Bytes::from_static(b"later"));
        assert!(session.receive().unwrap().is_empty());
        assert_eq!(session.stats().bytes_received, 11);
    }

    #[test]
    fn test_receive_errors() {
        let mut stream = FakeStream::default();
        stream
            .incoming
            .push_back(Err(io::Error::from(io::ErrorKind::ConnectionReset)));
        stream.incoming.push_back(Ok(b"abcd".to_vec()));
        stream
            .incoming
            .push_back(Err(io::Error::from(io::ErrorKind::ConnectionReset)));
        let config = Config {
            recv_buffer_size: 4,
            ..Config::default()
        };
        let mut session = connected(stream, config);

        assert!(matches!(session.receive(), Err(Error::ReadFailed(_))));
        assert_eq!(session.receive().unwrap(), Bytes::from_static(b"abcd"));
        assert_eq!(session.stats().read_failures, 2);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut session = connected(FakeStream::default(), Config::default());
        session.close();
        session.close();

        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.stream().closes, 2);
        assert!(matches!(session.send(payload(1)), Err(Error::NotConnected)));
    }

    #[test]
    fn test_connect_via_selector_tracks_load() {
        let selector = Arc::new(NodeSelector::new(Strategy::LeastConnections));
        selector.add_node("10.0.0.1", 7000, 1);
        selector.add_node("10.0.0.2", 7000, 1);

        let mut first = TransportSession::new(FakeStream::default(), Config::default());
        let mut second = TransportSession::new(FakeStream::default(), Config::default());

        assert_eq!(first.connect_via(&selector).unwrap().address, "10.0.0.1");
        assert_eq!(second.connect_via(&selector).unwrap().address, "10.0.0.2");
        assert_eq!(second.peer(), Some(&Endpoint::new("10.0.0.2", 7000)));

        first.close();
        let loads: Vec<u32> = selector.nodes().iter().map(|n| n.active_connections).collect();
        assert_eq!(loads, vec![0, 1]);

        drop(second);
        assert!(selector.nodes().iter().all(|n| n.active_connections == 0));
    }

    #[test]
    fn test_connect_via_failures() {
        let selector = Arc::new(NodeSelector::default());
        let mut session = TransportSession::new(FakeStream::default(), Config::default());
        assert!(matches!(
            session.connect_via(&selector),
            Err(Error::NoActiveNodes)
        ));

        selector.add_node("10.0.0.1", 7000, 1);
        let stream = FakeStream {
            refuse_connect: true,
            ..Default::default()
        };
        let mut session = TransportSession::new(stream, Config::default());
        assert!(matches!(
            session.connect_via(&selector),
            Err(Error::ConnectionFailed { .. })
        ));
        assert_eq!(selector.nodes()[0].active_connections, 0);
    }

    #[test]
    fn test_tcp_session_delivers_bytes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            sock.read_to_end(&mut received).unwrap();
            received
        });

        let config = Config::default();
        let mut session = TransportSession::new(TcpByteStream::from_config(&config), config);
        session.connect("127.0.0.1", port).unwrap();
        assert!(session.connect_latency().is_some());
        session.adjust_quality(0.3).unwrap();

        let data = payload(100 * 1024);
        session.send(data.clone()).unwrap();
        assert_eq!(session.stats().bytes_sent, data.len() as u64);
        session.close();

        assert_eq!(server.join().unwrap(), data);
    }
}
