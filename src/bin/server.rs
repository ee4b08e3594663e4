//! ATP 서버 (수신 싱크) - Adaptive Transport Protocol
//!
//! 클라이언트가 보낸 바이트 스트림을 끝까지 읽고 연결별 통계를 출력한다.
//! 청크 경계는 송신측 최적화일 뿐이므로 서버는 순수 바이트 스트림만 본다.
//!
//! 사용법:
//!   cargo run --release --bin atp-server -- [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin atp-server -- --bind 0.0.0.0:9000

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use atp::DEFAULT_RECV_BUFFER_SIZE;

/// 서버 설정
struct ServerConfig {
    bind_addr: SocketAddr,
    buffer_size: usize,
    report_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            buffer_size: DEFAULT_RECV_BUFFER_SIZE * 16,
            report_interval: Duration::from_secs(5),
        }
    }
}

/// 연결별 수신 통계
#[derive(Debug, Clone)]
struct PeerStats {
    connected_at: Instant,
    bytes: u64,
    reads: u64,
}

fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ServerConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                if i + 1 < args.len() {
                    config.bind_addr = args[i + 1].parse().expect("유효한 주소 필요");
                    i += 1;
                }
            }
            "--buffer" => {
                if i + 1 < args.len() {
                    config.buffer_size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--report" => {
                if i + 1 < args.len() {
                    let secs: u64 = args[i + 1].parse().expect("유효한 숫자 필요");
                    config.report_interval = Duration::from_secs(secs.max(1));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"ATP Server - Adaptive Transport Protocol 수신 서버

사용법:
  cargo run --release --bin atp-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>      바인드 주소 (기본: 0.0.0.0:9000)
  --buffer <BYTES>       읽기 버퍼 크기 (기본: 65536)
  --report <SECS>        활성 연결 보고 주기 (기본: 5)
  -h, --help             이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    config
}

/// 연결 하나를 EOF 까지 읽기
async fn handle_connection(
    mut socket: TcpStream,
    addr: SocketAddr,
    buffer_size: usize,
    peers: Arc<DashMap<SocketAddr, PeerStats>>,
) {
    let mut buf = vec![0u8; buffer_size.max(1)];
    let mut hasher = crc32fast::Hasher::new();

    loop {
        match socket.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                hasher.update(&buf[..n]);
                if let Some(mut peer) = peers.get_mut(&addr) {
                    peer.bytes += n as u64;
                    peer.reads += 1;
                }
            }
            Err(e) => {
                warn!("수신 에러 ({}): {}", addr, e);
                break;
            }
        }
    }

    if let Some((_, peer)) = peers.remove(&addr) {
        let elapsed = peer.connected_at.elapsed().as_secs_f64();
        let throughput = if elapsed > 0.0 {
            peer.bytes as f64 / elapsed / 1_000_000.0
        } else {
            0.0
        };
        info!(
            "연결 종료: {} | {} bytes, {} reads, {:.2}s, {:.2} MB/s, crc32={:08X}",
            addr,
            peer.bytes,
            peer.reads,
            elapsed,
            throughput,
            hasher.finalize()
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = parse_args();

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("ATP Server listening on {}", listener.local_addr()?);

    let peers: Arc<DashMap<SocketAddr, PeerStats>> = Arc::new(DashMap::new());

    // 활성 연결 주기 보고
    let report_peers = peers.clone();
    let report_interval = config.report_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(report_interval);
        loop {
            ticker.tick().await;
            for entry in report_peers.iter() {
                info!(
                    "  {} : {} bytes ({:.1}s)",
                    entry.key(),
                    entry.value().bytes,
                    entry.value().connected_at.elapsed().as_secs_f64()
                );
            }
        }
    });

    loop {
        let (socket, addr) = listener.accept().await?;
        info!("클라이언트 연결: {}", addr);

        peers.insert(
            addr,
            PeerStats {
                connected_at: Instant::now(),
                bytes: 0,
                reads: 0,
            },
        );

        tokio::spawn(handle_connection(
            socket,
            addr,
            config.buffer_size,
            peers.clone(),
        ));
    }
}
