//! ATP 클라이언트 (송신자) - Adaptive Transport Protocol
//!
//! 노드 선택기로 대상 서버를 고르고, 혼잡 윈도우 + 적응형 청크로 데이터를 보낸다.
//!
//! 사용법:
//!   cargo run --release --bin atp-client -- [OPTIONS]
//!
//! 예시:
//!   # 두 노드 중 라운드로빈으로 선택해 파일 전송
//!   cargo run --release --bin atp-client -- -n 10.0.0.1:9000 -n 10.0.0.2:9000 -f data.bin
//!
//!   # 가중치 지정 + 지연 측정 기반 청크 크기
//!   cargo run --release --bin atp-client -- -n 10.0.0.1:9000@3 -n 10.0.0.2:9000@1 \
//!       --strategy weighted-round-robin --probe --size 10485760

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use atp::{probe, Config, Error, NodeSelector, Phase, TcpByteStream, TransportSession};

/// 품질 점수 계산 시 기준 지연 (이 지연에서 품질 0.5)
const REFERENCE_LATENCY: Duration = Duration::from_millis(50);

/// 클라이언트 설정
struct ClientConfig {
    nodes: Vec<(String, u16, u32)>,
    file_path: Option<PathBuf>,
    size: usize,
    quality: Option<f64>,
    probe: bool,
    phase: Option<Phase>,
    config: Config,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            file_path: None,
            size: 1024 * 1024,
            quality: None,
            probe: false,
            phase: None,
            config: Config::default(),
        }
    }
}

/// `HOST:PORT[@WEIGHT]` 파싱
fn parse_node(value: &str) -> Option<(String, u16, u32)> {
    let (addr, weight) = match value.rsplit_once('@') {
        Some((addr, weight)) => (addr, weight.parse().ok()?),
        None => (value, 1),
    };
    let (host, port) = addr.rsplit_once(':')?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    Some((host.to_string(), port.parse().ok()?, weight))
}

fn parse_args() -> ClientConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config = ClientConfig::default();
    let mut strategy = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--node" | "-n" => {
                if i + 1 < args.len() {
                    config
                        .nodes
                        .push(parse_node(&args[i + 1]).expect("HOST:PORT[@WEIGHT] 형식 필요"));
                    i += 1;
                }
            }
            "--strategy" | "-s" => {
                if i + 1 < args.len() {
                    strategy = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--file" | "-f" => {
                if i + 1 < args.len() {
                    config.file_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--size" => {
                if i + 1 < args.len() {
                    config.size = args[i + 1].parse().expect("유효한 숫자 필요");
                    i += 1;
                }
            }
            "--quality" | "-q" => {
                if i + 1 < args.len() {
                    // 범위 검사는 청크 계획기에서
                    config.quality = Some(args[i + 1].parse().expect("유효한 숫자 필요"));
                    i += 1;
                }
            }
            "--probe" => {
                config.probe = true;
            }
            "--phase" => {
                if i + 1 < args.len() {
                    config.phase = Some(args[i + 1].parse().expect("유효한 단계 이름 필요"));
                    i += 1;
                }
            }
            "--preset" | "-p" => {
                if i + 1 < args.len() {
                    config.config = Config::preset(&args[i + 1]).expect("알 수 없는 프리셋");
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!(
                    r#"ATP Client - Adaptive Transport Protocol 클라이언트

노드 선택 후 혼잡 윈도우 + 적응형 청크로 데이터 전송

사용법:
  cargo run --release --bin atp-client -- [OPTIONS]

옵션:
  -n, --node <HOST:PORT[@W]>  대상 노드 (여러 번 지정 가능, W = 가중치)
  -s, --strategy <NAME>       round-robin | weighted-round-robin |
                              least-connections | random
  -f, --file <PATH>           전송할 파일 (없으면 테스트 데이터 생성)
  --size <BYTES>              테스트 데이터 크기 (기본: 1048576)
  -q, --quality <Q>           네트워크 품질 0.0~1.0 (청크 크기 결정)
  --probe                     연결 수립 시간으로 품질 자동 계산
  --phase <NAME>              혼잡제어 시작 단계 강제 지정
  -p, --preset <NAME>         default | low-spec | high-performance |
                              unstable-network
  -h, --help                  이 도움말 출력
"#
                );
                std::process::exit(0);
            }
            _ => {}
        }
        i += 1;
    }

    // 프리셋 적용 후 전략 덮어쓰기
    if let Some(name) = strategy {
        config.config = config
            .config
            .with_strategy_name(&name)
            .expect("알 수 없는 전략");
    }

    config
}

/// 테스트용 데이터 생성
fn generate_test_data(size: usize) -> Vec<u8> {
    let pattern = b"ATP adaptive transport test payload. ";
    pattern.iter().copied().cycle().take(size).collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let client_config = parse_args();
    if client_config.nodes.is_empty() {
        return Err("최소 하나의 --node 필요".into());
    }

    let config = client_config.config.clone();
    info!("ATP Client starting (strategy: {})", config.strategy);

    let selector = Arc::new(NodeSelector::new(config.strategy));
    for (host, port, weight) in &client_config.nodes {
        selector.add_node(host, *port, *weight);
    }

    let mut session = TransportSession::new(TcpByteStream::from_config(&config), config.clone());

    // 연결 실패한 노드는 비활성화하고 다음 노드 시도
    let endpoint = loop {
        match session.connect_via(&selector) {
            Ok(endpoint) => break endpoint,
            Err(Error::ConnectionFailed { host, port, source }) => {
                warn!("노드 비활성화: {}:{} ({})", host, port, source);
                selector.set_active(&host, port, false);
            }
            Err(e) => return Err(e.into()),
        }
    };
    info!("Connected to {}", endpoint);

    // 품질 반영 (연결 수립 시간을 지연으로 사용)
    let quality = if client_config.probe {
        session.connect_latency().map(|latency| {
            let quality = probe::quality_from_latency(latency, REFERENCE_LATENCY);
            info!(
                "Latency: {:.2}ms -> quality {:.3}",
                latency.as_secs_f64() * 1000.0,
                quality
            );
            quality
        })
    } else {
        client_config.quality
    };
    if let Some(quality) = quality {
        session.adjust_quality(quality)?;
    }
    info!("Chunk size: {} bytes", session.chunk_size());

    if let Some(phase) = client_config.phase {
        session.configure_congestion(phase);
    }

    let data = match &client_config.file_path {
        Some(path) => std::fs::read(path)?,
        None => generate_test_data(client_config.size),
    };
    info!("Payload: {} bytes, crc32={:08X}", data.len(), probe::checksum(&data));

    let start = Instant::now();
    session.send(data)?;
    let elapsed = start.elapsed();

    let snapshot = session.congestion_snapshot();
    info!("Transfer complete in {:.2}s", elapsed.as_secs_f64());
    info!(
        "  Window: cwnd={} ssthresh={} phase={}",
        snapshot.cwnd, snapshot.ssthresh, snapshot.phase
    );
    info!("  {}", session.stats().summary());

    session.close();
    Ok(())
}
