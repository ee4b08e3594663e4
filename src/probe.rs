//! 네트워크 측정 및 보조 유틸리티
//!
//! 세션 코어 밖의 협력자들. 측정 결과는 품질 점수로 변환되어
//! [`ChunkPlanner::adjust_size`](crate::ChunkPlanner::adjust_size) 에 입력된다.

use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use rand::RngCore;

use crate::Result;

fn resolve(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, "주소 해석 결과 없음")
    })
}

/// TCP 연결 수립 시간 측정
pub fn measure_latency(host: &str, port: u16, timeout: Duration) -> Result<Duration> {
    let addr = resolve(host, port)?;
    let start = Instant::now();
    let _stream = TcpStream::connect_timeout(&addr, timeout)?;
    Ok(start.elapsed())
}

/// 임의 데이터 `size` 바이트를 써서 대역폭 측정 (bytes/sec)
pub fn measure_bandwidth(host: &str, port: u16, size: usize, timeout: Duration) -> Result<f64> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);

    let addr = resolve(host, port)?;
    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_write_timeout(Some(timeout))?;

    let start = Instant::now();
    stream.write_all(&data)?;
    stream.flush()?;
    let elapsed = start.elapsed().as_secs_f64().max(1e-6);

    Ok(size as f64 / elapsed)
}

/// 제한 시간 내 연결 가능 여부
pub fn check_connection(host: &str, port: u16, timeout: Duration) -> bool {
    resolve(host, port)
        .and_then(|addr| TcpStream::connect_timeout(&addr, timeout))
        .is_ok()
}

/// 지연 시간을 품질 점수 (0.0 ~ 1.0) 로 변환
///
/// `latency == reference` 이면 0.5, 지연이 0에 가까울수록 1.0.
pub fn quality_from_latency(latency: Duration, reference: Duration) -> f64 {
    let reference = reference.as_secs_f64();
    if reference <= 0.0 {
        return 0.0;
    }
    (reference / (reference + latency.as_secs_f64())).clamp(0.0, 1.0)
}

/// CRC32 체크섬
pub fn checksum(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// IPv4/IPv6 주소 문법 검사
pub fn is_valid_ip_address(address: &str) -> bool {
    address.parse::<IpAddr>().is_ok()
}

/// 현재 시간 (UNIX epoch 기준 마이크로초)
pub fn timestamp_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}
