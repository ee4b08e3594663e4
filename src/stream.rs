//! 하부 스트림 추상화
//!
//! 세션은 플랫폼 소켓을 직접 다루지 않고 [`ByteStream`] 만 사용한다.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::Config;

/// 신뢰성 있는 바이트 스트림
pub trait ByteStream {
    /// 원격지 연결
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    /// 최대 `buf.len()` 바이트 쓰기, 실제로 쓴 바이트 수 반환
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// 최대 `buf.len()` 바이트 읽기, 실제로 읽은 바이트 수 반환
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// 연결 해제 (여러 번 호출 가능)
    fn close(&mut self);
}

/// 블로킹 TCP 스트림
#[derive(Debug, Default)]
pub struct TcpByteStream {
    stream: Option<TcpStream>,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl TcpByteStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정의 타임아웃 적용
    pub fn from_config(config: &Config) -> Self {
        Self {
            stream: None,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn open(&self, addr: &SocketAddr) -> io::Result<TcpStream> {
        let stream = match self.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout)?,
            None => TcpStream::connect(addr)?,
        };
        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.read_timeout)?;
        stream.set_write_timeout(self.write_timeout)?;
        Ok(stream)
    }

    fn inner(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }
}

impl ByteStream for TcpByteStream {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.close();

        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match self.open(&addr) {
                Ok(stream) => {
                    debug!("TCP 연결: {}", addr);
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => {
                    debug!("TCP 연결 시도 실패: {} ({})", addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "주소 해석 결과 없음")
        }))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner()?.write(buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner()?.read(buf)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // 상대가 먼저 끊었으면 실패할 수 있음
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}
