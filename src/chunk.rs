//! 적응형 청크 분할
//!
//! - 네트워크 품질 (0.0 ~ 1.0) 에 따라 청크 크기 결정
//! - 품질이 좋을수록 큰 청크, 1.0 근처에서는 증가폭 감소 (log10 곡선)
//! - 청크 경계는 송신측 최적화일 뿐, 수신측은 바이트 스트림만 본다

use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::{Error, Result, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_MIN_CHUNK_SIZE};

/// 청크 크기 계획기
///
/// 불변식: `1 <= min_size <= current_size <= max_size`
#[derive(Debug, Clone)]
pub struct ChunkPlanner {
    min_size: u32,
    max_size: u32,
    current_size: u32,
}

impl Default for ChunkPlanner {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CHUNK_SIZE, DEFAULT_MAX_CHUNK_SIZE, DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkPlanner {
    /// 새 계획기 생성 (값은 불변식에 맞게 보정)
    pub fn new(min_size: u32, max_size: u32, initial_size: u32) -> Self {
        let min_size = min_size.max(1);
        let max_size = max_size.max(min_size);
        Self {
            min_size,
            max_size,
            current_size: initial_size.clamp(min_size, max_size),
        }
    }

    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// 현재 청크 크기
    pub fn current_size(&self) -> u32 {
        self.current_size
    }

    /// 최대 청크 크기 설정
    ///
    /// 최소값보다 작으면 최소값도 함께 내려간다.
    pub fn set_max_size(&mut self, size: u32) {
        self.max_size = size.max(1);
        self.min_size = self.min_size.min(self.max_size);
        self.clamp_current();
    }

    /// 최소 청크 크기 설정
    ///
    /// 최대값보다 크면 최대값도 함께 올라간다.
    pub fn set_min_size(&mut self, size: u32) {
        self.min_size = size.max(1);
        self.max_size = self.max_size.max(self.min_size);
        self.clamp_current();
    }

    fn clamp_current(&mut self) {
        self.current_size = self.current_size.clamp(self.min_size, self.max_size);
    }

    /// 품질 기반 청크 크기 재계산
    ///
    /// 범위를 벗어난 품질 값은 거부하고 현재 크기를 유지한다.
    pub fn adjust_size(&mut self, quality: f64) -> Result<u32> {
        let size = self.optimal_size(quality)?;
        if size != self.current_size {
            debug!(
                "청크 크기 조정: {} -> {} (quality={:.3})",
                self.current_size, size, quality
            );
        }
        self.current_size = size;
        Ok(size)
    }

    /// 품질에 대한 최적 청크 크기 (상태 변경 없음)
    pub fn optimal_size(&self, quality: f64) -> Result<u32> {
        if !(0.0..=1.0).contains(&quality) {
            return Err(Error::InvalidQuality(quality));
        }

        // quality [0, 1] -> factor [0, 1]
        let factor = (quality * 9.0 + 1.0).log10();
        let span = (self.max_size - self.min_size) as f64;
        let size = self.min_size as f64 + span * factor;

        Ok((size as u32).clamp(self.min_size, self.max_size))
    }

    /// 데이터를 현재 크기의 청크들로 분할 (zero-copy)
    ///
    /// 빈 입력은 빈 목록을 반환한다.
    pub fn chunk(&self, data: &Bytes) -> Vec<Bytes> {
        let size = self.current_size as usize;
        let mut chunks = Vec::with_capacity(data.len().div_ceil(size));
        let mut offset = 0;

        while offset < data.len() {
            let end = (offset + size).min(data.len());
            chunks.push(data.slice(offset..end));
            offset = end;
        }

        chunks
    }

    /// 청크들을 순서대로 이어붙여 원본 복원
    pub fn merge(chunks: &[Bytes]) -> Bytes {
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut merged = BytesMut::with_capacity(total);
        for chunk in chunks {
            merged.extend_from_slice(chunk);
        }
        merged.freeze()
    }
}
