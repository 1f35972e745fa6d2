//! 변환 결과를 두 그룹(`dims`, `model_state_dict`)짜리 HDF5 파일로 저장

pub mod writer;
pub mod inspect;

#[cfg(test)]
mod __tests__;

pub use inspect::*;
pub use writer::*;

use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 하이퍼파라미터 그룹 이름
pub const DIMS_GROUP: &str = "dims";
/// 가중치 그룹 이름
pub const WEIGHTS_GROUP: &str = "model_state_dict";

/// gzip 기본 압축 레벨
pub const DEFAULT_GZIP_LEVEL: u32 = 4;
/// gzip 최대 압축 레벨
pub const MAX_GZIP_LEVEL: u32 = 9;

/// 가중치 데이터셋 압축 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip { level: u32 },
}

impl Default for Compression {
    fn default() -> Self {
        Self::Gzip {
            level: DEFAULT_GZIP_LEVEL,
        }
    }
}

impl Compression {
    pub fn gzip() -> Self {
        Self::default()
    }

    /// deflate 레벨 (비압축이면 None)
    pub fn deflate_level(&self) -> Option<u32> {
        match self {
            Self::None => None,
            Self::Gzip { level } => Some(*level),
        }
    }

    /// gzip 레벨은 0-9
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Gzip { level } if *level > MAX_GZIP_LEVEL => Err(ConvertError::Config(format!(
                "gzip level {level} is out of range 0-{MAX_GZIP_LEVEL}"
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip { level } => write!(f, "gzip (level {level})"),
        }
    }
}

/// 저장 결과 요약
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContainerSummary {
    /// `dims` 데이터셋 수
    pub dims: usize,
    /// `model_state_dict` 데이터셋 수
    pub weights: usize,
    /// 압축 저장된 가중치 데이터셋 수
    pub compressed: usize,
    /// f32 원소 데이터 크기
    pub raw_bytes: u64,
    /// 디스크에 저장된 원소 데이터 크기
    pub stored_bytes: u64,
    /// 메타데이터 포함 파일 크기
    pub file_bytes: u64,
}

impl ContainerSummary {
    /// 원본 대비 저장 크기 비율
    pub fn ratio(&self) -> f64 {
        if self.raw_bytes == 0 {
            1.0
        } else {
            self.stored_bytes as f64 / self.raw_bytes as f64
        }
    }
}
