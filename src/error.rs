//! 변환 파이프라인 에러 타입

use std::path::PathBuf;
use thiserror::Error;

/// 변환 작업 결과 타입
pub type Result<T> = std::result::Result<T, ConvertError>;

/// 변환 중 발생할 수 있는 에러
#[derive(Error, Debug)]
pub enum ConvertError {
    /// 규칙이 가정한 랭크와 실제 텐서 랭크가 다름
    #[error("shape mismatch for '{key}': expected rank {expected_rank}, got shape {actual:?}")]
    ShapeMismatch {
        key: String,
        expected_rank: usize,
        actual: Vec<usize>,
    },

    /// 출력 파일을 열 수 없음
    #[error("cannot create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// f32/i32 인코딩 실패
    #[error("encoding error: {0}")]
    Encoding(String),

    /// 잘못되었거나 지원하지 않는 컨테이너 구조
    #[error("invalid container: {0}")]
    Format(String),

    /// 체크포인트 로딩 실패
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// 설정 값 오류
    #[error("configuration error: {0}")]
    Config(String),

    /// 다시 읽은 결과가 입력과 다름
    #[error("verification failed: {0}")]
    Verification(String),

    /// 텐서 연산 실패
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl ConvertError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    pub(crate) fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }
}
