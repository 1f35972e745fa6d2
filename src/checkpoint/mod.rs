//! 체크포인트 데이터 모델
//!
//! `dims`(하이퍼파라미터 스칼라)와 `model_state_dict`(이름 → 텐서) 두 매핑으로 구성된다.
//! 두 매핑 모두 `BTreeMap`이라 키는 항상 사전순으로 방문된다.

pub mod loader;


pub use loader::*;

use candle_core::Tensor;
use std::collections::BTreeMap;

/// 하이퍼파라미터 이름 → 정수 스칼라
pub type Dims = BTreeMap<String, i64>;

/// 파라미터 이름 → 텐서
pub type StateDict = BTreeMap<String, Tensor>;

/// 로드된 체크포인트
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub dims: Dims,
    pub model_state_dict: StateDict,
}

impl Checkpoint {
    pub fn new(dims: Dims, model_state_dict: StateDict) -> Self {
        Self { dims, model_state_dict }
    }

    /// 전체 파라미터 수
    pub fn total_parameters(&self) -> usize {
        self.model_state_dict.values().map(|t| t.elem_count()).sum()
    }

    pub fn tensor_count(&self) -> usize {
        self.model_state_dict.len()
    }
}
