//! 규칙 테이블을 상태 딕셔너리 전체에 적용

use super::{RuleTable, TransformKind};
use crate::checkpoint::StateDict;
use crate::error::Result;
use candle_core::Tensor;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// 변환 종류별 텐서 개수
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformReport {
    pub counts: BTreeMap<TransformKind, usize>,
}

impl TransformReport {
    pub fn count(&self, kind: TransformKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    fn record(&mut self, kind: TransformKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }
}

/// 텐서 하나에 변환 적용
///
/// 결과는 항상 row-major로 재배치된 사본이며 원소 값은 그대로다.
pub fn apply_transform(kind: TransformKind, tensor: &Tensor) -> Result<Tensor> {
    let out = match kind {
        TransformKind::Permute210 => tensor.permute((2, 1, 0))?.contiguous()?,
        TransformKind::TransposeLastTwo => tensor.t()?.contiguous()?,
        TransformKind::Identity => tensor.clone(),
    };
    Ok(out)
}

impl RuleTable {
    /// 키 하나를 해석하고 변환
    pub fn transform_tensor(&self, key: &str, tensor: &Tensor) -> Result<(TransformKind, Tensor)> {
        let kind = self.resolve(key, tensor.dims())?;
        let out = apply_transform(kind, tensor)?;
        if kind != TransformKind::Identity {
            debug!("{key}: {kind} {:?} -> {:?}", tensor.dims(), out.dims());
        }
        Ok((kind, out))
    }

    /// 입력과 같은 키 집합을 갖는 새 매핑 생성
    pub fn transform_state_dict(&self, state_dict: &StateDict) -> Result<StateDict> {
        self.transform_state_dict_with_report(state_dict)
            .map(|(transformed, _)| transformed)
    }

    pub fn transform_state_dict_with_report(
        &self,
        state_dict: &StateDict,
    ) -> Result<(StateDict, TransformReport)> {
        let mut report = TransformReport::default();
        let mut transformed = StateDict::new();

        for (key, tensor) in state_dict {
            let (kind, out) = self.transform_tensor(key, tensor)?;
            report.record(kind);
            transformed.insert(key.clone(), out);
        }

        debug!(
            "rule table '{}': {} tensors ({} permuted, {} transposed)",
            self.name(),
            report.total(),
            report.count(TransformKind::Permute210),
            report.count(TransformKind::TransposeLastTwo)
        );
        Ok((transformed, report))
    }
}
