//! 변환 규칙 테이블

use crate::error::{ConvertError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Conv1d 커널 키 (out, in, width) → (width, in, out)
pub const CONV_KERNEL_KEYS: [&str; 2] = ["encoder.conv1.weight", "encoder.conv2.weight"];

/// 전치하지 않는 2차원 임베딩 테이블
pub const EMBEDDING_KEYS: [&str; 3] = [
    "decoder.positional_embedding",
    "encoder.positional_embedding",
    "decoder.token_embedding.weight",
];

/// 텐서 하나에 적용할 변환 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// 축 순서 (2, 1, 0)
    #[serde(rename = "permute_2_1_0")]
    Permute210,
    /// 마지막 두 축 교환
    TransposeLastTwo,
    Identity,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Permute210 => "permute_2_1_0",
            Self::TransposeLastTwo => "transpose_last_two",
            Self::Identity => "identity",
        };
        f.write_str(name)
    }
}

/// 키에 고정된 규칙: 변환 종류와 그 변환이 가정하는 랭크
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightRule {
    pub kind: TransformKind,
    pub expected_rank: Option<usize>,
}

impl WeightRule {
    pub fn new(kind: TransformKind, expected_rank: Option<usize>) -> Self {
        Self { kind, expected_rank }
    }

    pub fn permute_kernel() -> Self {
        Self::new(TransformKind::Permute210, Some(3))
    }

    pub fn keep_matrix() -> Self {
        Self::new(TransformKind::Identity, Some(2))
    }
}

/// 키 → 규칙 테이블
///
/// 테이블에 없는 키는 랭크로 결정한다: 2차원이면 `rank2_default`, 나머지는 그대로 둔다.
#[derive(Debug, Clone)]
pub struct RuleTable {
    name: String,
    rules: BTreeMap<String, WeightRule>,
    rank2_default: TransformKind,
}

impl RuleTable {
    /// 규칙이 없는 빈 테이블
    pub fn new(name: &str, rank2_default: TransformKind) -> Self {
        Self {
            name: name.to_string(),
            rules: BTreeMap::new(),
            rank2_default,
        }
    }

    /// Whisper 체크포인트용 기본 정책
    pub fn whisper() -> Self {
        let mut table = Self::new("whisper", TransformKind::TransposeLastTwo);
        for key in CONV_KERNEL_KEYS {
            table = table.with_rule(key, WeightRule::permute_kernel());
        }
        for key in EMBEDDING_KEYS {
            table = table.with_rule(key, WeightRule::keep_matrix());
        }
        table
    }

    /// 어떤 축도 바꾸지 않는 테이블
    pub fn identity() -> Self {
        Self::new("identity", TransformKind::Identity)
    }

    /// 규칙 추가 (같은 키는 덮어씀)
    pub fn with_rule(mut self, key: &str, rule: WeightRule) -> Self {
        self.rules.insert(key.to_string(), rule);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(&self, key: &str) -> Option<&WeightRule> {
        self.rules.get(key)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 키와 실제 shape로 변환 종류 결정
    ///
    /// 명시 규칙이 먼저 평가되고, 규칙의 기대 랭크와 다르면 `ShapeMismatch`.
    pub fn resolve(&self, key: &str, shape: &[usize]) -> Result<TransformKind> {
        if let Some(rule) = self.rules.get(key) {
            if let Some(expected_rank) = rule.expected_rank {
                if shape.len() != expected_rank {
                    return Err(ConvertError::ShapeMismatch {
                        key: key.to_string(),
                        expected_rank,
                        actual: shape.to_vec(),
                    });
                }
            }
            return Ok(rule.kind);
        }

        Ok(match shape.len() {
            2 => self.rank2_default,
            _ => TransformKind::Identity,
        })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::whisper()
    }
}

/// 설정에서 선택 가능한 규칙 테이블
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSet {
    #[default]
    Whisper,
    Identity,
}

impl RuleSet {
    pub fn table(&self) -> RuleTable {
        match self {
            Self::Whisper => RuleTable::whisper(),
            Self::Identity => RuleTable::identity(),
        }
    }
}

impl FromStr for RuleSet {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "whisper" => Ok(Self::Whisper),
            "identity" => Ok(Self::Identity),
            other => Err(ConvertError::Config(format!(
                "unknown rule set '{other}' (expected whisper or identity)"
            ))),
        }
    }
}
