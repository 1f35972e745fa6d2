//! 변환 설정


use crate::container::{Compression, DEFAULT_GZIP_LEVEL};
use crate::error::{ConvertError, Result};
use crate::transform::RuleSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// 압축 코덱 선택지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    None,
    #[default]
    Gzip,
}

impl FromStr for Codec {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "gzip" => Ok(Self::Gzip),
            other => Err(ConvertError::Config(format!(
                "unknown compression '{other}' (expected gzip or none)"
            ))),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Gzip => write!(f, "gzip"),
        }
    }
}

/// 변환 실행 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub compression: Codec,
    /// deflate 레벨 (0-9)
    pub gzip_level: u32,
    pub output_dir: PathBuf,
    pub rules: RuleSet,
    /// 저장 후 다시 읽어서 비교
    pub verify: bool,
    pub show_progress: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            compression: Codec::Gzip,
            gzip_level: DEFAULT_GZIP_LEVEL,
            output_dir: PathBuf::from("./"),
            rules: RuleSet::Whisper,
            verify: false,
            show_progress: true,
        }
    }
}

impl ConvertConfig {
    /// 압축 없이 저장
    pub fn uncompressed() -> Self {
        Self {
            compression: Codec::None,
            ..Default::default()
        }
    }

    /// 가장 빠른 deflate
    pub fn fast() -> Self {
        Self {
            gzip_level: 1,
            ..Default::default()
        }
    }

    /// 가장 작은 파일
    pub fn smallest() -> Self {
        Self {
            gzip_level: 9,
            ..Default::default()
        }
    }

    /// JSON 파일에서 로드. 빠진 항목은 기본값을 쓴다.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConvertError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ConvertError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        Compression::Gzip {
            level: self.gzip_level,
        }
        .validate()
    }

    /// writer용 압축 설정
    pub fn compression(&self) -> Compression {
        match self.compression {
            Codec::None => Compression::None,
            Codec::Gzip => Compression::Gzip {
                level: self.gzip_level,
            },
        }
    }
}
