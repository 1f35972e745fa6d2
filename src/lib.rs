//! PyTorch 체크포인트 → HDF5 컨테이너 변환기
//!
//! `dims`(하이퍼파라미터)와 `model_state_dict`(가중치)로 구성된 체크포인트를 읽어
//! 키 기반 규칙 테이블로 축을 재배치한 뒤, 프레임워크 없이 읽을 수 있는 `.h5` 파일로 저장한다.
//!
//! ```no_run
//! use weights_converter::{convert_file, ConvertConfig};
//!
//! let report = convert_file("tiny.pt", &ConvertConfig::default())?;
//! println!("{}", report.output.display());
//! # Ok::<(), weights_converter::ConvertError>(())
//! ```

pub mod checkpoint;
pub mod config;
pub mod container;
pub mod error;
pub mod h5;
pub mod pipeline;
pub mod transform;

// 주요 타입 재수출
pub use checkpoint::{load_pth, Checkpoint, Dims, StateDict};
pub use config::{Codec, ConvertConfig};
pub use container::{
    inspect_container, write_container, Compression, ContainerInfo, ContainerSummary,
    ContainerWriter,
};
pub use error::{ConvertError, Result};
pub use pipeline::{convert_checkpoint, convert_file, output_path_for, verify_container, ConversionReport};
pub use transform::{RuleSet, RuleTable, TransformKind, TransformReport, WeightRule};
