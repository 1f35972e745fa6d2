//! 변환 파이프라인: 로드 → 축 변환 → 컨테이너 저장 → (선택) 검증


use crate::checkpoint::{load_pth, Checkpoint, Dims, StateDict};
use crate::config::ConvertConfig;
use crate::container::{tensor_to_f32, ContainerSummary, ContainerWriter, DIMS_GROUP, WEIGHTS_GROUP};
use crate::error::{ConvertError, Result};
use crate::h5::H5File;
use crate::transform::TransformReport;
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// 컨테이너 파일 확장자
pub const OUTPUT_EXTENSION: &str = "h5";

/// 한 번의 변환 결과
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub output: PathBuf,
    pub rules: String,
    pub compression: String,
    pub transforms: TransformReport,
    pub container: ContainerSummary,
    pub verified: bool,
    pub elapsed_secs: f64,
}

/// 이미 로드된 체크포인트를 변환해서 `output`에 저장
///
/// 모든 텐서를 먼저 변환하므로 shape 오류가 나면 파일은 만들어지지 않는다.
pub fn convert_checkpoint<P: AsRef<Path>>(
    checkpoint: &Checkpoint,
    output: P,
    config: &ConvertConfig,
) -> Result<ConversionReport> {
    let output = output.as_ref();
    let start = Instant::now();
    config.validate()?;

    let table = config.rules.table();
    let (weights, transforms) = table.transform_state_dict_with_report(&checkpoint.model_state_dict)?;

    let compression = config.compression();
    let container = ContainerWriter::new(compression)
        .with_progress(config.show_progress)
        .write(output, &checkpoint.dims, &weights)?;

    if config.verify {
        verify_container(output, &checkpoint.dims, &weights)?;
        info!("verified {}", output.display());
    }

    Ok(ConversionReport {
        output: output.to_path_buf(),
        rules: table.name().to_string(),
        compression: compression.to_string(),
        transforms,
        container,
        verified: config.verify,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

/// `<output_dir>/<입력 파일 stem>.h5`
pub fn output_path_for<P: AsRef<Path>, Q: AsRef<Path>>(input: P, output_dir: Q) -> Result<PathBuf> {
    let input = input.as_ref();
    let stem = input.file_stem().ok_or_else(|| {
        ConvertError::Config(format!("cannot derive an output name from {}", input.display()))
    })?;
    let mut name = stem.to_os_string();
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    Ok(output_dir.as_ref().join(name))
}

/// `.pt` 파일 하나를 변환
pub fn convert_file<P: AsRef<Path>>(input: P, config: &ConvertConfig) -> Result<ConversionReport> {
    let input = input.as_ref();
    config.validate()?;

    let checkpoint = load_pth(input)?;
    info!(
        "{}: {} dims, {} tensors, {} parameters",
        input.display(),
        checkpoint.dims.len(),
        checkpoint.tensor_count(),
        checkpoint.total_parameters()
    );

    let output = output_path_for(input, &config.output_dir)?;
    if output.exists() {
        warn!("{} already exists and will be overwritten", output.display());
    }
    convert_checkpoint(&checkpoint, &output, config)
}

/// 저장된 파일을 다시 읽어 입력과 비교
pub fn verify_container<P: AsRef<Path>>(path: P, dims: &Dims, weights: &StateDict) -> Result<()> {
    let file = H5File::open(path.as_ref())?;

    let dims_group = file.group(DIMS_GROUP)?;
    let stored_dims: Vec<&str> = dims_group.member_names();
    let expected_dims: Vec<&str> = dims.keys().map(String::as_str).collect();
    if stored_dims != expected_dims {
        return Err(ConvertError::Verification(format!(
            "dims keys differ: stored {stored_dims:?}, expected {expected_dims:?}"
        )));
    }
    for (name, &value) in dims {
        let stored = dims_group.dataset(name)?.read_scalar_i32()?;
        if i64::from(stored) != value {
            return Err(ConvertError::Verification(format!(
                "dims '{name}': stored {stored}, expected {value}"
            )));
        }
    }

    let weights_group = file.group(WEIGHTS_GROUP)?;
    let stored_keys: Vec<&str> = weights_group.member_names();
    let expected_keys: Vec<&str> = weights.keys().map(String::as_str).collect();
    if stored_keys != expected_keys {
        return Err(ConvertError::Verification(format!(
            "{} weights stored, {} expected",
            stored_keys.len(),
            expected_keys.len()
        )));
    }
    for (name, tensor) in weights {
        let dataset = weights_group.dataset(name)?;
        if dataset.shape() != tensor.dims() {
            return Err(ConvertError::Verification(format!(
                "'{name}': stored shape {:?}, expected {:?}",
                dataset.shape(),
                tensor.dims()
            )));
        }
        let stored = dataset.read_f32()?;
        let expected = tensor_to_f32(name, tensor)?;
        // NaN도 같은 비트면 일치로 본다
        let same = stored.len() == expected.len()
            && stored
                .iter()
                .zip(&expected)
                .all(|(a, b)| a.to_bits() == b.to_bits());
        if !same {
            return Err(ConvertError::Verification(format!("'{name}': values differ")));
        }
    }
    Ok(())
}
