//! PyTorch `.pt` 체크포인트 로더
//!
//! `torch.save({"dims": {...}, "model_state_dict": {...}}, path)`로 저장된 zip 기반
//! 체크포인트를 읽는다. 텐서는 candle의 pickle 리더가, `dims`는 `data.pkl`을 직접
//! 풀어서 꺼낸다.

use super::{Checkpoint, Dims, StateDict};
use crate::error::{ConvertError, Result};
use candle_core::pickle::{self, Object, Stack};
use log::{debug, info};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// 하이퍼파라미터 딕셔너리 키
pub const DIMS_KEY: &str = "dims";
/// 가중치 딕셔너리 키
pub const STATE_DICT_KEY: &str = "model_state_dict";

/// 로컬 `.pt` 파일에서 체크포인트 로드
pub fn load_pth<P: AsRef<Path>>(path: P) -> Result<Checkpoint> {
    let path = path.as_ref();
    info!("loading checkpoint {}", path.display());

    let root = read_pickle_root(path)?;
    let dims = dims_from_object(root)?;

    let tensors = pickle::read_all_with_key(path, Some(STATE_DICT_KEY))
        .map_err(|e| ConvertError::Checkpoint(format!("{}: {e}", path.display())))?;
    if tensors.is_empty() {
        return Err(ConvertError::Checkpoint(format!(
            "{}: no tensors found under '{STATE_DICT_KEY}'",
            path.display()
        )));
    }

    let model_state_dict: StateDict = tensors.into_iter().collect();
    debug!(
        "checkpoint loaded: {} dims, {} tensors",
        dims.len(),
        model_state_dict.len()
    );

    Ok(Checkpoint::new(dims, model_state_dict))
}

/// `data.pkl`을 풀어 최상위 객체 반환
fn read_pickle_root(path: &Path) -> Result<Object> {
    let file = File::open(path)
        .map_err(|e| ConvertError::Checkpoint(format!("cannot open {}: {e}", path.display())))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(|e| {
        ConvertError::Checkpoint(format!(
            "{} is not a zip-based PyTorch checkpoint: {e}",
            path.display()
        ))
    })?;

    let pkl_name = archive
        .file_names()
        .find(|name| name.ends_with("data.pkl"))
        .map(str::to_owned)
        .ok_or_else(|| {
            ConvertError::Checkpoint(format!("{}: data.pkl not found", path.display()))
        })?;

    let entry = archive
        .by_name(&pkl_name)
        .map_err(|e| ConvertError::Checkpoint(format!("{pkl_name}: {e}")))?;
    let mut reader = BufReader::new(entry);

    let mut stack = Stack::empty();
    stack
        .read_loop(&mut reader)
        .map_err(|e| ConvertError::Checkpoint(format!("{pkl_name}: {e}")))?;
    stack
        .finalize()
        .map_err(|e| ConvertError::Checkpoint(format!("{pkl_name}: {e}")))
}

/// 최상위 딕셔너리에서 `dims` 항목을 정수 매핑으로 변환
pub fn dims_from_object(root: Object) -> Result<Dims> {
    let entries = root.dict().map_err(|obj| {
        ConvertError::Checkpoint(format!("top-level object is not a dictionary: {obj:?}"))
    })?;

    let dims = entries
        .into_iter()
        .find(|(key, _)| matches!(key, Object::Unicode(name) if name == DIMS_KEY))
        .map(|(_, value)| value)
        .ok_or_else(|| ConvertError::Checkpoint(format!("'{DIMS_KEY}' entry not found")))?;

    let dims = dims.dict().map_err(|obj| {
        ConvertError::Checkpoint(format!("'{DIMS_KEY}' is not a dictionary: {obj:?}"))
    })?;

    let mut out = Dims::new();
    for (key, value) in dims {
        let name = String::try_from(key).map_err(|obj| {
            ConvertError::Checkpoint(format!("non-string key in '{DIMS_KEY}': {obj:?}"))
        })?;
        let value = value.int_or_long().map_err(|obj| {
            ConvertError::Checkpoint(format!("'{DIMS_KEY}.{name}' is not an integer: {obj:?}"))
        })?;
        out.insert(name, value);
    }
    Ok(out)
}
