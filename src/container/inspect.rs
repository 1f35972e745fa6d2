use super::{DIMS_GROUP, WEIGHTS_GROUP};
use crate::error::Result;
use crate::h5::H5File;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 저장된 가중치 데이터셋 정보
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
    pub compressed: bool,
    pub stored_bytes: u64,
}

/// 컨테이너 파일 내용 요약
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub path: PathBuf,
    pub file_bytes: u64,
    pub dims: BTreeMap<String, i32>,
    pub datasets: Vec<DatasetInfo>,
}

impl ContainerInfo {
    pub fn total_parameters(&self) -> usize {
        self.datasets
            .iter()
            .map(|d| d.shape.iter().fold(1usize, |acc, &dim| acc.saturating_mul(dim)))
            .fold(0usize, usize::saturating_add)
    }

    pub fn stored_bytes(&self) -> u64 {
        self.datasets.iter().map(|d| d.stored_bytes).sum()
    }
}

/// 파일을 열어 `dims` 값과 가중치 데이터셋 목록을 읽는다
pub fn inspect_container<P: AsRef<Path>>(path: P) -> Result<ContainerInfo> {
    let path = path.as_ref();
    let file = H5File::open(path)?;

    let dims_group = file.group(DIMS_GROUP)?;
    let mut dims = BTreeMap::new();
    for name in dims_group.member_names() {
        dims.insert(name.to_string(), dims_group.dataset(name)?.read_scalar_i32()?);
    }

    let weights = file.group(WEIGHTS_GROUP)?;
    let mut datasets = Vec::with_capacity(weights.len());
    for name in weights.member_names() {
        let dataset = weights.dataset(name)?;
        datasets.push(DatasetInfo {
            name: name.to_string(),
            shape: dataset.shape().to_vec(),
            dtype: dataset.element_type().name().to_string(),
            compressed: dataset.is_compressed(),
            stored_bytes: dataset.stored_bytes()?,
        });
    }

    Ok(ContainerInfo {
        path: path.to_path_buf(),
        file_bytes: file.len() as u64,
        dims,
        datasets,
    })
}
