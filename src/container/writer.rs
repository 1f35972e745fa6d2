use super::{Compression, ContainerSummary, DIMS_GROUP, WEIGHTS_GROUP};
use crate::checkpoint::{Dims, StateDict};
use crate::error::{ConvertError, Result};
use crate::h5::H5Writer;
use candle_core::{DType, Tensor};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use std::path::Path;

/// 컨테이너 파일 writer
///
/// 경로가 이미 있으면 잘라내고 새로 쓴다. 상위 디렉토리는 만들지 않는다.
#[derive(Debug, Clone, Default)]
pub struct ContainerWriter {
    pub compression: Compression,
    pub show_progress: bool,
}

impl ContainerWriter {
    pub fn new(compression: Compression) -> Self {
        Self {
            compression,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// `dims`와 변환된 가중치를 `path`에 저장
    pub fn write<P: AsRef<Path>>(
        &self,
        path: P,
        dims: &Dims,
        weights: &StateDict,
    ) -> Result<ContainerSummary> {
        let path = path.as_ref();
        self.compression.validate()?;
        info!(
            "writing {} ({} dims, {} weights, {})",
            path.display(),
            dims.len(),
            weights.len(),
            self.compression
        );

        let mut writer = H5Writer::create(path)?;
        let mut summary = ContainerSummary::default();

        let mut dim_links = Vec::with_capacity(dims.len());
        for (name, &value) in dims {
            let value = i32::try_from(value).map_err(|_| {
                ConvertError::encoding(format!("dims '{name}' = {value} does not fit in i32"))
            })?;
            let location = writer.write_scalar_i32(value)?;
            dim_links.push((name.as_str(), location.header));
        }
        summary.dims = dim_links.len();

        let progress = self.progress_bar(weights.len() as u64);
        let level = self.compression.deflate_level();

        let mut weight_links = Vec::with_capacity(weights.len());
        for (name, tensor) in weights {
            progress.set_message(name.clone());
            let data = tensor_to_f32(name, tensor)?;
            let location = writer.write_f32(tensor.dims(), &data, level)?;
            debug!(
                "{name}: {:?} {} -> {} bytes",
                tensor.dims(),
                data.len() * 4,
                location.stored_bytes
            );

            summary.raw_bytes += (data.len() * 4) as u64;
            summary.stored_bytes += location.stored_bytes;
            if level.is_some() && tensor.rank() > 0 && !data.is_empty() {
                summary.compressed += 1;
            }
            weight_links.push((name.as_str(), location.header));
            progress.inc(1);
        }
        progress.finish_and_clear();
        summary.weights = weight_links.len();

        let dims_group = writer.write_group(&dim_links)?;
        let weights_group = writer.write_group(&weight_links)?;
        let root = writer.write_group(&[(DIMS_GROUP, dims_group), (WEIGHTS_GROUP, weights_group)])?;
        summary.file_bytes = writer.position();
        writer.finish_file(root)?;

        info!(
            "wrote {}: {} -> {} bytes ({:.1}%)",
            path.display(),
            summary.raw_bytes,
            summary.stored_bytes,
            summary.ratio() * 100.0
        );
        Ok(summary)
    }

    fn progress_bar(&self, len: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("  [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("██░"));
        }
        pb
    }
}

/// 기본 writer로 저장
pub fn write_container<P: AsRef<Path>>(
    path: P,
    dims: &Dims,
    weights: &StateDict,
    compression: Compression,
) -> Result<ContainerSummary> {
    ContainerWriter::new(compression).write(path, dims, weights)
}

/// 텐서를 f32 row-major 벡터로 변환 (정밀도 변환은 조용히 수행)
pub fn tensor_to_f32(name: &str, tensor: &Tensor) -> Result<Vec<f32>> {
    let cast = |e: candle_core::Error| ConvertError::encoding(format!("'{name}' to f32: {e}"));
    tensor
        .to_dtype(DType::F32)
        .and_then(|t| t.flatten_all())
        .and_then(|t| t.to_vec1::<f32>())
        .map_err(cast)
}
