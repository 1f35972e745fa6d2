use crate::checkpoint::{Dims, StateDict};
use crate::container::{
    inspect_container, tensor_to_f32, write_container, Compression, ContainerWriter,
};
use crate::error::ConvertError;
use crate::h5::{ElementType, H5File};
use candle_core::{DType, Device, Tensor};
use tempfile::tempdir;

fn 샘플_dims() -> Dims {
    [("n_vocab".to_string(), 51864), ("n_layer".to_string(), 4)]
        .into_iter()
        .collect()
}

fn 샘플_가중치() -> StateDict {
    let dev = Device::Cpu;
    let mut weights = StateDict::new();
    weights.insert(
        "decoder.ln.weight".to_string(),
        Tensor::ones(16, DType::F32, &dev).unwrap(),
    );
    weights.insert(
        "encoder.conv1.weight".to_string(),
        Tensor::arange(0f32, 60.0, &dev).unwrap().reshape((3, 4, 5)).unwrap(),
    );
    weights
}

#[test]
fn 두_그룹_구조_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tiny.h5");
    let summary = write_container(&path, &샘플_dims(), &샘플_가중치(), Compression::None).unwrap();

    assert_eq!(summary.dims, 2);
    assert_eq!(summary.weights, 2);
    assert_eq!(summary.compressed, 0);
    assert_eq!(summary.raw_bytes, (16 + 60) * 4);
    assert_eq!(summary.stored_bytes, summary.raw_bytes);

    let file = H5File::open(&path).unwrap();
    assert_eq!(file.root().unwrap().member_names(), vec!["dims", "model_state_dict"]);
    assert_eq!(summary.file_bytes, file.len() as u64);

    let dims = file.group("dims").unwrap();
    let n_vocab = dims.dataset("n_vocab").unwrap();
    assert_eq!(n_vocab.element_type(), ElementType::I32);
    assert!(n_vocab.shape().is_empty());
    assert_eq!(n_vocab.read_scalar_i32().unwrap(), 51864);

    let conv = file.group("model_state_dict").unwrap().dataset("encoder.conv1.weight").unwrap();
    assert_eq!(conv.shape(), &[3, 4, 5]);
    assert_eq!(conv.read_f32().unwrap(), (0..60).map(|v| v as f32).collect::<Vec<_>>());
}

#[test]
fn gzip_압축_요약_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("gz.h5");
    let summary = ContainerWriter::new(Compression::gzip())
        .write(&path, &샘플_dims(), &샘플_가중치())
        .unwrap();
    assert_eq!(summary.compressed, 2);

    let info = inspect_container(&path).unwrap();
    assert_eq!(info.dims["n_layer"], 4);
    assert_eq!(info.datasets.len(), 2);
    assert!(info.datasets.iter().all(|d| d.compressed && d.dtype == "f32"));
    assert_eq!(info.total_parameters(), 76);
    assert_eq!(info.stored_bytes(), summary.stored_bytes);
}

#[test]
fn 기존_파일_덮어쓰기_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("again.h5");
    std::fs::write(&path, vec![0xAAu8; 100_000]).unwrap();

    write_container(&path, &샘플_dims(), &샘플_가중치(), Compression::None).unwrap();
    let info = inspect_container(&path).unwrap();
    assert!(info.file_bytes < 100_000);
    assert_eq!(info.dims.len(), 2);
}

#[test]
fn i32_범위_초과_dims_테스트() {
    let dir = tempdir().unwrap();
    let mut dims = 샘플_dims();
    dims.insert("n_huge".to_string(), i64::from(i32::MAX) + 1);

    let err = write_container(dir.path().join("x.h5"), &dims, &StateDict::new(), Compression::None)
        .unwrap_err();
    assert!(matches!(err, ConvertError::Encoding(msg) if msg.contains("n_huge")));
}

#[test]
fn 슬래시_이름_거부_테스트() {
    let dir = tempdir().unwrap();
    let mut weights = 샘플_가중치();
    weights.insert(
        "bad/name".to_string(),
        Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap(),
    );
    let err = write_container(dir.path().join("x.h5"), &샘플_dims(), &weights, Compression::None)
        .unwrap_err();
    assert!(matches!(err, ConvertError::Encoding(_)));
}

#[test]
fn 상위_디렉토리_없음_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("no_such_dir").join("out.h5");
    let err = write_container(&path, &샘플_dims(), &샘플_가중치(), Compression::gzip()).unwrap_err();

    assert!(matches!(err, ConvertError::Create { .. }));
    assert!(!path.exists());
}

#[test]
fn 정밀도_변환_테스트() {
    let dev = Device::Cpu;
    let half = Tensor::new(&[0.5f32, -2.0, 3.25], &dev).unwrap().to_dtype(DType::F16).unwrap();
    assert_eq!(tensor_to_f32("half", &half).unwrap(), vec![0.5, -2.0, 3.25]);

    let double = Tensor::new(&[1.0f64, 0.1], &dev).unwrap();
    let values = tensor_to_f32("double", &double).unwrap();
    assert_eq!(values, vec![1.0f32, 0.1f32]);

    let ints = Tensor::new(&[7i64, -3], &dev).unwrap();
    assert_eq!(tensor_to_f32("ints", &ints).unwrap(), vec![7.0, -3.0]);

    let scalar = Tensor::new(2.5f32, &dev).unwrap();
    assert_eq!(tensor_to_f32("scalar", &scalar).unwrap(), vec![2.5]);
}

#[test]
fn 압축_표시_테스트() {
    assert_eq!(Compression::default(), Compression::Gzip { level: 4 });
    assert_eq!(Compression::None.deflate_level(), None);
    assert_eq!(Compression::gzip().to_string(), "gzip (level 4)");
    assert_eq!(Compression::None.to_string(), "none");
}

#[test]
fn gzip_레벨_범위_초과_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x.h5");
    let writer = ContainerWriter::new(Compression::Gzip { level: 15 });

    let err = writer.write(&path, &샘플_dims(), &샘플_가중치()).unwrap_err();
    assert!(matches!(err, ConvertError::Config(msg) if msg.contains("15")));
    assert!(!path.exists());
    assert!(Compression::Gzip { level: 9 }.validate().is_ok());
    assert!(Compression::None.validate().is_ok());
}

#[test]
fn 순환_btree_inspect_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cycle.h5");
    write_container(&path, &샘플_dims(), &샘플_가중치(), Compression::gzip()).unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let at = bytes.windows(4).position(|w| w == b"TREE").unwrap();
    // 첫 chunk 데이터셋은 decoder.ln.weight (rank 1)
    let key = 8 + 8 * 2;
    bytes[at + 5] = 1;
    let child = at + 24 + key;
    bytes[child..child + 8].copy_from_slice(&(at as u64).to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(inspect_container(&path), Err(ConvertError::Format(_))));
}
