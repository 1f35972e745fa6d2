use crate::error::ConvertError;
use crate::h5::{H5File, H5Writer, Layout};
use crate::h5::ElementType;
use std::path::Path;
use tempfile::tempdir;

/// dims 그룹 하나, weights 그룹 하나로 된 작은 파일
fn 샘플_파일_작성(path: &Path, level: Option<u32>) {
    let mut writer = H5Writer::create(path).unwrap();

    let n_mels = writer.write_scalar_i32(80).unwrap();
    let dims = writer.write_group(&[("n_mels", n_mels.header)]).unwrap();

    let matrix: Vec<f32> = (0..64 * 48).map(|i| (i % 7) as f32 * 0.5).collect();
    let w = writer.write_f32(&[64, 48], &matrix, level).unwrap();
    let empty = writer.write_f32(&[0, 4], &[], level).unwrap();
    let scalar = writer.write_f32(&[], &[1.5], level).unwrap();
    let weights = writer
        .write_group(&[("w", w.header), ("empty", empty.header), ("scalar", scalar.header)])
        .unwrap();

    let root = writer
        .write_group(&[("dims", dims), ("model_state_dict", weights)])
        .unwrap();
    writer.finish_file(root).unwrap();
}

#[test]
fn 비압축_왕복_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("plain.h5");
    샘플_파일_작성(&path, None);

    let file = H5File::open(&path).unwrap();
    let root = file.root().unwrap();
    assert_eq!(root.member_names(), vec!["dims", "model_state_dict"]);

    let n_mels = root.group("dims").unwrap().dataset("n_mels").unwrap();
    assert_eq!(n_mels.shape(), &[] as &[usize]);
    assert_eq!(n_mels.element_type(), ElementType::I32);
    assert_eq!(n_mels.read_scalar_i32().unwrap(), 80);

    let w = file.group("model_state_dict").unwrap().dataset("w").unwrap();
    assert_eq!(w.shape(), &[64, 48]);
    assert!(!w.is_compressed());
    assert!(matches!(w.layout(), Layout::Contiguous { .. }));
    let values = w.read_f32().unwrap();
    assert_eq!(values.len(), 64 * 48);
    assert_eq!(values[13], (13 % 7) as f32 * 0.5);
    assert_eq!(w.stored_bytes().unwrap(), 64 * 48 * 4);
}

#[test]
fn deflate_왕복_테스트() {
    let dir = tempdir().unwrap();
    let plain = dir.path().join("plain.h5");
    let packed = dir.path().join("packed.h5");
    샘플_파일_작성(&plain, None);
    샘플_파일_작성(&packed, Some(4));

    let a = H5File::open(&plain).unwrap();
    let b = H5File::open(&packed).unwrap();
    let wa = a.group("model_state_dict").unwrap().dataset("w").unwrap();
    let wb = b.group("model_state_dict").unwrap().dataset("w").unwrap();

    assert!(wb.is_compressed());
    assert!(matches!(wb.layout(), Layout::Chunked { chunk, .. } if chunk == &vec![64, 48]));
    assert_eq!(wa.read_f32().unwrap(), wb.read_f32().unwrap());
    assert!(wb.stored_bytes().unwrap() < wa.stored_bytes().unwrap());
    assert!(b.len() < a.len());
}

#[test]
fn 빈_텐서와_scalar_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("edge.h5");
    샘플_파일_작성(&path, Some(9));

    let file = H5File::open(&path).unwrap();
    let weights = file.group("model_state_dict").unwrap();

    let empty = weights.dataset("empty").unwrap();
    assert_eq!(empty.shape(), &[0, 4]);
    assert!(!empty.is_compressed());
    assert!(empty.read_f32().unwrap().is_empty());

    let scalar = weights.dataset("scalar").unwrap();
    assert!(!scalar.is_compressed());
    assert_eq!(scalar.read_f32().unwrap(), vec![1.5]);
}

#[test]
fn 타입_불일치_읽기_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("types.h5");
    샘플_파일_작성(&path, None);

    let file = H5File::open(&path).unwrap();
    let n_mels = file.group("dims").unwrap().dataset("n_mels").unwrap();
    assert!(matches!(n_mels.read_f32(), Err(ConvertError::Format(_))));
    assert!(file.group("dims").unwrap().dataset("n_ctx").is_err());
    // 데이터셋을 그룹으로 열 수 없음
    assert!(file.group("dims/n_mels").is_err());
}

#[test]
fn 원소_개수_불일치_쓰기_테스트() {
    let dir = tempdir().unwrap();
    let mut writer = H5Writer::create(dir.path().join("bad.h5")).unwrap();
    let err = writer.write_f32(&[2, 3], &[0.0; 5], None).unwrap_err();
    assert!(matches!(err, ConvertError::Encoding(_)));
}

#[test]
fn 손상된_파일_감지_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.h5");
    샘플_파일_작성(&path, None);

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[40] ^= 0xff; // 루트 주소
    std::fs::write(&path, &bytes).unwrap();
    assert!(matches!(H5File::open(&path), Err(ConvertError::Format(_))));

    std::fs::write(&path, b"not an hdf5 file at all").unwrap();
    assert!(matches!(H5File::open(&path), Err(ConvertError::Format(_))));
}

#[test]
fn 없는_디렉토리_생성_실패_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing").join("out.h5");
    assert!(matches!(H5Writer::create(&path), Err(ConvertError::Create { .. })));
}

/// 첫 chunk B-tree 노드 위치
fn btree_위치(bytes: &[u8]) -> usize {
    bytes.windows(4).position(|w| w == b"TREE").unwrap()
}

#[test]
fn 순환_btree_거부_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cycle.h5");
    샘플_파일_작성(&path, Some(4));

    // leaf를 level 1 내부 노드로 바꾸고 자식 주소를 자기 자신으로
    let mut bytes = std::fs::read(&path).unwrap();
    let at = btree_위치(&bytes);
    bytes[at + 5] = 1;
    let key = 8 + 8 * 3;
    let child = at + 24 + key;
    bytes[child..child + 8].copy_from_slice(&(at as u64).to_le_bytes());
    std::fs::write(&path, &bytes).unwrap();

    let file = H5File::open(&path).unwrap();
    let w = file.group("model_state_dict").unwrap().dataset("w").unwrap();
    assert!(matches!(w.stored_bytes(), Err(ConvertError::Format(_))));
    assert!(matches!(w.read_f32(), Err(ConvertError::Format(_))));
}

#[test]
fn btree_level_범위_초과_테스트() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("deep.h5");
    샘플_파일_작성(&path, Some(4));

    let mut bytes = std::fs::read(&path).unwrap();
    let at = btree_위치(&bytes);
    bytes[at + 5] = 200;
    std::fs::write(&path, &bytes).unwrap();

    let file = H5File::open(&path).unwrap();
    let w = file.group("model_state_dict").unwrap().dataset("w").unwrap();
    assert!(matches!(w.read_f32(), Err(ConvertError::Format(_))));
}
