//! torch 없이 zip 기반 `.pt` 체크포인트를 만드는 테스트 헬퍼
//!
//! `torch.save({"dims": {...}, "model_state_dict": OrderedDict(...)})`와 같은 구조의
//! pickle(protocol 2)과 `archive/data/<n>` 저장소 엔트리를 직접 기록한다.

#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::Path;

pub struct FakeTensor {
    pub name: &'static str,
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl FakeTensor {
    /// 0, 1, 2, ... 로 채운 텐서
    pub fn sequential(name: &'static str, shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        Self {
            name,
            shape: shape.to_vec(),
            data: (0..n).map(|v| v as f32).collect(),
        }
    }
}

fn unicode(out: &mut Vec<u8>, s: &str) {
    out.push(b'X');
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

fn int(out: &mut Vec<u8>, v: i32) {
    out.push(b'J');
    out.extend_from_slice(&v.to_le_bytes());
}

fn global(out: &mut Vec<u8>, module: &str, name: &str) {
    out.push(b'c');
    out.extend_from_slice(format!("{module}\n{name}\n").as_bytes());
}

fn ordered_dict(out: &mut Vec<u8>) {
    global(out, "collections", "OrderedDict");
    out.extend_from_slice(b")R");
}

fn int_tuple(out: &mut Vec<u8>, values: &[usize]) {
    out.push(b'(');
    for &v in values {
        int(out, v as i32);
    }
    out.push(b't');
}

fn pickle(dims: &[(&str, i32)], tensors: &[FakeTensor]) -> Vec<u8> {
    let mut out = vec![0x80, 0x02, b'}', b'('];

    unicode(&mut out, "dims");
    out.extend_from_slice(b"}(");
    for (name, value) in dims {
        unicode(&mut out, name);
        int(&mut out, *value);
    }
    out.push(b'u');

    unicode(&mut out, "model_state_dict");
    ordered_dict(&mut out);
    out.push(b'(');
    for (index, tensor) in tensors.iter().enumerate() {
        let numel: usize = tensor.shape.iter().product();
        let mut stride = vec![1usize; tensor.shape.len()];
        for d in (0..tensor.shape.len().saturating_sub(1)).rev() {
            stride[d] = stride[d + 1] * tensor.shape[d + 1];
        }

        unicode(&mut out, tensor.name);
        global(&mut out, "torch._utils", "_rebuild_tensor_v2");
        out.push(b'(');
        // persistent id: ("storage", FloatStorage, key, location, numel)
        out.push(b'(');
        unicode(&mut out, "storage");
        global(&mut out, "torch", "FloatStorage");
        unicode(&mut out, &index.to_string());
        unicode(&mut out, "cpu");
        int(&mut out, numel as i32);
        out.extend_from_slice(b"tQ");
        int(&mut out, 0);
        int_tuple(&mut out, &tensor.shape);
        int_tuple(&mut out, &stride);
        out.push(0x89); // requires_grad = False
        ordered_dict(&mut out);
        out.extend_from_slice(b"tR");
    }
    out.extend_from_slice(b"uu.");
    out
}

/// `path`에 체크포인트 기록
pub fn write_pth(path: &Path, dims: &[(&str, i32)], tensors: &[FakeTensor]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options: zip::write::FileOptions<()> =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);

    zip.start_file("archive/data.pkl".to_string(), options).unwrap();
    zip.write_all(&pickle(dims, tensors)).unwrap();

    for (index, tensor) in tensors.iter().enumerate() {
        zip.start_file(format!("archive/data/{index}"), options).unwrap();
        for v in &tensor.data {
            zip.write_all(&v.to_le_bytes()).unwrap();
        }
    }

    zip.start_file("archive/version".to_string(), options).unwrap();
    zip.write_all(b"3\n").unwrap();
    zip.finish().unwrap();
}
