//! object header 메시지 및 메타데이터 블록 인코딩

use super::checksum::lookup3;
use super::{CHUNK_BTREE_K, FILTER_DEFLATE, SIGNATURE, UNDEFINED_ADDRESS};
use crate::error::{ConvertError, Result};
use byteorder::{LittleEndian, WriteBytesExt};

pub const MSG_NIL: u8 = 0x00;
pub const MSG_DATASPACE: u8 = 0x01;
pub const MSG_LINK_INFO: u8 = 0x02;
pub const MSG_DATATYPE: u8 = 0x03;
pub const MSG_FILL_VALUE: u8 = 0x05;
pub const MSG_LINK: u8 = 0x06;
pub const MSG_LAYOUT: u8 = 0x08;
pub const MSG_GROUP_INFO: u8 = 0x0A;
pub const MSG_FILTER_PIPELINE: u8 = 0x0B;
pub const MSG_CONTINUATION: u8 = 0x10;

/// 메시지 플래그: 변경되지 않는 메시지
pub const MSG_FLAG_CONSTANT: u8 = 0x01;

/// object header 플래그: chunk #0 크기 필드 4바이트
const OHDR_FLAGS: u8 = 0x02;

/// 저장 원소 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    /// 32비트 부호 있는 정수, little-endian
    I32,
    /// IEEE 754 단정밀도, little-endian
    F32,
}

impl ElementType {
    pub fn size(&self) -> usize {
        4
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::I32 => "i32",
            Self::F32 => "f32",
        }
    }
}

/// 공간 할당 시점
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocTime {
    Late = 2,
    Incremental = 3,
}

/// v2 object header 빌더
#[derive(Debug, Default)]
pub struct ObjectHeader {
    messages: Vec<(u8, u8, Vec<u8>)>,
}

impl ObjectHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: u8, flags: u8, body: Vec<u8>) -> &mut Self {
        self.messages.push((kind, flags, body));
        self
    }

    /// `OHDR` 블록 직렬화 (체크섬 포함)
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut chunk_size = 0usize;
        for (kind, _, body) in &self.messages {
            if body.len() > u16::MAX as usize {
                return Err(ConvertError::encoding(format!(
                    "header message 0x{kind:02x} is {} bytes (limit {})",
                    body.len(),
                    u16::MAX
                )));
            }
            chunk_size += 4 + body.len();
        }

        let mut buf = Vec::with_capacity(chunk_size + 14);
        buf.extend_from_slice(b"OHDR");
        buf.push(2);
        buf.push(OHDR_FLAGS);
        buf.write_u32::<LittleEndian>(chunk_size as u32)?;
        for (kind, flags, body) in &self.messages {
            buf.push(*kind);
            buf.write_u16::<LittleEndian>(body.len() as u16)?;
            buf.push(*flags);
            buf.extend_from_slice(body);
        }
        let checksum = lookup3(&buf);
        buf.write_u32::<LittleEndian>(checksum)?;
        Ok(buf)
    }
}

/// superblock v2
pub fn superblock(root_address: u64, end_of_file: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(48);
    buf.extend_from_slice(&SIGNATURE);
    buf.push(2); // version
    buf.push(8); // size of offsets
    buf.push(8); // size of lengths
    buf.push(0); // consistency flags
    buf.extend_from_slice(&0u64.to_le_bytes()); // base address
    buf.extend_from_slice(&UNDEFINED_ADDRESS.to_le_bytes()); // extension
    buf.extend_from_slice(&end_of_file.to_le_bytes());
    buf.extend_from_slice(&root_address.to_le_bytes());
    let checksum = lookup3(&buf);
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf
}

/// dataspace v2. 빈 shape는 scalar
pub fn dataspace(shape: &[usize]) -> Vec<u8> {
    let kind = if shape.is_empty() { 0 } else { 1 };
    let mut buf = vec![2, shape.len() as u8, 0, kind];
    for &dim in shape {
        buf.extend_from_slice(&(dim as u64).to_le_bytes());
    }
    buf
}

/// datatype v1
pub fn datatype(element: ElementType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    match element {
        ElementType::I32 => {
            // fixed-point, little-endian, signed
            buf.extend_from_slice(&[0x10, 0x08, 0x00, 0x00]);
            buf.extend_from_slice(&4u32.to_le_bytes());
            buf.extend_from_slice(&0u16.to_le_bytes()); // bit offset
            buf.extend_from_slice(&32u16.to_le_bytes()); // precision
        }
        ElementType::F32 => {
            // floating-point, little-endian, implied msb, sign bit 31
            buf.extend_from_slice(&[0x11, 0x20, 0x1f, 0x00]);
            buf.extend_from_slice(&4u32.to_le_bytes());
            buf.extend_from_slice(&0u16.to_le_bytes()); // bit offset
            buf.extend_from_slice(&32u16.to_le_bytes()); // precision
            buf.push(23); // exponent location
            buf.push(8); // exponent size
            buf.push(0); // mantissa location
            buf.push(23); // mantissa size
            buf.extend_from_slice(&127u32.to_le_bytes()); // exponent bias
        }
    }
    buf
}

/// fill value v3, 기본 채움값(0)과 "설정된 경우에만 기록"
pub fn fill_value(alloc: AllocTime) -> Vec<u8> {
    let write_if_set = 2u8 << 2;
    vec![3, alloc as u8 | write_if_set]
}

/// data layout v3, contiguous
pub fn contiguous_layout(address: u64, size: u64) -> Vec<u8> {
    let mut buf = vec![3, 1];
    buf.extend_from_slice(&address.to_le_bytes());
    buf.extend_from_slice(&size.to_le_bytes());
    buf
}

/// data layout v3, chunked (v1 B-tree 인덱스)
///
/// 차원 수는 랭크 + 1이며 마지막 차원은 원소 크기다.
pub fn chunked_layout(btree_address: u64, chunk: &[u32], element_size: u32) -> Vec<u8> {
    let mut buf = vec![3, 2, (chunk.len() + 1) as u8];
    buf.extend_from_slice(&btree_address.to_le_bytes());
    for &dim in chunk {
        buf.extend_from_slice(&dim.to_le_bytes());
    }
    buf.extend_from_slice(&element_size.to_le_bytes());
    buf
}

/// filter pipeline v2, deflate 하나
pub fn deflate_pipeline(level: u32) -> Vec<u8> {
    let mut buf = vec![2, 1];
    buf.extend_from_slice(&FILTER_DEFLATE.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // optional
    buf.extend_from_slice(&1u16.to_le_bytes()); // client data 개수
    buf.extend_from_slice(&level.to_le_bytes());
    buf
}

/// link info v0, compact 저장 (fractal heap 없음)
pub fn link_info() -> Vec<u8> {
    let mut buf = vec![0, 0];
    buf.extend_from_slice(&UNDEFINED_ADDRESS.to_le_bytes());
    buf.extend_from_slice(&UNDEFINED_ADDRESS.to_le_bytes());
    buf
}

/// group info v0, 기본값
pub fn group_info() -> Vec<u8> {
    vec![0, 0]
}

/// hard link 메시지
pub fn hard_link(name: &str, address: u64) -> Result<Vec<u8>> {
    validate_link_name(name)?;

    let name_bytes = name.as_bytes();
    let mut flags = 0u8;
    if name_bytes.len() > u8::MAX as usize {
        flags |= 0x01;
    }
    if !name.is_ascii() {
        flags |= 0x10;
    }

    let mut buf = vec![1, flags];
    if !name.is_ascii() {
        buf.push(1); // UTF-8
    }
    if name_bytes.len() > u8::MAX as usize {
        buf.write_u16::<LittleEndian>(name_bytes.len() as u16)?;
    } else {
        buf.push(name_bytes.len() as u8);
    }
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&address.to_le_bytes());
    Ok(buf)
}

/// 링크 이름 검사. 경로 구분자가 들어가면 다른 객체를 가리키게 된다.
pub fn validate_link_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." {
        return Err(ConvertError::encoding(format!("invalid dataset name '{name}'")));
    }
    if name.contains('/') {
        return Err(ConvertError::encoding(format!(
            "dataset name '{name}' contains '/'"
        )));
    }
    if name.len() > u16::MAX as usize {
        return Err(ConvertError::encoding("dataset name too long"));
    }
    Ok(())
}

/// v1 B-tree 리프 노드: 데이터셋 전체를 덮는 chunk 하나
///
/// 리더는 K에서 계산한 노드 크기만큼 읽으므로 남는 엔트리 자리는 0으로 채운다.
pub fn single_chunk_btree(shape: &[usize], stored_size: u32, chunk_address: u64) -> Vec<u8> {
    let rank = shape.len();
    let key_size = 4 + 4 + 8 * (rank + 1);
    let node_size = 24 + (2 * CHUNK_BTREE_K + 1) * key_size + 2 * CHUNK_BTREE_K * 8;

    let mut buf = Vec::with_capacity(node_size);
    buf.extend_from_slice(b"TREE");
    buf.push(1); // raw data chunk 노드
    buf.push(0); // level
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&UNDEFINED_ADDRESS.to_le_bytes());
    buf.extend_from_slice(&UNDEFINED_ADDRESS.to_le_bytes());

    // key 0: chunk 크기, 필터 마스크, 시작 오프셋
    buf.extend_from_slice(&stored_size.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    for _ in 0..=rank {
        buf.extend_from_slice(&0u64.to_le_bytes());
    }
    buf.extend_from_slice(&chunk_address.to_le_bytes());

    // key 1: 상한
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    for &dim in shape {
        buf.extend_from_slice(&(dim as u64).to_le_bytes());
    }
    buf.extend_from_slice(&0u64.to_le_bytes());

    buf.resize(node_size, 0);
    buf
}
