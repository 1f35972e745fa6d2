//! 스트리밍 HDF5 writer
//!
//! 자식 객체를 먼저 쓰고 부모가 그 주소를 참조한다. superblock 자리는 처음에 비워 두었다가
//! `finish`에서 루트 그룹 주소와 파일 끝 주소로 채운다.

use super::message::{self, AllocTime, ElementType, ObjectHeader, MSG_DATASPACE, MSG_DATATYPE,
    MSG_FILL_VALUE, MSG_FILTER_PIPELINE, MSG_FLAG_CONSTANT, MSG_GROUP_INFO, MSG_LAYOUT,
    MSG_LINK, MSG_LINK_INFO};
use super::{MAX_RANK, SUPERBLOCK_SIZE, UNDEFINED_ADDRESS};
use crate::error::{ConvertError, Result};
use byteorder::{ByteOrder, LittleEndian};
use flate2::write::ZlibEncoder;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

/// 기록된 데이터셋 위치
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatasetLocation {
    /// object header 주소
    pub header: u64,
    /// 원소 데이터가 디스크에서 차지하는 바이트 수
    pub stored_bytes: u64,
}

pub struct H5Writer<W: Write + Seek> {
    out: W,
    position: u64,
}

impl H5Writer<BufWriter<File>> {
    /// 파일 생성 (기존 파일은 잘라냄). 상위 디렉토리는 만들지 않는다.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ConvertError::Create {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufWriter::new(file))
    }

    /// superblock 기록 후 flush, fsync
    pub fn finish_file(self, root: u64) -> Result<()> {
        let out = self.finish(root)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

impl<W: Write + Seek> H5Writer<W> {
    pub fn new(mut out: W) -> Result<Self> {
        out.write_all(&[0u8; SUPERBLOCK_SIZE as usize])?;
        Ok(Self {
            out,
            position: SUPERBLOCK_SIZE,
        })
    }

    /// 다음 객체가 기록될 주소
    pub fn position(&self) -> u64 {
        self.position
    }

    fn append(&mut self, bytes: &[u8]) -> Result<u64> {
        let address = self.position;
        self.out.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(address)
    }

    /// `i32` scalar 데이터셋
    pub fn write_scalar_i32(&mut self, value: i32) -> Result<DatasetLocation> {
        let data_address = self.append(&value.to_le_bytes())?;

        let mut header = ObjectHeader::new();
        header
            .push(MSG_DATASPACE, 0, message::dataspace(&[]))
            .push(MSG_DATATYPE, MSG_FLAG_CONSTANT, message::datatype(ElementType::I32))
            .push(MSG_FILL_VALUE, 0, message::fill_value(AllocTime::Late))
            .push(MSG_LAYOUT, 0, message::contiguous_layout(data_address, 4));

        Ok(DatasetLocation {
            header: self.append(&header.encode()?)?,
            stored_bytes: 4,
        })
    }

    /// `f32` 데이터셋. `deflate_level`이 있으면 단일 chunk로 압축한다.
    ///
    /// scalar와 빈 데이터셋은 chunk로 만들 수 없어 항상 contiguous로 기록된다.
    pub fn write_f32(
        &mut self,
        shape: &[usize],
        data: &[f32],
        deflate_level: Option<u32>,
    ) -> Result<DatasetLocation> {
        if shape.len() > MAX_RANK {
            return Err(ConvertError::encoding(format!(
                "rank {} exceeds the container limit of {MAX_RANK}",
                shape.len()
            )));
        }
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ConvertError::encoding(format!(
                "shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }

        let mut raw = vec![0u8; data.len() * 4];
        LittleEndian::write_f32_into(data, &mut raw);

        let chunkable = !shape.is_empty() && !data.is_empty();
        match deflate_level {
            Some(level) if chunkable => self.write_deflated(shape, &raw, level),
            _ => self.write_contiguous(shape, &raw),
        }
    }

    fn write_contiguous(&mut self, shape: &[usize], raw: &[u8]) -> Result<DatasetLocation> {
        let data_address = if raw.is_empty() {
            UNDEFINED_ADDRESS
        } else {
            self.append(raw)?
        };

        let mut header = ObjectHeader::new();
        header
            .push(MSG_DATASPACE, 0, message::dataspace(shape))
            .push(MSG_DATATYPE, MSG_FLAG_CONSTANT, message::datatype(ElementType::F32))
            .push(MSG_FILL_VALUE, 0, message::fill_value(AllocTime::Late))
            .push(MSG_LAYOUT, 0, message::contiguous_layout(data_address, raw.len() as u64));

        Ok(DatasetLocation {
            header: self.append(&header.encode()?)?,
            stored_bytes: raw.len() as u64,
        })
    }

    fn write_deflated(&mut self, shape: &[usize], raw: &[u8], level: u32) -> Result<DatasetLocation> {
        let chunk = shape
            .iter()
            .map(|&dim| u32::try_from(dim))
            .collect::<std::result::Result<Vec<u32>, _>>()
            .map_err(|_| ConvertError::encoding(format!("chunk dimension too large in {shape:?}")))?;
        if u32::try_from(raw.len()).is_err() {
            return Err(ConvertError::encoding(format!(
                "{} bytes exceed the 4 GiB chunk limit",
                raw.len()
            )));
        }

        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
        encoder.write_all(raw)?;
        let compressed = encoder.finish()?;
        let stored_size = u32::try_from(compressed.len())
            .map_err(|_| ConvertError::encoding("compressed chunk exceeds 4 GiB"))?;

        let chunk_address = self.append(&compressed)?;
        let btree_address = self.append(&message::single_chunk_btree(shape, stored_size, chunk_address))?;

        let mut header = ObjectHeader::new();
        header
            .push(MSG_DATASPACE, 0, message::dataspace(shape))
            .push(MSG_DATATYPE, MSG_FLAG_CONSTANT, message::datatype(ElementType::F32))
            .push(MSG_FILL_VALUE, 0, message::fill_value(AllocTime::Incremental))
            .push(MSG_LAYOUT, 0, message::chunked_layout(btree_address, &chunk, 4))
            .push(MSG_FILTER_PIPELINE, 0, message::deflate_pipeline(level));

        Ok(DatasetLocation {
            header: self.append(&header.encode()?)?,
            stored_bytes: compressed.len() as u64,
        })
    }

    /// compact 그룹. 멤버는 주어진 순서대로 링크된다.
    pub fn write_group<S: AsRef<str>>(&mut self, members: &[(S, u64)]) -> Result<u64> {
        let mut header = ObjectHeader::new();
        header
            .push(MSG_LINK_INFO, 0, message::link_info())
            .push(MSG_GROUP_INFO, 0, message::group_info());
        for (name, address) in members {
            header.push(MSG_LINK, 0, message::hard_link(name.as_ref(), *address)?);
        }
        self.append(&header.encode()?)
    }

    /// superblock을 채우고 내부 writer 반환
    pub fn finish(mut self, root: u64) -> Result<W> {
        let end_of_file = self.position;
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(&message::superblock(root, end_of_file))?;
        self.out.seek(SeekFrom::Start(end_of_file))?;
        self.out.flush()?;
        Ok(self.out)
    }
}
