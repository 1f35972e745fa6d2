//! HDF5 reader (writer가 만드는 부분집합 전용)

use super::checksum::lookup3;
use super::message::{ElementType, MSG_CONTINUATION, MSG_DATASPACE, MSG_DATATYPE,
    MSG_FILTER_PIPELINE, MSG_LAYOUT, MSG_LINK, MSG_LINK_INFO, MSG_NIL};
use super::{FILTER_DEFLATE, SIGNATURE, UNDEFINED_ADDRESS};
use crate::error::{ConvertError, Result};
use byteorder::{ByteOrder, LittleEndian};
use flate2::read::ZlibDecoder;
use memmap2::Mmap;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// chunk B-tree 최대 level
const MAX_BTREE_DEPTH: u8 = 32;

/// 메모리 맵으로 연 HDF5 파일
pub struct H5File {
    map: Mmap,
    root: u64,
}

impl H5File {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: 읽기 전용 매핑이며 파일은 이 객체가 살아 있는 동안 수정하지 않는다
        let map = unsafe { Mmap::map(&file)? };
        let root = parse_superblock(&map)?;
        Ok(Self { map, root })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn root(&self) -> Result<Group<'_>> {
        Group::load(self, self.root)
    }

    /// `a/b/c` 형태 경로로 그룹 찾기
    pub fn group(&self, path: &str) -> Result<Group<'_>> {
        let mut group = self.root()?;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            group = group.group(part)?;
        }
        Ok(group)
    }

    fn bytes(&self, address: u64, len: u64) -> Result<&[u8]> {
        let start = usize::try_from(address).map_err(|_| ConvertError::format("address overflow"))?;
        let len = usize::try_from(len).map_err(|_| ConvertError::format("length overflow"))?;
        start
            .checked_add(len)
            .and_then(|end| self.map.get(start..end))
            .ok_or_else(|| {
                ConvertError::format(format!("block at {address} (+{len}) is past the end of file"))
            })
    }
}

fn parse_superblock(data: &[u8]) -> Result<u64> {
    if data.len() < 48 || data[..8] != SIGNATURE {
        return Err(ConvertError::format("missing HDF5 signature"));
    }
    let version = data[8];
    if version != 2 && version != 3 {
        return Err(ConvertError::format(format!("unsupported superblock version {version}")));
    }
    if data[9] != 8 || data[10] != 8 {
        return Err(ConvertError::format("only 8-byte offsets and lengths are supported"));
    }
    let stored = LittleEndian::read_u32(&data[44..48]);
    if lookup3(&data[..44]) != stored {
        return Err(ConvertError::format("superblock checksum mismatch"));
    }
    let end_of_file = LittleEndian::read_u64(&data[28..36]);
    if end_of_file > data.len() as u64 {
        return Err(ConvertError::format(format!(
            "truncated file: {} bytes, end of file recorded at {end_of_file}",
            data.len()
        )));
    }
    Ok(LittleEndian::read_u64(&data[36..44]))
}

/// 경계 검사를 하는 little-endian 커서
struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&end| end <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(ConvertError::format("truncated header message")),
        }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    /// 1/2/4/8 바이트 가변 길이 정수
    fn sized(&mut self, size: usize) -> Result<u64> {
        Ok(match size {
            1 => self.u8()? as u64,
            2 => self.u16()? as u64,
            4 => self.u32()? as u64,
            _ => self.u64()?,
        })
    }
}

struct Message<'a> {
    kind: u8,
    body: &'a [u8],
}

/// v2 object header를 메시지 목록으로 분해
fn read_object_header(file: &H5File, address: u64) -> Result<Vec<Message<'_>>> {
    let prefix = file.bytes(address, 6)?;
    if &prefix[..4] != b"OHDR" {
        return Err(ConvertError::format(format!(
            "object at {address} is not a version 2 object header"
        )));
    }
    if prefix[4] != 2 {
        return Err(ConvertError::format(format!(
            "unsupported object header version {}",
            prefix[4]
        )));
    }
    let flags = prefix[5];

    let mut fixed = 6u64;
    if flags & 0x20 != 0 {
        fixed += 16; // access/modification/change/birth times
    }
    if flags & 0x10 != 0 {
        fixed += 4; // attribute phase change
    }
    let size_width = 1usize << (flags & 0x03);
    let mut cursor = ByteCursor::new(file.bytes(address + fixed, size_width as u64)?);
    let chunk_size = cursor.sized(size_width)?;
    let body_start = address + fixed + size_width as u64;

    let covered = file.bytes(address, body_start - address + chunk_size)?;
    let stored = LittleEndian::read_u32(file.bytes(body_start + chunk_size, 4)?);
    if lookup3(covered) != stored {
        return Err(ConvertError::format(format!(
            "object header checksum mismatch at {address}"
        )));
    }

    let tracks_order = flags & 0x04 != 0;
    let header_len = if tracks_order { 6 } else { 4 };
    let mut cursor = ByteCursor::new(file.bytes(body_start, chunk_size)?);
    let mut messages = Vec::new();
    while cursor.remaining() >= header_len {
        let kind = cursor.u8()?;
        let size = cursor.u16()? as usize;
        let _flags = cursor.u8()?;
        if tracks_order {
            cursor.u16()?;
        }
        let body = cursor.take(size)?;
        match kind {
            MSG_NIL => {}
            MSG_CONTINUATION => {
                return Err(ConvertError::format("object header continuation blocks are not supported"))
            }
            _ => messages.push(Message { kind, body }),
        }
    }
    Ok(messages)
}

/// 링크 메시지로 구성된 그룹
pub struct Group<'f> {
    file: &'f H5File,
    links: BTreeMap<String, u64>,
}

impl<'f> Group<'f> {
    fn load(file: &'f H5File, address: u64) -> Result<Self> {
        let messages = read_object_header(file, address)?;
        let mut is_group = false;
        let mut links = BTreeMap::new();

        for message in &messages {
            match message.kind {
                MSG_LINK_INFO => {
                    is_group = true;
                    let mut cursor = ByteCursor::new(message.body);
                    cursor.u8()?;
                    let flags = cursor.u8()?;
                    if flags & 0x01 != 0 {
                        cursor.u64()?;
                    }
                    if cursor.u64()? != UNDEFINED_ADDRESS {
                        return Err(ConvertError::format("dense link storage is not supported"));
                    }
                }
                MSG_LINK => {
                    if let Some((name, target)) = parse_hard_link(message.body)? {
                        links.insert(name, target);
                    }
                }
                _ => {}
            }
        }

        if !is_group {
            return Err(ConvertError::format(format!("object at {address} is not a group")));
        }
        Ok(Self { file, links })
    }

    /// 멤버 이름 (사전순)
    pub fn member_names(&self) -> Vec<&str> {
        self.links.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.links.contains_key(name)
    }

    fn address_of(&self, name: &str) -> Result<u64> {
        self.links
            .get(name)
            .copied()
            .ok_or_else(|| ConvertError::format(format!("no member named '{name}'")))
    }

    pub fn group(&self, name: &str) -> Result<Group<'f>> {
        Group::load(self.file, self.address_of(name)?)
    }

    pub fn dataset(&self, name: &str) -> Result<Dataset<'f>> {
        Dataset::load(self.file, self.address_of(name)?)
    }
}

/// hard link만 반환. soft/external 링크는 건너뛴다.
fn parse_hard_link(body: &[u8]) -> Result<Option<(String, u64)>> {
    let mut cursor = ByteCursor::new(body);
    let version = cursor.u8()?;
    if version != 1 {
        return Err(ConvertError::format(format!("unsupported link message version {version}")));
    }
    let flags = cursor.u8()?;
    let link_type = if flags & 0x08 != 0 { cursor.u8()? } else { 0 };
    if flags & 0x04 != 0 {
        cursor.u64()?;
    }
    if flags & 0x10 != 0 {
        cursor.u8()?;
    }
    let name_len = cursor.sized(1 << (flags & 0x03))? as usize;
    let name = String::from_utf8(cursor.take(name_len)?.to_vec())
        .map_err(|_| ConvertError::format("link name is not valid UTF-8"))?;
    if link_type != 0 {
        return Ok(None);
    }
    Ok(Some((name, cursor.u64()?)))
}

/// 데이터 저장 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    Contiguous { address: u64, size: u64 },
    Chunked { btree: u64, chunk: Vec<usize> },
}

/// 단일 데이터셋
pub struct Dataset<'f> {
    file: &'f H5File,
    shape: Vec<usize>,
    element: ElementType,
    layout: Layout,
    filters: Vec<u16>,
}

impl<'f> Dataset<'f> {
    fn load(file: &'f H5File, address: u64) -> Result<Self> {
        let mut shape = None;
        let mut element = None;
        let mut layout = None;
        let mut filters = Vec::new();

        for message in read_object_header(file, address)? {
            match message.kind {
                MSG_DATASPACE => shape = Some(parse_dataspace(message.body)?),
                MSG_DATATYPE => element = Some(parse_datatype(message.body)?),
                MSG_LAYOUT => layout = Some(parse_layout(message.body)?),
                MSG_FILTER_PIPELINE => filters = parse_filters(message.body)?,
                _ => {}
            }
        }

        let missing = |what: &str| ConvertError::format(format!("object at {address} has no {what} message"));
        let shape = shape.ok_or_else(|| missing("dataspace"))?;
        let element = element.ok_or_else(|| missing("datatype"))?;
        let layout = layout.ok_or_else(|| missing("layout"))?;

        byte_count(&shape, element.size()).ok_or_else(|| {
            ConvertError::format(format!("dataspace {shape:?} is too large to read"))
        })?;
        if let Layout::Chunked { chunk, .. } = &layout {
            if chunk.len() != shape.len() {
                return Err(ConvertError::format(format!(
                    "chunk rank {} does not match dataspace rank {}",
                    chunk.len(),
                    shape.len()
                )));
            }
            if chunk.contains(&0) || byte_count(chunk, element.size()).is_none() {
                return Err(ConvertError::format(format!("invalid chunk dimensions {chunk:?}")));
            }
        }

        Ok(Self { file, shape, element, layout, filters })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn element_type(&self) -> ElementType {
        self.element
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// 원소 개수 (scalar는 1). 로드할 때 overflow 여부를 검사한다.
    pub fn elem_count(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_compressed(&self) -> bool {
        !self.filters.is_empty()
    }

    /// 디스크에 저장된 원소 데이터 크기
    pub fn stored_bytes(&self) -> Result<u64> {
        match &self.layout {
            Layout::Contiguous { size, .. } => Ok(*size),
            Layout::Chunked { btree, .. } => {
                let mut total = 0u64;
                self.visit_chunks(*btree, &mut |entry| {
                    total += entry.size as u64;
                    Ok(())
                })?;
                Ok(total)
            }
        }
    }

    /// 원소 바이트 (row-major, little-endian)
    pub fn read_raw(&self) -> Result<Vec<u8>> {
        let elem = self.element.size();
        let total = byte_count(&self.shape, elem)
            .ok_or_else(|| ConvertError::format("dataspace is too large to read"))?;

        match &self.layout {
            Layout::Contiguous { address, size } => {
                if *address == UNDEFINED_ADDRESS {
                    return Ok(vec![0u8; total]);
                }
                if *size != total as u64 {
                    return Err(ConvertError::format(format!(
                        "contiguous storage holds {size} bytes, expected {total}"
                    )));
                }
                Ok(self.file.bytes(*address, *size)?.to_vec())
            }
            Layout::Chunked { btree, chunk } => {
                let mut out = vec![0u8; total];
                let chunk_bytes = byte_count(chunk, elem)
                    .ok_or_else(|| ConvertError::format("chunk is too large to read"))?;
                self.visit_chunks(*btree, &mut |entry| {
                    let stored = self.file.bytes(entry.address, entry.size as u64)?;
                    let data = if !self.filters.is_empty() && entry.filter_mask & 1 == 0 {
                        let mut inflated = Vec::with_capacity(chunk_bytes);
                        ZlibDecoder::new(stored)
                            .take(chunk_bytes as u64 + 1)
                            .read_to_end(&mut inflated)
                            .map_err(|e| ConvertError::format(format!("deflate chunk: {e}")))?;
                        inflated
                    } else {
                        stored.to_vec()
                    };
                    if data.len() != chunk_bytes {
                        return Err(ConvertError::format(format!(
                            "chunk holds {} bytes, expected {chunk_bytes}",
                            data.len()
                        )));
                    }
                    scatter_chunk(&mut out, &self.shape, chunk, &entry.offset, &data, elem);
                    Ok(())
                })?;
                Ok(out)
            }
        }
    }

    pub fn read_f32(&self) -> Result<Vec<f32>> {
        if self.element != ElementType::F32 {
            return Err(ConvertError::format(format!(
                "dataset holds {}, not f32",
                self.element.name()
            )));
        }
        let raw = self.read_raw()?;
        let mut out = vec![0f32; raw.len() / 4];
        LittleEndian::read_f32_into(&raw, &mut out);
        Ok(out)
    }

    pub fn read_i32(&self) -> Result<Vec<i32>> {
        if self.element != ElementType::I32 {
            return Err(ConvertError::format(format!(
                "dataset holds {}, not i32",
                self.element.name()
            )));
        }
        let raw = self.read_raw()?;
        let mut out = vec![0i32; raw.len() / 4];
        LittleEndian::read_i32_into(&raw, &mut out);
        Ok(out)
    }

    pub fn read_scalar_i32(&self) -> Result<i32> {
        match self.read_i32()?.as_slice() {
            [value] => Ok(*value),
            values => Err(ConvertError::format(format!(
                "expected a scalar, dataset has {} elements",
                values.len()
            ))),
        }
    }

    fn visit_chunks(
        &self,
        address: u64,
        visit: &mut dyn FnMut(ChunkEntry) -> Result<()>,
    ) -> Result<()> {
        let mut visited = HashSet::new();
        self.walk_btree(address, None, &mut visited, visit)
    }

    /// `expected_level`은 부모 노드 level - 1 (루트는 None)
    fn walk_btree(
        &self,
        address: u64,
        expected_level: Option<u8>,
        visited: &mut HashSet<u64>,
        visit: &mut dyn FnMut(ChunkEntry) -> Result<()>,
    ) -> Result<()> {
        if !visited.insert(address) {
            return Err(ConvertError::format(format!(
                "chunk B-tree node at {address} is referenced twice"
            )));
        }

        let ndims = self.shape.len() + 1;
        let key_size = 8 + 8 * ndims;

        let head = self.file.bytes(address, 24)?;
        if &head[..4] != b"TREE" || head[4] != 1 {
            return Err(ConvertError::format(format!(
                "expected a chunk B-tree node at {address}"
            )));
        }
        let level = head[5];
        if level > MAX_BTREE_DEPTH {
            return Err(ConvertError::format(format!(
                "chunk B-tree level {level} exceeds {MAX_BTREE_DEPTH}"
            )));
        }
        if let Some(expected) = expected_level {
            if level != expected {
                return Err(ConvertError::format(format!(
                    "chunk B-tree node at {address} has level {level}, expected {expected}"
                )));
            }
        }
        let entries = LittleEndian::read_u16(&head[6..8]) as usize;

        let body_len = entries * (key_size + 8) + key_size;
        let mut cursor = ByteCursor::new(self.file.bytes(address + 24, body_len as u64)?);
        for _ in 0..entries {
            let size = cursor.u32()?;
            let filter_mask = cursor.u32()?;
            let mut offset = Vec::with_capacity(ndims - 1);
            for _ in 0..ndims {
                offset.push(cursor.u64()? as usize);
            }
            offset.pop();
            let child = cursor.u64()?;

            if level > 0 {
                self.walk_btree(child, Some(level - 1), visited, visit)?;
            } else {
                visit(ChunkEntry { size, filter_mask, offset, address: child })?;
            }
        }
        Ok(())
    }
}

/// 원소 개수 × 원소 크기 (overflow면 None)
fn byte_count(dims: &[usize], elem: usize) -> Option<usize> {
    dims.iter().try_fold(elem, |acc, &dim| acc.checked_mul(dim))
}

struct ChunkEntry {
    size: u32,
    filter_mask: u32,
    offset: Vec<usize>,
    address: u64,
}

/// chunk 하나를 출력 버퍼의 해당 위치로 복사 (경계 밖 부분은 버림)
fn scatter_chunk(out: &mut [u8], shape: &[usize], chunk: &[usize], offset: &[usize], data: &[u8], elem: usize) {
    let rank = shape.len();
    if rank == 0 {
        let n = out.len().min(data.len());
        out[..n].copy_from_slice(&data[..n]);
        return;
    }
    let last = rank - 1;
    if offset[last] >= shape[last] {
        return;
    }
    let run = chunk[last].min(shape[last] - offset[last]);
    let rows: usize = chunk[..last].iter().product();
    let mut index = vec![0usize; last];

    for row in 0..rows {
        let mut rest = row;
        for d in (0..last).rev() {
            index[d] = rest % chunk[d];
            rest /= chunk[d];
        }
        let outside = (0..last).any(|d| {
            offset[d]
                .checked_add(index[d])
                .map_or(true, |pos| pos >= shape[d])
        });
        if outside {
            continue;
        }
        let mut dst = 0usize;
        for d in 0..last {
            dst = dst * shape[d] + offset[d] + index[d];
        }
        dst = dst * shape[last] + offset[last];
        let src = row * chunk[last];
        out[dst * elem..(dst + run) * elem].copy_from_slice(&data[src * elem..(src + run) * elem]);
    }
}

fn parse_dataspace(body: &[u8]) -> Result<Vec<usize>> {
    let mut cursor = ByteCursor::new(body);
    let version = cursor.u8()?;
    let rank = cursor.u8()? as usize;
    let _flags = cursor.u8()?;
    match version {
        1 => {
            cursor.take(5)?;
        }
        2 => {
            if cursor.u8()? == 2 {
                return Err(ConvertError::format("null dataspaces are not supported"));
            }
        }
        other => return Err(ConvertError::format(format!("unsupported dataspace version {other}"))),
    }
    (0..rank).map(|_| Ok(cursor.u64()? as usize)).collect()
}

fn parse_datatype(body: &[u8]) -> Result<ElementType> {
    let mut cursor = ByteCursor::new(body);
    let class = cursor.u8()? & 0x0f;
    let bits = cursor.take(3)?;
    let size = cursor.u32()?;
    let big_endian = bits[0] & 0x01 != 0;

    match (class, size) {
        (0, 4) if !big_endian && bits[0] & 0x08 != 0 => Ok(ElementType::I32),
        (1, 4) if !big_endian && bits[0] & 0x40 == 0 => Ok(ElementType::F32),
        _ => Err(ConvertError::format(format!(
            "unsupported datatype (class {class}, {size} bytes)"
        ))),
    }
}

fn parse_layout(body: &[u8]) -> Result<Layout> {
    let mut cursor = ByteCursor::new(body);
    let version = cursor.u8()?;
    if version != 3 {
        return Err(ConvertError::format(format!("unsupported layout version {version}")));
    }
    match cursor.u8()? {
        1 => Ok(Layout::Contiguous {
            address: cursor.u64()?,
            size: cursor.u64()?,
        }),
        2 => {
            let ndims = cursor.u8()? as usize;
            if ndims == 0 {
                return Err(ConvertError::format("chunked layout without dimensions"));
            }
            let btree = cursor.u64()?;
            let mut chunk = Vec::with_capacity(ndims);
            for _ in 0..ndims {
                chunk.push(cursor.u32()? as usize);
            }
            chunk.pop(); // 원소 크기
            Ok(Layout::Chunked { btree, chunk })
        }
        other => Err(ConvertError::format(format!("unsupported layout class {other}"))),
    }
}

fn parse_filters(body: &[u8]) -> Result<Vec<u16>> {
    let mut cursor = ByteCursor::new(body);
    let version = cursor.u8()?;
    let count = cursor.u8()? as usize;
    if version == 1 {
        cursor.take(6)?;
    }

    let mut filters = Vec::with_capacity(count);
    for _ in 0..count {
        let id = cursor.u16()?;
        let name_len = if version == 1 || id >= 256 { cursor.u16()? as usize } else { 0 };
        let _flags = cursor.u16()?;
        let values = cursor.u16()? as usize;
        if version == 1 {
            cursor.take((name_len + 7) / 8 * 8)?;
        } else {
            cursor.take(name_len)?;
        }
        cursor.take(values * 4)?;
        if version == 1 && values % 2 == 1 {
            cursor.take(4)?;
        }
        if id != FILTER_DEFLATE {
            return Err(ConvertError::format(format!("unsupported filter id {id}")));
        }
        filters.push(id);
    }
    Ok(filters)
}
