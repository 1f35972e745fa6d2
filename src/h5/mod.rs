//! HDF5 컨테이너 인코더/디코더
//!
//! 변환기에 필요한 부분집합만 다룬다.
//!
//! * superblock v2, 8바이트 오프셋/길이
//! * v2 object header + link message로 구성된 compact 그룹
//! * `i32`/`f32` little-endian 데이터셋 (scalar 또는 simple dataspace)
//! * contiguous 저장, 또는 데이터셋 전체를 하나의 chunk로 묶은 deflate 압축 저장

pub mod checksum;
pub mod message;
pub mod writer;
pub mod reader;

#[cfg(test)]
mod __tests__;

pub use checksum::lookup3;
pub use message::ElementType;
pub use writer::{DatasetLocation, H5Writer};
pub use reader::{Dataset, Group, H5File, Layout};

/// 파일 시그니처
pub const SIGNATURE: [u8; 8] = [0x89, b'H', b'D', b'F', b'\r', b'\n', 0x1a, b'\n'];

/// 정의되지 않은 주소
pub const UNDEFINED_ADDRESS: u64 = u64::MAX;

/// superblock v2 크기
pub const SUPERBLOCK_SIZE: u64 = 48;

/// v1 B-tree chunk 노드의 기본 K (superblock v2는 이 값을 저장하지 않는다)
pub const CHUNK_BTREE_K: usize = 32;

/// deflate 필터 ID
pub const FILTER_DEFLATE: u16 = 1;

/// 데이터셋 랭크 상한
pub const MAX_RANK: usize = 32;
