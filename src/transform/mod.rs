//! 텐서 축 변환 엔진
//!
//! 키 기반 규칙 테이블로 각 가중치의 변환 종류(permute / transpose / identity)를 결정하고,
//! 입력 매핑을 건드리지 않은 채 새 매핑을 만든다.

pub mod rules;
pub mod engine;


pub use rules::*;
pub use engine::*;
