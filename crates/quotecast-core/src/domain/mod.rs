//! 시세 스트림 도메인 모델.

pub mod metric;
pub mod ticker;

pub use metric::*;
pub use ticker::*;
