//! # Quotecast Core
//!
//! 실시간 시세 스트림 클라이언트의 공통 타입을 제공합니다.
//!
//! 이 크레이트는 스트림 크레이트 전반에서 사용되는 기본 구성요소를 제공합니다:
//! - 해석된 지표(`Metric`)와 값 타입
//! - 종목별 스냅샷(`Ticker`)
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
