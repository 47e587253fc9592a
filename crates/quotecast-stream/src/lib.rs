//! 롱폴링 실시간 시세 스트림 클라이언트.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 압축된 참조 기반 응답 포맷 디코더 (`codec`)
//! - 폴링 간에 유지되는 참조 테이블과 지표 해석기 (`reference`)
//! - 종목별 스냅샷 병합 및 forward-fill (`ticker`)
//! - 구독/해제 제어 페이로드 인코더 (`subscription`)
//! - 스레드 안전한 세션 상태와 유휴 타임아웃 감시 (`connection`)
//! - HTTP 전송 계층 추상화와 reqwest 구현 (`transport`)
//! - 재인증/재구독을 포함한 폴링 루프 (`feed`)

pub mod codec;
pub mod connection;
pub mod error;
pub mod feed;
pub mod message;
pub mod reference;
pub mod subscription;
pub mod ticker;
pub mod transport;

pub use codec::{decode, DecodeError, QuotecastCodec};
pub use connection::{
    Clock, ConnectionError, ConnectionState, ManualClock, MonotonicClock, DEFAULT_QUOTE_TIMEOUT,
    DEFAULT_TRADING_TIMEOUT,
};
pub use error::*;
pub use feed::{FeedEvent, QuoteFeed};
pub use message::Message;
pub use reference::{ReferenceTable, ResolutionError};
pub use subscription::{encode, MetricSelection, SubscriptionRequest, SubscriptionSet};
pub use ticker::{merge, MergeMode, TickerBuilder};
pub use transport::{HttpTransport, QuoteTransport};
