//! 디코딩된 스트림 메시지.

use quotecast_core::MetricKey;

/// 응답 레코드의 `m` 태그 상수.
pub mod tag {
    /// 참조 등록 (`v = ["{instrument}.{metric}", reference]`)
    pub const REGISTRATION: &str = "a_req";
    /// 참조 해제 (`v = ["{instrument}.{metric}", reference]`)
    pub const UNREGISTRATION: &str = "a_rel";
    /// 숫자 값 (`v = [reference, number]`)
    pub const NUMERIC: &str = "un";
    /// 문자열 값 (`v = [reference, string]`)
    pub const TEXT: &str = "us";
    /// 하트비트 (`v` 없음)
    pub const HEARTBEAT: &str = "h";
    /// 일시적으로 값 없음
    pub const UNAVAILABLE: &str = "ue";
    /// 구독 거부
    pub const REJECTED: &str = "d";
    /// 세션 무효
    pub const SESSION_INVALID: &str = "sr";
}

/// 한 번의 폴링 응답을 구성하는 메시지.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// 참조 → (종목, 지표) 등록
    Registration {
        reference: i64,
        instrument_id: String,
        metric_name: String,
    },
    /// 참조 해제
    Unregistration {
        reference: i64,
        instrument_id: String,
        metric_name: String,
    },
    /// 숫자 값
    Numeric { reference: i64, value: f64 },
    /// 문자열 값
    Text { reference: i64, value: String },
    /// 하트비트
    Heartbeat,
    /// 값이 일시적으로 제공되지 않음 (참조가 없는 레코드도 있음)
    Unavailable { reference: Option<i64> },
}

impl Message {
    /// 메시지가 가리키는 참조 번호.
    pub fn reference(&self) -> Option<i64> {
        match self {
            Message::Registration { reference, .. }
            | Message::Unregistration { reference, .. }
            | Message::Numeric { reference, .. }
            | Message::Text { reference, .. } => Some(*reference),
            Message::Unavailable { reference } => *reference,
            Message::Heartbeat => None,
        }
    }

    /// 등록/해제 메시지의 (종목, 지표) 키.
    pub fn key(&self) -> Option<MetricKey> {
        match self {
            Message::Registration {
                instrument_id,
                metric_name,
                ..
            }
            | Message::Unregistration {
                instrument_id,
                metric_name,
                ..
            } => Some(MetricKey::new(instrument_id.clone(), metric_name.clone())),
            _ => None,
        }
    }

    /// 지표 값을 담은 메시지인지 확인.
    pub fn is_value(&self) -> bool {
        matches!(self, Message::Numeric { .. } | Message::Text { .. })
    }

    /// 메시지의 와이어 태그.
    pub fn tag(&self) -> &'static str {
        match self {
            Message::Registration { .. } => tag::REGISTRATION,
            Message::Unregistration { .. } => tag::UNREGISTRATION,
            Message::Numeric { .. } => tag::NUMERIC,
            Message::Text { .. } => tag::TEXT,
            Message::Heartbeat => tag::HEARTBEAT,
            Message::Unavailable { .. } => tag::UNAVAILABLE,
        }
    }
}
