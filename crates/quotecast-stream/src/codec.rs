//! 폴링 응답 디코더.
//!
//! 응답 본문은 `{"m": tag, "v": [..]}` 레코드의 JSON 배열입니다.
//!
//! ```json
//! [{"m":"h"},{"m":"a_req","v":["360015751.LastPrice",101]},{"m":"un","v":[101,119.9]}]
//! ```
//!
//! 한 응답 안의 레코드는 서로 인과관계가 있으므로(등록 직후 같은 참조의 값)
//! 레코드 하나라도 잘못되면 응답 전체를 버립니다. 부분 결과는 반환하지 않습니다.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::message::{tag, Message};
use crate::subscription;

/// 디코딩 에러.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// 본문이 JSON 배열이 아님
    #[error("invalid poll payload: {0}")]
    InvalidPayload(String),

    /// 레코드 형식 오류
    #[error("malformed record #{index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    /// 알 수 없는 태그
    #[error("unknown message tag: {0}")]
    UnknownTag(String),

    /// 서버가 구독을 거부함
    #[error("subscription rejected: {0}")]
    SubscriptionRejected(String),

    /// 세션이 무효화됨 (재인증 필요)
    #[error("session expired, re-authentication required")]
    SessionExpired,
}

impl DecodeError {
    /// 재인증 후 재구독이 필요한 에러인지 확인.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, DecodeError::SessionExpired)
    }
}

/// 와이어 레코드. `m`으로 분기한 뒤 태그별로 `v`를 해석합니다.
#[derive(Debug, Deserialize)]
struct RawRecord {
    m: String,
    #[serde(default)]
    v: Option<Value>,
}

/// 폴링 응답 하나를 메시지 목록으로 디코딩합니다.
///
/// 입력에만 의존하는 순수 함수입니다.
pub fn decode(raw: &str) -> Result<Vec<Message>, DecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<Value> = serde_json::from_str(trimmed).map_err(|e| {
        DecodeError::InvalidPayload(format!(
            "{} (body: {}...)",
            e,
            trimmed.chars().take(50).collect::<String>()
        ))
    })?;

    // 세션 무효 신호는 다른 레코드 오류보다 우선한다
    if values
        .iter()
        .any(|value| value.get("m").and_then(Value::as_str) == Some(tag::SESSION_INVALID))
    {
        return Err(DecodeError::SessionExpired);
    }

    let mut messages = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        let record: RawRecord =
            serde_json::from_value(value).map_err(|e| DecodeError::MalformedRecord {
                index,
                reason: e.to_string(),
            })?;
        messages.push(decode_record(index, record)?);
    }

    Ok(messages)
}

fn decode_record(index: usize, record: RawRecord) -> Result<Message, DecodeError> {
    match record.m.as_str() {
        tag::REGISTRATION => {
            let (key, reference): (String, i64) = payload(index, &record)?;
            let (instrument_id, metric_name) = split_metric_key(index, &key)?;
            Ok(Message::Registration {
                reference,
                instrument_id,
                metric_name,
            })
        }
        tag::UNREGISTRATION => {
            let (key, reference): (String, i64) = payload(index, &record)?;
            let (instrument_id, metric_name) = split_metric_key(index, &key)?;
            Ok(Message::Unregistration {
                reference,
                instrument_id,
                metric_name,
            })
        }
        tag::NUMERIC => {
            let (reference, value): (i64, f64) = payload(index, &record)?;
            Ok(Message::Numeric { reference, value })
        }
        tag::TEXT => {
            let (reference, value): (i64, String) = payload(index, &record)?;
            Ok(Message::Text { reference, value })
        }
        tag::HEARTBEAT => Ok(Message::Heartbeat),
        tag::UNAVAILABLE => {
            let reference = record
                .v
                .as_ref()
                .and_then(|v| v.get(0))
                .and_then(Value::as_i64);
            Ok(Message::Unavailable { reference })
        }
        tag::REJECTED => Err(DecodeError::SubscriptionRejected(rejection_detail(&record))),
        tag::SESSION_INVALID => Err(DecodeError::SessionExpired),
        other => Err(DecodeError::UnknownTag(other.to_string())),
    }
}

/// `v`를 태그별 고정 형태로 역직렬화.
fn payload<T: DeserializeOwned>(index: usize, record: &RawRecord) -> Result<T, DecodeError> {
    let value = record
        .v
        .clone()
        .ok_or_else(|| DecodeError::MalformedRecord {
            index,
            reason: format!("'{}' record without 'v'", record.m),
        })?;

    serde_json::from_value(value).map_err(|e| DecodeError::MalformedRecord {
        index,
        reason: format!("'{}' payload: {}", record.m, e),
    })
}

/// `"{instrument_id}.{metric_name}"`를 마지막 `.` 기준으로 분리.
///
/// 종목 ID에는 `.`이 들어갈 수 있지만 지표명에는 없습니다.
fn split_metric_key(index: usize, key: &str) -> Result<(String, String), DecodeError> {
    match key.rsplit_once('.') {
        Some((instrument_id, metric_name)) if !instrument_id.is_empty() && !metric_name.is_empty() => {
            Ok((instrument_id.to_string(), metric_name.to_string()))
        }
        _ => Err(DecodeError::MalformedRecord {
            index,
            reason: format!("invalid metric key '{}'", key),
        }),
    }
}

fn rejection_detail(record: &RawRecord) -> String {
    match &record.v {
        Some(Value::Array(items)) => match items.first() {
            Some(Value::String(s)) => s.clone(),
            Some(_) => Value::Array(items.clone()).to_string(),
            None => String::new(),
        },
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// 시세 스트림 코덱.
///
/// 디코딩과 구독 페이로드 인코딩을 한 값으로 묶어 둡니다. 상태가 없습니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuotecastCodec;

impl QuotecastCodec {
    /// 새 코덱 생성.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// 폴링 응답 디코딩.
    ///
    /// # Errors
    ///
    /// 레코드 하나라도 잘못되면 [`DecodeError`]를 반환합니다.
    pub fn decode(&self, raw: &str) -> Result<Vec<Message>, DecodeError> {
        decode(raw)
    }

    /// 구독/해제 제어 페이로드 인코딩.
    pub fn encode_subscription(
        &self,
        subscriptions: &BTreeMap<String, BTreeSet<String>>,
        unsubscriptions: &BTreeMap<String, BTreeSet<String>>,
    ) -> String {
        subscription::encode(subscriptions, unsubscriptions)
    }
}
