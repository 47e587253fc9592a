//! 해석된 실시간 지표.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 지표 값. 서버는 숫자 값(`un`)과 문자열 값(`us`)을 구분해서 보냅니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// 숫자 값 (가격, 거래량 등)
    Number(f64),
    /// 문자열 값 (날짜, 시각 등)
    Text(String),
}

impl MetricValue {
    /// 숫자 값이면 반환.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }

    /// 문자열 값이면 반환.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetricValue::Number(_) => None,
            MetricValue::Text(s) => Some(s),
        }
    }

    /// 숫자 값을 `Decimal`로 변환.
    ///
    /// NaN/무한대이거나 문자열 값이면 `None`.
    pub fn as_decimal(&self) -> Option<Decimal> {
        self.as_f64().and_then(Decimal::from_f64)
    }

    /// 숫자 값인지 확인.
    pub fn is_number(&self) -> bool {
        matches!(self, MetricValue::Number(_))
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{}", v),
            MetricValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// 참조가 가리키는 (종목, 지표명) 쌍.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricKey {
    /// 종목 식별자
    pub instrument_id: String,
    /// 지표명 (예: "LastPrice")
    pub metric_name: String,
}

impl MetricKey {
    /// 새 키 생성.
    pub fn new(instrument_id: impl Into<String>, metric_name: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            metric_name: metric_name.into(),
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.instrument_id, self.metric_name)
    }
}

/// 참조 해석이 끝난 지표 값. 생성 후 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// 종목 식별자
    pub instrument_id: String,
    /// 지표명
    pub metric_name: String,
    /// 값
    pub value: MetricValue,
}

impl Metric {
    /// 새 지표 생성.
    pub fn new(
        instrument_id: impl Into<String>,
        metric_name: impl Into<String>,
        value: impl Into<MetricValue>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            metric_name: metric_name.into(),
            value: value.into(),
        }
    }

    /// 키와 값으로 생성.
    pub fn from_key(key: &MetricKey, value: MetricValue) -> Self {
        Self {
            instrument_id: key.instrument_id.clone(),
            metric_name: key.metric_name.clone(),
            value,
        }
    }

    /// (종목, 지표명) 키 반환.
    pub fn key(&self) -> MetricKey {
        MetricKey::new(self.instrument_id.clone(), self.metric_name.clone())
    }
}

/// 자주 쓰는 지표명.
pub mod metric_name {
    /// 최종 체결가
    pub const LAST_PRICE: &str = "LastPrice";
    /// 최종 체결량
    pub const LAST_VOLUME: &str = "LastVolume";
    /// 최종 체결 일자
    pub const LAST_DATE: &str = "LastDate";
    /// 최종 체결 시각
    pub const LAST_TIME: &str = "LastTime";
    /// 매수 호가
    pub const BID_PRICE: &str = "BidPrice";
    /// 매도 호가
    pub const ASK_PRICE: &str = "AskPrice";
}
