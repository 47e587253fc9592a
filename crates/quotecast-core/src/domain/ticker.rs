//! 종목별 지표 스냅샷 (Ticker).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::metric::{Metric, MetricValue};

/// 한 종목의 지표명 → 값.
pub type InstrumentMetrics = BTreeMap<String, MetricValue>;

/// 폴링 결과 스냅샷.
///
/// 종목/지표 모두 정렬된 맵이므로 같은 입력이면 순회 순서도 같습니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    /// 종목 ID → 지표
    pub instruments: BTreeMap<String, InstrumentMetrics>,
    /// 응답 수신 시각
    pub received_at: DateTime<Utc>,
    /// 폴링 요청에 걸린 시간
    pub poll_duration: Duration,
}

impl Ticker {
    /// 빈 스냅샷 생성.
    pub fn new(received_at: DateTime<Utc>, poll_duration: Duration) -> Self {
        Self {
            instruments: BTreeMap::new(),
            received_at,
            poll_duration,
        }
    }

    /// 지표 목록으로 스냅샷 생성. 같은 키가 여러 번 나오면 마지막 값이 남습니다.
    pub fn from_metrics(
        metrics: &[Metric],
        received_at: DateTime<Utc>,
        poll_duration: Duration,
    ) -> Self {
        let mut ticker = Self::new(received_at, poll_duration);
        ticker.upsert_all(metrics);
        ticker
    }

    /// 지표 하나를 덮어쓰기.
    pub fn upsert(&mut self, metric: &Metric) {
        self.instruments
            .entry(metric.instrument_id.clone())
            .or_default()
            .insert(metric.metric_name.clone(), metric.value.clone());
    }

    /// 지표 여러 개를 순서대로 덮어쓰기.
    pub fn upsert_all(&mut self, metrics: &[Metric]) {
        for metric in metrics {
            self.upsert(metric);
        }
    }

    /// 특정 종목의 지표 맵.
    pub fn instrument(&self, instrument_id: &str) -> Option<&InstrumentMetrics> {
        self.instruments.get(instrument_id)
    }

    /// 특정 종목/지표 값.
    pub fn get(&self, instrument_id: &str, metric_name: &str) -> Option<&MetricValue> {
        self.instruments
            .get(instrument_id)
            .and_then(|metrics| metrics.get(metric_name))
    }

    /// 포함된 종목 ID.
    pub fn instrument_ids(&self) -> impl Iterator<Item = &str> {
        self.instruments.keys().map(String::as_str)
    }

    /// 종목 수.
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// 종목이 하나도 없는지 확인.
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// 전체 지표 수.
    pub fn metric_count(&self) -> usize {
        self.instruments.values().map(BTreeMap::len).sum()
    }

    /// (종목, 지표, 값) 평탄화 목록.
    pub fn to_metrics(&self) -> Vec<Metric> {
        self.instruments
            .iter()
            .flat_map(|(instrument_id, metrics)| {
                metrics
                    .iter()
                    .map(move |(name, value)| Metric::new(instrument_id.clone(), name.clone(), value.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metric_name;

    fn sample() -> Vec<Metric> {
        vec![
            Metric::new("360015751", metric_name::LAST_PRICE, 119.9),
            Metric::new("360015751", metric_name::LAST_VOLUME, 100.0),
            Metric::new("331868", metric_name::LAST_TIME, "17:35:00"),
            Metric::new("360015751", metric_name::LAST_PRICE, 120.1),
        ]
    }

    #[test]
    fn test_from_metrics_last_value_wins() {
        let ticker = Ticker::from_metrics(&sample(), Utc::now(), Duration::from_millis(40));

        assert_eq!(ticker.len(), 2);
        assert_eq!(ticker.metric_count(), 3);
        assert_eq!(
            ticker.get("360015751", metric_name::LAST_PRICE),
            Some(&MetricValue::Number(120.1))
        );
        assert_eq!(
            ticker.get("331868", metric_name::LAST_TIME).and_then(MetricValue::as_str),
            Some("17:35:00")
        );
        assert!(ticker.get("331868", metric_name::LAST_PRICE).is_none());
    }

    #[test]
    fn test_instrument_ids_sorted() {
        let ticker = Ticker::from_metrics(&sample(), Utc::now(), Duration::ZERO);
        let ids: Vec<&str> = ticker.instrument_ids().collect();
        assert_eq!(ids, vec!["331868", "360015751"]);
    }

    #[test]
    fn test_to_metrics_flattens() {
        let ticker = Ticker::from_metrics(&sample(), Utc::now(), Duration::ZERO);
        let flat = ticker.to_metrics();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0], Metric::new("331868", metric_name::LAST_TIME, "17:35:00"));
    }

    #[test]
    fn test_empty_ticker() {
        let ticker = Ticker::default();
        assert!(ticker.is_empty());
        assert_eq!(ticker.metric_count(), 0);
        assert!(ticker.instrument("x").is_none());
    }
}
