//! 스냅샷 병합.
//!
//! 폴링 응답에는 바뀐 지표만 들어 있습니다. 누적 스냅샷에 매 폴링의 델타를 덮어써
//! 최신 상태를 유지하고, `fill_na` 모드에서는 델타에 없는 지표를 누적 값으로 채워
//! 내보냅니다.

use std::time::Duration;

use chrono::{DateTime, Utc};
use quotecast_core::{Metric, Ticker};

/// 병합 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// 누적 스냅샷에 델타를 덮어씀
    Overwrite,
    /// 델타를 기준으로, 델타에 등장한 종목의 빠진 지표만 누적 값으로 채움
    FillOnly,
}

/// 누적 스냅샷과 델타를 병합한 새 스냅샷을 반환합니다.
///
/// 어느 모드든 델타 값이 항상 우선합니다. `FillOnly`는 델타에 없는 종목을 옮기지 않습니다.
pub fn merge(accumulated: &Ticker, delta: &[Metric], mode: MergeMode) -> Ticker {
    match mode {
        MergeMode::Overwrite => {
            let mut merged = accumulated.clone();
            merged.upsert_all(delta);
            merged
        }
        MergeMode::FillOnly => {
            let mut merged =
                Ticker::from_metrics(delta, accumulated.received_at, accumulated.poll_duration);
            for (instrument_id, metrics) in merged.instruments.iter_mut() {
                if let Some(previous) = accumulated.instrument(instrument_id) {
                    for (name, value) in previous {
                        metrics
                            .entry(name.clone())
                            .or_insert_with(|| value.clone());
                    }
                }
            }
            merged
        }
    }
}

/// 폴링마다 외부에 내보낼 스냅샷을 만드는 빌더.
///
/// 누적 스냅샷은 `fill_na` 여부와 관계없이 항상 `Overwrite`로 갱신합니다.
/// 채워진 값은 만료되지 않으며, 세션이 재설정되어도 유지됩니다.
#[derive(Debug, Clone, Default)]
pub struct TickerBuilder {
    accumulated: Ticker,
    fill_na: bool,
}

impl TickerBuilder {
    /// 새 빌더 생성.
    pub fn new(fill_na: bool) -> Self {
        Self {
            accumulated: Ticker::default(),
            fill_na,
        }
    }

    /// fill_na 활성화 여부.
    pub fn fill_na(&self) -> bool {
        self.fill_na
    }

    /// 이번 폴링의 지표로 스냅샷을 만들고 누적 상태를 갱신합니다.
    pub fn build(
        &mut self,
        metrics: &[Metric],
        received_at: DateTime<Utc>,
        poll_duration: Duration,
    ) -> Ticker {
        let mut ticker = if self.fill_na {
            merge(&self.accumulated, metrics, MergeMode::FillOnly)
        } else {
            Ticker::from_metrics(metrics, received_at, poll_duration)
        };
        ticker.received_at = received_at;
        ticker.poll_duration = poll_duration;

        self.accumulated.upsert_all(metrics);
        self.accumulated.received_at = received_at;
        self.accumulated.poll_duration = poll_duration;

        ticker
    }

    /// 지금까지 누적된 스냅샷.
    pub fn accumulated(&self) -> &Ticker {
        &self.accumulated
    }

    /// 누적 상태 초기화.
    pub fn reset(&mut self) {
        self.accumulated = Ticker::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use quotecast_core::{metric_name, MetricValue};

    fn base() -> Ticker {
        Ticker::from_metrics(
            &[
                Metric::new("A", metric_name::LAST_PRICE, 10.0),
                Metric::new("A", metric_name::BID_PRICE, 9.5),
                Metric::new("B", metric_name::LAST_PRICE, 20.0),
            ],
            Utc::now(),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_overwrite_keeps_untouched_instruments() {
        let merged = merge(
            &base(),
            &[Metric::new("A", metric_name::LAST_PRICE, 11.0)],
            MergeMode::Overwrite,
        );

        assert_eq!(merged.get("A", metric_name::LAST_PRICE), Some(&MetricValue::Number(11.0)));
        assert_eq!(merged.get("A", metric_name::BID_PRICE), Some(&MetricValue::Number(9.5)));
        assert_eq!(merged.get("B", metric_name::LAST_PRICE), Some(&MetricValue::Number(20.0)));
    }

    #[test]
    fn test_fill_only_fills_delta_instruments() {
        let merged = merge(
            &base(),
            &[Metric::new("A", metric_name::LAST_PRICE, 11.0)],
            MergeMode::FillOnly,
        );

        assert_eq!(merged.get("A", metric_name::LAST_PRICE), Some(&MetricValue::Number(11.0)));
        assert_eq!(merged.get("A", metric_name::BID_PRICE), Some(&MetricValue::Number(9.5)));
        assert!(merged.instrument("B").is_none());
    }

    #[test]
    fn test_fill_only_with_empty_delta_is_empty() {
        let merged = merge(&base(), &[], MergeMode::FillOnly);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_builder_without_fill_na_returns_raw_delta() {
        let mut builder = TickerBuilder::new(false);
        builder.build(
            &[
                Metric::new("A", metric_name::LAST_PRICE, 10.0),
                Metric::new("A", metric_name::ASK_PRICE, 10.5),
            ],
            Utc::now(),
            Duration::from_millis(10),
        );

        let ticker = builder.build(
            &[Metric::new("A", metric_name::LAST_PRICE, 10.2)],
            Utc::now(),
            Duration::from_millis(12),
        );

        assert_eq!(ticker.metric_count(), 1);
        assert_eq!(ticker.poll_duration, Duration::from_millis(12));
        assert_eq!(builder.accumulated().metric_count(), 2);
        assert_eq!(
            builder.accumulated().get("A", metric_name::LAST_PRICE),
            Some(&MetricValue::Number(10.2))
        );
    }

    #[test]
    fn test_builder_with_fill_na() {
        let mut builder = TickerBuilder::new(true);
        builder.build(
            &[
                Metric::new("A", metric_name::LAST_PRICE, 10.0),
                Metric::new("A", metric_name::ASK_PRICE, 10.5),
            ],
            Utc::now(),
            Duration::ZERO,
        );

        let ticker = builder.build(
            &[Metric::new("A", metric_name::LAST_PRICE, 10.2)],
            Utc::now(),
            Duration::ZERO,
        );

        assert_eq!(ticker.get("A", metric_name::LAST_PRICE), Some(&MetricValue::Number(10.2)));
        assert_eq!(ticker.get("A", metric_name::ASK_PRICE), Some(&MetricValue::Number(10.5)));
    }

    #[test]
    fn test_builder_reset() {
        let mut builder = TickerBuilder::new(true);
        builder.build(
            &[Metric::new("A", metric_name::LAST_PRICE, 1.0)],
            Utc::now(),
            Duration::ZERO,
        );
        builder.reset();
        assert!(builder.accumulated().is_empty());
    }

    fn metric_strategy() -> impl Strategy<Value = Metric> {
        (
            prop::sample::select(vec!["A", "B", "C"]),
            prop::sample::select(vec![
                metric_name::LAST_PRICE,
                metric_name::BID_PRICE,
                metric_name::ASK_PRICE,
                metric_name::LAST_TIME,
            ]),
            -1000i32..1000,
        )
            .prop_map(|(instrument, metric, value)| {
                Metric::new(instrument, metric, f64::from(value) / 4.0)
            })
    }

    proptest! {
        #[test]
        fn prop_overwrite_is_idempotent(
            seed in prop::collection::vec(metric_strategy(), 0..20),
            delta in prop::collection::vec(metric_strategy(), 0..20),
        ) {
            let accumulated = Ticker::from_metrics(&seed, Utc::now(), Duration::ZERO);
            let once = merge(&accumulated, &delta, MergeMode::Overwrite);
            let twice = merge(&once, &delta, MergeMode::Overwrite);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_fill_only_introduces_no_new_names(
            seed in prop::collection::vec(metric_strategy(), 0..20),
            delta in prop::collection::vec(metric_strategy(), 0..20),
        ) {
            let accumulated = Ticker::from_metrics(&seed, Utc::now(), Duration::ZERO);
            let merged = merge(&accumulated, &delta, MergeMode::FillOnly);

            for metric in merged.to_metrics() {
                let in_delta = delta.iter().any(|d| d.key() == metric.key());
                let in_accumulated = accumulated
                    .get(&metric.instrument_id, &metric.metric_name)
                    .is_some();
                prop_assert!(in_delta || in_accumulated);
                prop_assert!(delta.iter().any(|d| d.instrument_id == metric.instrument_id));
            }
        }

        #[test]
        fn prop_delta_always_wins(
            seed in prop::collection::vec(metric_strategy(), 0..20),
            delta in prop::collection::vec(metric_strategy(), 1..20),
        ) {
            let accumulated = Ticker::from_metrics(&seed, Utc::now(), Duration::ZERO);
            let expected = Ticker::from_metrics(&delta, Utc::now(), Duration::ZERO);

            for mode in [MergeMode::Overwrite, MergeMode::FillOnly] {
                let merged = merge(&accumulated, &delta, mode);
                for metric in expected.to_metrics() {
                    prop_assert_eq!(
                        merged.get(&metric.instrument_id, &metric.metric_name),
                        Some(&metric.value)
                    );
                }
            }
        }
    }
}
