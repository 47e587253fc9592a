//! 구독 제어 페이로드 인코딩과 구독 집합 관리.

use std::collections::{BTreeMap, BTreeSet};

use quotecast_core::MetricKey;
use serde::Serialize;

use crate::message::tag;

/// 종목 ID → 지표명 집합. 정렬된 컨테이너라 인코딩 결과가 항상 같습니다.
pub type MetricSelection = BTreeMap<String, BTreeSet<String>>;

/// 구독 제어 요청 본문.
#[derive(Debug, Serialize)]
struct ControlRequest {
    #[serde(rename = "controlData")]
    control_data: String,
}

fn push_clauses(out: &mut String, action: &str, selection: &MetricSelection) {
    for (instrument_id, metrics) in selection {
        for metric_name in metrics {
            out.push_str(action);
            out.push('(');
            out.push_str(instrument_id);
            out.push('.');
            out.push_str(metric_name);
            out.push_str(");");
        }
    }
}

/// 구독/해제 목록을 제어 페이로드로 인코딩합니다.
///
/// 모든 `a_req` 절이 모든 `a_rel` 절보다 앞에 오며, 각 절은 `;`로 끝납니다.
///
/// ```
/// use std::collections::{BTreeMap, BTreeSet};
/// use quotecast_stream::encode;
///
/// let subscribe = BTreeMap::from([("A".to_string(), BTreeSet::from(["P1".to_string()]))]);
/// let unsubscribe = BTreeMap::from([("B".to_string(), BTreeSet::from(["P2".to_string()]))]);
/// assert_eq!(
///     encode(&subscribe, &unsubscribe),
///     r#"{"controlData":"a_req(A.P1);a_rel(B.P2);"}"#
/// );
/// ```
pub fn encode(subscriptions: &MetricSelection, unsubscriptions: &MetricSelection) -> String {
    let mut control_data = String::new();
    push_clauses(&mut control_data, tag::REGISTRATION, subscriptions);
    push_clauses(&mut control_data, tag::UNREGISTRATION, unsubscriptions);

    serde_json::to_string(&ControlRequest { control_data }).unwrap_or_default()
}

/// 구독 변경 요청 빌더.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRequest {
    subscriptions: MetricSelection,
    unsubscriptions: MetricSelection,
}

impl SubscriptionRequest {
    /// 빈 요청 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 종목의 지표들을 구독 목록에 추가.
    pub fn subscribe<I, S>(mut self, instrument_id: impl Into<String>, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subscriptions
            .entry(instrument_id.into())
            .or_default()
            .extend(metrics.into_iter().map(Into::into));
        self
    }

    /// 종목의 지표들을 해제 목록에 추가.
    pub fn unsubscribe<I, S>(mut self, instrument_id: impl Into<String>, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unsubscriptions
            .entry(instrument_id.into())
            .or_default()
            .extend(metrics.into_iter().map(Into::into));
        self
    }

    /// 구독 목록.
    pub fn subscriptions(&self) -> &MetricSelection {
        &self.subscriptions
    }

    /// 해제 목록.
    pub fn unsubscriptions(&self) -> &MetricSelection {
        &self.unsubscriptions
    }

    /// 보낼 절이 하나도 없는지 확인.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.values().all(BTreeSet::is_empty)
            && self.unsubscriptions.values().all(BTreeSet::is_empty)
    }

    /// 제어 페이로드로 인코딩.
    pub fn encode(&self) -> String {
        encode(&self.subscriptions, &self.unsubscriptions)
    }
}

/// 현재 유지하려는 구독 집합.
///
/// 세션이 재설정되면 서버 쪽 구독이 모두 사라지므로 이 집합 전체를 다시 구독합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionSet {
    active: MetricSelection,
}

impl SubscriptionSet {
    /// 빈 집합 생성.
    pub fn new() -> Self {
        Self::default()
    }

    /// 요청을 반영합니다. 구독을 먼저 더하고 해제를 나중에 뺍니다.
    pub fn apply(&mut self, request: &SubscriptionRequest) {
        for (instrument_id, metrics) in &request.subscriptions {
            if metrics.is_empty() {
                continue;
            }
            self.active
                .entry(instrument_id.clone())
                .or_default()
                .extend(metrics.iter().cloned());
        }
        for (instrument_id, metrics) in &request.unsubscriptions {
            if let Some(active) = self.active.get_mut(instrument_id) {
                for metric_name in metrics {
                    active.remove(metric_name);
                }
                if active.is_empty() {
                    self.active.remove(instrument_id);
                }
            }
        }
    }

    /// 전체 재구독 요청.
    pub fn full_request(&self) -> SubscriptionRequest {
        SubscriptionRequest {
            subscriptions: self.active.clone(),
            unsubscriptions: MetricSelection::new(),
        }
    }

    /// 특정 (종목, 지표)를 구독 중인지 확인.
    pub fn contains(&self, key: &MetricKey) -> bool {
        self.active
            .get(&key.instrument_id)
            .is_some_and(|metrics| metrics.contains(&key.metric_name))
    }

    /// 구독 중인 (종목, 지표) 수.
    pub fn len(&self) -> usize {
        self.active.values().map(BTreeSet::len).sum()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// 구독 중인 키 목록.
    pub fn keys(&self) -> impl Iterator<Item = MetricKey> + '_ {
        self.active.iter().flat_map(|(instrument_id, metrics)| {
            metrics
                .iter()
                .map(move |metric_name| MetricKey::new(instrument_id.clone(), metric_name.clone()))
        })
    }
}
