//! 참조 테이블과 지표 해석기.
//!
//! 서버는 구독 직후 한 번만 `참조 → (종목, 지표)` 등록을 보내고, 이후 폴링에서는
//! 참조 번호로만 값을 보냅니다. 따라서 테이블은 폴링 한 번이 아니라 구독 세션
//! 전체 동안 유지되어야 하며, 세션이 만료되어 전체 재구독할 때만 비웁니다.
//!
//! 한 폴링 안에서는 등록이 항상 그 참조를 쓰는 값보다 먼저 오므로 왼쪽에서
//! 오른쪽으로 한 번 순회하면 됩니다.

use std::collections::HashMap;

use quotecast_core::{InconsistencyPolicy, Metric, MetricKey, MetricValue};
use tracing::{debug, trace, warn};

use crate::message::Message;

/// 참조 해석 에러. 클라이언트 테이블이 서버와 어긋났다는 뜻이라 로컬에서 복구할 수 없습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// 등록되지 않은 참조를 해제하려 함
    #[error("unregistration of unknown reference {reference}")]
    InconsistentUnregistration { reference: i64 },

    /// 등록되지 않은 참조의 값
    #[error("value for unknown reference {reference}")]
    UnknownReference { reference: i64 },
}

impl ResolutionError {
    /// 문제가 된 참조 번호.
    pub fn reference(&self) -> i64 {
        match self {
            ResolutionError::InconsistentUnregistration { reference }
            | ResolutionError::UnknownReference { reference } => *reference,
        }
    }
}

/// 참조 번호 → (종목, 지표) 테이블.
///
/// 폴링 루프 하나가 소유하며 스레드 간에 공유하지 않습니다.
#[derive(Debug, Default)]
pub struct ReferenceTable {
    entries: HashMap<i64, MetricKey>,
    policy: InconsistencyPolicy,
}

impl ReferenceTable {
    /// 빈 테이블 생성 (불일치 시 에러).
    pub fn new() -> Self {
        Self::default()
    }

    /// 불일치 처리 정책 지정.
    pub fn with_policy(mut self, policy: InconsistencyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 현재 정책.
    pub fn policy(&self) -> InconsistencyPolicy {
        self.policy
    }

    /// 한 폴링의 메시지를 순서대로 반영하고 값 메시지를 지표로 해석합니다.
    ///
    /// # Errors
    ///
    /// 정책이 [`InconsistencyPolicy::Fail`]이면 미등록 참조 해제/값에서 즉시 실패합니다.
    /// 실패 지점 이전의 등록/해제는 이미 테이블에 반영되어 있습니다.
    pub fn apply(&mut self, messages: &[Message]) -> Result<Vec<Metric>, ResolutionError> {
        let mut metrics = Vec::with_capacity(messages.iter().filter(|m| m.is_value()).count());

        for message in messages {
            match message {
                Message::Registration {
                    reference,
                    instrument_id,
                    metric_name,
                } => {
                    let key = MetricKey::new(instrument_id.clone(), metric_name.clone());
                    if let Some(previous) = self.entries.insert(*reference, key) {
                        debug!(reference, previous = %previous, "Reference re-registered");
                    } else {
                        trace!(reference, instrument = %instrument_id, metric = %metric_name, "Reference registered");
                    }
                }
                Message::Unregistration { reference, .. } => {
                    if self.entries.remove(reference).is_none() {
                        self.inconsistency(ResolutionError::InconsistentUnregistration {
                            reference: *reference,
                        })?;
                    }
                }
                Message::Numeric { reference, value } => {
                    if let Some(metric) =
                        self.resolve(*reference, MetricValue::Number(*value))?
                    {
                        metrics.push(metric);
                    }
                }
                Message::Text { reference, value } => {
                    if let Some(metric) =
                        self.resolve(*reference, MetricValue::Text(value.clone()))?
                    {
                        metrics.push(metric);
                    }
                }
                Message::Heartbeat | Message::Unavailable { .. } => {}
            }
        }

        Ok(metrics)
    }

    fn resolve(
        &self,
        reference: i64,
        value: MetricValue,
    ) -> Result<Option<Metric>, ResolutionError> {
        match self.entries.get(&reference) {
            Some(key) => Ok(Some(Metric::from_key(key, value))),
            None => {
                self.inconsistency(ResolutionError::UnknownReference { reference })?;
                Ok(None)
            }
        }
    }

    fn inconsistency(&self, error: ResolutionError) -> Result<(), ResolutionError> {
        match self.policy {
            InconsistencyPolicy::Fail => Err(error),
            InconsistencyPolicy::LogAndDrop => {
                warn!(reference = error.reference(), "Dropping message: {}", error);
                Ok(())
            }
        }
    }

    /// 참조가 가리키는 키.
    pub fn get(&self, reference: i64) -> Option<&MetricKey> {
        self.entries.get(&reference)
    }

    /// 등록된 참조 수.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지 확인.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 모든 참조 제거. 세션 만료 후 전체 재구독할 때 호출합니다.
    pub fn reset(&mut self) {
        if !self.entries.is_empty() {
            debug!(count = self.entries.len(), "Reference table reset");
        }
        self.entries.clear();
    }
}
