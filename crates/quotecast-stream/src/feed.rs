//! 시세 피드 폴링 루프.
//!
//! 세션 발급 → 구독 → 반복 폴링 순으로 동작하며, 폴링 결과를 디코딩하고 참조를
//! 해석해 [`Ticker`]로 내보냅니다. 한 번에 하나의 폴링만 진행합니다.
//!
//! 세션이 만료되면(서버의 `sr` 신호, 타임아웃, 401/403) 새 세션을 발급받고 참조
//! 테이블을 비운 뒤 원하는 구독 전체를 다시 보냅니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use quotecast_core::{poll_span, FeedConfig, Ticker};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn, Instrument};

use crate::codec::{decode, DecodeError};
use crate::connection::ConnectionState;
use crate::error::{StreamError, StreamResult};
use crate::reference::ReferenceTable;
use crate::subscription::{SubscriptionRequest, SubscriptionSet};
use crate::ticker::TickerBuilder;
use crate::transport::QuoteTransport;

/// 피드가 내보내는 이벤트.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// 폴링 한 회차의 스냅샷
    Ticker(Ticker),
    /// 서버가 구독을 거부함
    Rejected(String),
    /// 폴링 결과를 버린 에러 (루프는 계속됨)
    Error(String),
    /// 새 세션으로 재연결하고 전체 재구독함
    Reconnected,
}

/// 시세 피드.
pub struct QuoteFeed<T: QuoteTransport> {
    transport: T,
    connection: Arc<ConnectionState>,
    config: FeedConfig,
    references: ReferenceTable,
    builder: TickerBuilder,
    subscriptions: SubscriptionSet,
    poll_count: u64,
}

impl<T: QuoteTransport> QuoteFeed<T> {
    /// 새 피드 생성.
    pub fn new(transport: T, connection: Arc<ConnectionState>, config: FeedConfig) -> Self {
        let references = ReferenceTable::new().with_policy(config.inconsistency_policy);
        let builder = TickerBuilder::new(config.fill_na);

        Self {
            transport,
            connection,
            config,
            references,
            builder,
            subscriptions: SubscriptionSet::new(),
            poll_count: 0,
        }
    }

    /// 전송 계층.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// 공유 연결 상태.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    /// 현재 유지하려는 구독 집합.
    pub fn subscriptions(&self) -> &SubscriptionSet {
        &self.subscriptions
    }

    /// 참조 테이블.
    pub fn references(&self) -> &ReferenceTable {
        &self.references
    }

    /// 누적 스냅샷.
    pub fn accumulated(&self) -> &Ticker {
        self.builder.accumulated()
    }

    /// 완료한 폴링 횟수.
    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    /// 새 세션을 발급받고 구독 전체를 다시 보냅니다.
    ///
    /// 새 세션에서는 이전 참조 번호가 무의미하므로 참조 테이블을 비웁니다.
    ///
    /// # Errors
    /// 설정이 잘못되었으면 요청 없이 [`StreamError::Core`]를 반환합니다.
    pub async fn connect(&mut self) -> StreamResult<()> {
        self.config.validate()?;

        let session_id = match self.transport.request_session().await {
            Ok(session_id) => session_id,
            Err(e) => {
                self.connection.clear();
                return Err(e);
            }
        };
        self.connection.set_session_id(session_id.clone());
        self.references.reset();

        if !self.subscriptions.is_empty() {
            let payload = self.subscriptions.full_request().encode();
            self.transport.subscribe(&session_id, &payload).await?;
            info!(
                session = %quotecast_core::session_prefix(&session_id),
                metrics = self.subscriptions.len(),
                "Resubscribed"
            );
        }

        Ok(())
    }

    /// 구독 변경.
    ///
    /// 요청은 항상 구독 집합에 반영됩니다. 세션이 없거나 만료되었으면 전송은
    /// 다음 연결 때 전체 재구독으로 대신합니다.
    pub async fn subscribe(&mut self, request: SubscriptionRequest) -> StreamResult<()> {
        if request.is_empty() {
            return Ok(());
        }
        self.subscriptions.apply(&request);

        let session_id = match self.connection.read_session_id() {
            Ok(session_id) => session_id,
            Err(e) => {
                debug!("Subscription queued until next session: {}", e);
                return Ok(());
            }
        };

        self.transport
            .subscribe(&session_id, &request.encode())
            .await
    }

    /// 한 번 폴링해 스냅샷을 만듭니다.
    ///
    /// # Errors
    ///
    /// - 세션이 없거나 만료되었으면 [`StreamError::Connection`]
    /// - 서버가 세션 무효를 알리면 [`DecodeError::SessionExpired`] (연결 상태도 만료 처리)
    /// - 응답 형식 오류, 참조 불일치, 전송 에러
    pub async fn poll(&mut self) -> StreamResult<Ticker> {
        let session_id = self.connection.read_session_id()?;
        let span = poll_span!("quote_poll", session_id, self.poll_count + 1);
        self.poll_session(&session_id).instrument(span).await
    }

    async fn poll_session(&mut self, session_id: &str) -> StreamResult<Ticker> {
        let started = Instant::now();
        let raw = self.transport.poll(session_id).await?;
        let poll_duration = started.elapsed();
        self.poll_count += 1;

        let messages = match decode(&raw) {
            Ok(messages) => messages,
            Err(DecodeError::SessionExpired) => {
                self.connection.mark_expired();
                return Err(DecodeError::SessionExpired.into());
            }
            Err(e) => return Err(e.into()),
        };

        let metrics = self.references.apply(&messages)?;
        debug!(
            messages = messages.len(),
            metrics = metrics.len(),
            elapsed_ms = poll_duration.as_millis() as u64,
            "Poll decoded"
        );

        Ok(self.builder.build(&metrics, Utc::now(), poll_duration))
    }

    /// 재연결. 설정된 최대 횟수까지 시도합니다.
    pub async fn reconnect(&mut self) -> StreamResult<()> {
        let max_attempts = self.config.max_reconnect_attempts.max(1);
        let mut attempts = 0;

        loop {
            match self.connect().await {
                Ok(()) => return Ok(()),
                Err(e @ StreamError::Core(_)) => {
                    error!("재연결 불가, 설정 오류: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    attempts += 1;
                    if attempts >= max_attempts {
                        error!("최대 재연결 시도 횟수 초과 ({}회): {}", max_attempts, e);
                        return Err(e);
                    }

                    warn!(
                        "{}초 후 재연결 시도 ({}/{}): {}",
                        self.config.reconnect_delay_secs, attempts, max_attempts, e
                    );
                    tokio::time::sleep(self.config.reconnect_delay()).await;
                }
            }
        }
    }

    /// 이벤트 채널로 스냅샷을 계속 내보냅니다.
    ///
    /// 수신측이 닫히면 정상 종료하고, 재연결 실패나 참조 불일치처럼 복구할 수 없는
    /// 에러는 반환합니다. 별도 태스크에서 실행하세요.
    pub async fn run(self, events: mpsc::Sender<FeedEvent>) -> StreamResult<()> {
        self.run_loop(events, None).await
    }

    /// [`run`](Self::run)과 같지만 폴링 사이에 구독 변경 요청을 받아 처리합니다.
    pub async fn run_with_requests(
        self,
        events: mpsc::Sender<FeedEvent>,
        requests: mpsc::Receiver<SubscriptionRequest>,
    ) -> StreamResult<()> {
        self.run_loop(events, Some(requests)).await
    }

    async fn run_loop(
        mut self,
        events: mpsc::Sender<FeedEvent>,
        mut requests: Option<mpsc::Receiver<SubscriptionRequest>>,
    ) -> StreamResult<()> {
        if !self.connection.is_connected() {
            self.reconnect().await?;
        }

        loop {
            if events.is_closed() {
                info!(polls = self.poll_count, "Feed receiver dropped, stopping");
                return Ok(());
            }

            if let Some(rx) = requests.as_mut() {
                while let Ok(request) = rx.try_recv() {
                    if let Err(e) = self.subscribe(request).await {
                        warn!("Subscription change failed: {}", e);
                        if events.send(FeedEvent::Error(e.to_string())).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }

            let event = match self.poll().await {
                Ok(ticker) => FeedEvent::Ticker(ticker),
                Err(e) if e.requires_reauth() => {
                    warn!("Session lost, reconnecting: {}", e);
                    self.reconnect().await?;
                    FeedEvent::Reconnected
                }
                Err(StreamError::Decode(DecodeError::SubscriptionRejected(detail))) => {
                    warn!("Subscription rejected: {}", detail);
                    FeedEvent::Rejected(detail)
                }
                Err(e) if e.is_protocol_violation() => {
                    error!("Reference table out of sync: {}", e);
                    let _ = events.send(FeedEvent::Error(e.to_string())).await;
                    return Err(e);
                }
                Err(e) => {
                    warn!("Poll discarded: {}", e);
                    if e.is_retryable() {
                        if let Some(delay) = e.retry_delay_ms() {
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                    }
                    FeedEvent::Error(e.to_string())
                }
            };

            if events.send(event).await.is_err() {
                info!(polls = self.poll_count, "Feed receiver dropped, stopping");
                return Ok(());
            }

            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }
}
