//! 세션 연결 상태.
//!
//! 서버는 일정 시간 동안 성공한 요청이 없으면 세션을 조용히 폐기합니다. 클라이언트는
//! 마지막 성공 응답 시각을 기록해 두었다가, 세션 ID를 읽을 때 타임아웃이 지났으면
//! 만료로 판정합니다.
//!
//! # 상태 전이
//!
//! ```text
//! Unauthenticated ──[set_session_id(id)]──> Authenticated
//!        ↑                                       │
//!        │                       [read 시 now - last_success > timeout]
//!        │                                       ↓
//!        └────────[set_session_id("")]────── Expired
//! ```
//!
//! 만료된 세션은 새 `set_session_id`가 있을 때까지 계속 `Expired`를 반환합니다.
//!
//! 시간은 벽시계가 아닌 단조 시계(`Instant`)로 잽니다. 테스트에서는 [`ManualClock`]으로
//! 시간을 직접 진행시킬 수 있습니다.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use quotecast_core::{DEFAULT_QUOTE_SESSION_TIMEOUT_SECS, DEFAULT_TRADING_SESSION_TIMEOUT_SECS};
use tracing::{debug, info, warn};

/// 시세 피드 세션 기본 타임아웃.
pub const DEFAULT_QUOTE_TIMEOUT: Duration = Duration::from_secs(DEFAULT_QUOTE_SESSION_TIMEOUT_SECS);

/// 트레이딩 API 세션 기본 타임아웃.
pub const DEFAULT_TRADING_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_TRADING_SESSION_TIMEOUT_SECS);

/// 단조 시계.
pub trait Clock: Send + Sync {
    /// 현재 시각.
    fn now(&self) -> Instant;
}

/// 시스템 단조 시계.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// 수동으로 진행시키는 시계 (테스트용).
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// 현재 시각에서 시작하는 시계 생성.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// 시간을 진행.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// 세션 ID 조회 에러.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// 세션이 설정되지 않음
    #[error("Not connected: no session established")]
    NotConnected,

    /// 타임아웃 경과로 세션 만료
    #[error("Session expired: {elapsed:?} since last successful response (timeout {timeout:?})")]
    Expired { elapsed: Duration, timeout: Duration },
}

#[derive(Debug)]
struct Inner {
    session_id: String,
    connected: bool,
    last_success_at: Option<Instant>,
}

/// 스레드 간 공유되는 세션 상태.
///
/// 모든 필드는 하나의 락 아래 있으므로 세션 ID와 성공 시각이 서로 어긋난 상태로
/// 관찰되지 않습니다.
pub struct ConnectionState {
    inner: Mutex<Inner>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("ConnectionState")
            .field("connected", &inner.connected)
            .field("has_session", &!inner.session_id.is_empty())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectionState {
    /// 시스템 시계를 쓰는 상태 생성.
    pub fn new(timeout: Duration) -> Self {
        Self::with_clock(timeout, Arc::new(MonotonicClock))
    }

    /// 시계를 지정해 생성.
    pub fn with_clock(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                session_id: String::new(),
                connected: false,
                last_success_at: None,
            }),
            timeout,
            clock,
        }
    }

    // 상태는 단순 데이터라 다른 스레드가 패닉해도 그대로 이어서 쓸 수 있습니다.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 세션 ID 설정. 빈 문자열이면 미인증 상태로 돌아갑니다.
    ///
    /// 새 세션은 핸드셰이크 자체가 성공 응답이므로 성공 시각도 지금으로 기록합니다.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        let session_id = session_id.into();
        let now = self.clock.now();
        let mut inner = self.lock();

        if session_id.is_empty() {
            inner.connected = false;
            inner.last_success_at = None;
            debug!("Session cleared");
        } else {
            inner.connected = true;
            inner.last_success_at = Some(now);
            info!(
                session = %quotecast_core::session_prefix(&session_id),
                "Session established"
            );
        }
        inner.session_id = session_id;
    }

    /// 로그아웃.
    pub fn clear(&self) {
        self.set_session_id(String::new());
    }

    /// 유효한 세션 ID를 읽습니다.
    ///
    /// # Errors
    ///
    /// - 세션이 없으면 [`ConnectionError::NotConnected`]
    /// - 마지막 성공 응답 이후 타임아웃이 지났거나 이미 만료된 세션이면
    ///   [`ConnectionError::Expired`]
    pub fn read_session_id(&self) -> Result<String, ConnectionError> {
        let now = self.clock.now();
        let mut inner = self.lock();

        if inner.session_id.is_empty() {
            return Err(ConnectionError::NotConnected);
        }

        let elapsed = inner
            .last_success_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or(Duration::MAX);

        if !inner.connected {
            return Err(ConnectionError::Expired {
                elapsed,
                timeout: self.timeout,
            });
        }

        if elapsed > self.timeout {
            inner.connected = false;
            warn!(
                session = %quotecast_core::session_prefix(&inner.session_id),
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                "Session expired"
            );
            return Err(ConnectionError::Expired {
                elapsed,
                timeout: self.timeout,
            });
        }

        Ok(inner.session_id.clone())
    }

    /// HTTP 응답 관찰. 2xx이고 기록된 시각보다 새로울 때만 성공 시각을 갱신합니다.
    ///
    /// 만료된 세션을 되살리지는 않습니다.
    pub fn observe_response(&self, status: u16, at: Instant) {
        if !(200..300).contains(&status) {
            return;
        }

        let mut inner = self.lock();
        match inner.last_success_at {
            Some(previous) if previous >= at => {}
            _ => inner.last_success_at = Some(at),
        }
    }

    /// 서버가 세션 무효를 알렸을 때 즉시 만료 처리.
    pub fn mark_expired(&self) {
        let mut inner = self.lock();
        if inner.connected {
            inner.connected = false;
            warn!(
                session = %quotecast_core::session_prefix(&inner.session_id),
                "Session invalidated by server"
            );
        }
    }

    /// 연결 상태 (세션이 있고 아직 만료 판정되지 않음).
    pub fn is_connected(&self) -> bool {
        let inner = self.lock();
        inner.connected && !inner.session_id.is_empty()
    }

    /// 세션 타임아웃.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 현재 시각 (상태가 쓰는 시계 기준).
    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// 마지막 성공 응답 시각.
    pub fn last_success_at(&self) -> Option<Instant> {
        self.lock().last_success_at
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(DEFAULT_QUOTE_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn manual_state(timeout: Duration) -> (ConnectionState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let state = ConnectionState::with_clock(timeout, clock.clone());
        (state, clock)
    }

    #[test]
    fn test_default_timeouts() {
        assert_eq!(DEFAULT_QUOTE_TIMEOUT, Duration::from_secs(15));
        assert_eq!(DEFAULT_TRADING_TIMEOUT, Duration::from_secs(1800));
        assert_eq!(ConnectionState::default().timeout(), DEFAULT_QUOTE_TIMEOUT);
    }

    #[test]
    fn test_not_connected_initially() {
        let state = ConnectionState::new(DEFAULT_QUOTE_TIMEOUT);
        assert!(!state.is_connected());
        assert_eq!(state.read_session_id(), Err(ConnectionError::NotConnected));
    }

    #[test]
    fn test_read_after_set() {
        let (state, _clock) = manual_state(Duration::from_secs(15));
        state.set_session_id("X");

        assert!(state.is_connected());
        assert_eq!(state.read_session_id().unwrap(), "X");
    }

    #[test]
    fn test_expires_after_timeout() {
        let (state, clock) = manual_state(Duration::from_secs(15));
        state.set_session_id("X");

        clock.advance(Duration::from_secs(15));
        assert!(state.read_session_id().is_ok(), "exactly at timeout is still valid");

        clock.advance(Duration::from_millis(1));
        assert!(matches!(
            state.read_session_id(),
            Err(ConnectionError::Expired { .. })
        ));
        assert!(!state.is_connected());
    }

    #[test]
    fn test_expired_stays_expired() {
        let (state, clock) = manual_state(Duration::from_secs(15));
        state.set_session_id("X");
        clock.advance(Duration::from_secs(16));
        assert!(state.read_session_id().is_err());

        // 성공 응답이 와도 만료된 세션은 되살아나지 않음
        state.observe_response(200, state.now());
        assert!(matches!(
            state.read_session_id(),
            Err(ConnectionError::Expired { .. })
        ));

        state.set_session_id("Y");
        assert_eq!(state.read_session_id().unwrap(), "Y");
    }

    #[test]
    fn test_observe_response_extends_session() {
        let (state, clock) = manual_state(Duration::from_secs(15));
        state.set_session_id("X");

        for _ in 0..4 {
            clock.advance(Duration::from_secs(10));
            state.observe_response(200, state.now());
        }
        assert_eq!(state.read_session_id().unwrap(), "X");
    }

    #[test]
    fn test_observe_response_ignores_failures_and_stale_times() {
        let (state, clock) = manual_state(Duration::from_secs(15));
        state.set_session_id("X");
        let stamped = state.last_success_at().unwrap();

        clock.advance(Duration::from_secs(5));
        state.observe_response(500, state.now());
        state.observe_response(401, state.now());
        assert_eq!(state.last_success_at(), Some(stamped));

        let later = state.now();
        state.observe_response(204, later);
        state.observe_response(200, stamped);
        assert_eq!(state.last_success_at(), Some(later));
    }

    #[test]
    fn test_clear_and_empty_session() {
        let (state, _clock) = manual_state(Duration::from_secs(15));
        state.set_session_id("X");
        state.clear();

        assert!(!state.is_connected());
        assert!(state.last_success_at().is_none());
        assert_eq!(state.read_session_id(), Err(ConnectionError::NotConnected));
    }

    #[test]
    fn test_mark_expired() {
        let (state, _clock) = manual_state(Duration::from_secs(15));
        state.set_session_id("X");
        state.mark_expired();

        assert!(!state.is_connected());
        assert!(matches!(
            state.read_session_id(),
            Err(ConnectionError::Expired { .. })
        ));
    }

    #[test]
    fn test_concurrent_observers() {
        let (state, clock) = manual_state(Duration::from_secs(15));
        let state = Arc::new(state);
        state.set_session_id("concurrent-session");
        clock.advance(Duration::from_secs(10));
        let latest = state.now();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..100 {
                        state.observe_response(200, latest);
                        if i % 2 == 0 {
                            let _ = state.read_session_id();
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.last_success_at(), Some(latest));
        assert_eq!(state.read_session_id().unwrap(), "concurrent-session");
    }

    #[test]
    fn test_readers_never_see_partial_session_during_rotation() {
        const SESSIONS: [&str; 2] = ["session-alpha", "session-beta"];

        let (state, _clock) = manual_state(Duration::from_secs(15));
        let state = Arc::new(state);
        state.set_session_id(SESSIONS[0]);

        let writer = {
            let state = Arc::clone(&state);
            thread::spawn(move || {
                for i in 0..500 {
                    if i % 50 == 49 {
                        state.mark_expired();
                    } else {
                        state.set_session_id(SESSIONS[i % 2]);
                    }
                    state.observe_response(200, state.now());
                }
                state.set_session_id(SESSIONS[1]);
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..500 {
                        match state.read_session_id() {
                            Ok(id) => {
                                assert!(SESSIONS.contains(&id.as_str()), "torn id: {}", id)
                            }
                            Err(ConnectionError::NotConnected)
                            | Err(ConnectionError::Expired { .. }) => {}
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(state.read_session_id().unwrap(), SESSIONS[1]);
    }
}
