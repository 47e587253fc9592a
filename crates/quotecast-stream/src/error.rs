//! 스트림 에러 타입.

use quotecast_core::CoreError;
use thiserror::Error;

use crate::codec::DecodeError;
use crate::connection::ConnectionError;
use crate::reference::ResolutionError;

/// 시세 스트림 에러.
#[derive(Debug, Error)]
pub enum StreamError {
    /// 응답 디코딩 실패 (구독 거부, 세션 무효 포함)
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// 참조 테이블 불일치
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// 세션 없음/만료
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// 설정/직렬화 에러
    #[error(transparent)]
    Core(#[from] CoreError),

    /// 네트워크/연결 에러
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 2xx가 아닌 HTTP 응답
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// 응답 본문 파싱 에러
    #[error("Parse error: {0}")]
    Parse(String),
}

/// 스트림 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// 새 세션 핸드셰이크와 전체 재구독이 필요한 에러인지 확인.
    pub fn requires_reauth(&self) -> bool {
        match self {
            StreamError::Decode(err) => err.requires_reauth(),
            StreamError::Connection(_) => true,
            StreamError::Http { status, .. } => matches!(*status, 401 | 403),
            _ => false,
        }
    }

    /// 클라이언트 상태가 서버와 어긋난 프로토콜 위반인지 확인.
    ///
    /// 재시도로 해결되지 않으므로 상위로 그대로 전달해야 합니다.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, StreamError::Resolution(_))
    }

    /// 같은 세션으로 재시도 가능한 에러인지 확인.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Network(_) | StreamError::Timeout(_) => true,
            StreamError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// 권장 재시도 대기 시간(밀리초) 반환.
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            StreamError::Network(_) => Some(1000),
            StreamError::Timeout(_) => Some(500),
            StreamError::Http { status: 429, .. } => Some(60000), // 1분
            StreamError::Http { status, .. } if *status >= 500 => Some(2000),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StreamError::Timeout(err.to_string())
        } else if let Some(status) = err.status() {
            StreamError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            StreamError::Parse(err.to_string())
        } else {
            StreamError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Parse(err.to_string())
    }
}
