//! 롱폴링 HTTP 전송 계층.
//!
//! 세션 발급, 구독 제어, 폴링 세 가지 요청만 사용합니다.
//!
//! - `POST {base}/request_session?version=..&userToken=..` (본문 `{"referrer": ..}`) → `{"sessionId": ..}`
//! - `POST {base}/{session_id}` (본문은 구독 제어 페이로드)
//! - `GET {base}/{session_id}` → 메시지 레코드 배열

use std::sync::Arc;

use async_trait::async_trait;
use quotecast_core::FeedConfig;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::connection::ConnectionState;
use crate::error::{StreamError, StreamResult};

/// 시세 서버와의 요청/응답 전송 추상화.
///
/// 테스트에서는 응답을 미리 정해 둔 구현으로 바꿔 끼웁니다.
#[async_trait]
pub trait QuoteTransport: Send + Sync {
    /// 새 세션 발급. 세션 ID를 반환합니다.
    async fn request_session(&self) -> StreamResult<String>;

    /// 구독 제어 페이로드 전송.
    async fn subscribe(&self, session_id: &str, payload: &str) -> StreamResult<()>;

    /// 한 번 폴링하고 응답 본문을 그대로 반환.
    async fn poll(&self, session_id: &str) -> StreamResult<String>;
}

#[derive(Debug, Serialize)]
struct SessionRequest<'a> {
    referrer: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
}

/// reqwest 기반 전송 구현.
///
/// 모든 응답의 상태 코드를 [`ConnectionState::observe_response`]에 알려
/// 세션 유휴 타이머를 갱신합니다.
pub struct HttpTransport {
    config: FeedConfig,
    client: Client,
    user_token: SecretString,
    connection: Arc<ConnectionState>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.config.base_url)
            .field("user_token", &"[REDACTED]")
            .finish()
    }
}

impl HttpTransport {
    /// 새 전송 계층 생성.
    ///
    /// # Errors
    /// HTTP 클라이언트 생성에 실패하면 `StreamError::Network`를 반환합니다.
    pub fn new(
        config: FeedConfig,
        user_token: impl Into<String>,
        connection: Arc<ConnectionState>,
    ) -> StreamResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| StreamError::Network(format!("HTTP client 생성 실패: {}", e)))?;

        Ok(Self {
            config,
            client,
            user_token: SecretString::new(user_token.into().into()),
            connection,
        })
    }

    /// 공유 연결 상태.
    pub fn connection(&self) -> &Arc<ConnectionState> {
        &self.connection
    }

    /// 피드 설정.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/{}", self.base_url(), session_id)
    }

    fn session_request(&self) -> RequestBuilder {
        self.client
            .post(format!("{}/request_session", self.base_url()))
            .query(&[
                ("version", self.config.client_version.as_str()),
                ("userToken", self.user_token.expose_secret()),
            ])
            .json(&SessionRequest {
                referrer: &self.config.referrer,
            })
    }

    fn subscribe_request(&self, session_id: &str, payload: &str) -> RequestBuilder {
        self.client
            .post(self.session_url(session_id))
            .header("Content-Type", "application/json; charset=utf-8")
            .body(payload.to_string())
    }

    fn poll_request(&self, session_id: &str) -> RequestBuilder {
        self.client.get(self.session_url(session_id))
    }

    /// 요청을 보내고 본문을 반환합니다. 상태 코드는 성공 여부와 관계없이 연결 상태에 기록됩니다.
    async fn execute(&self, request: RequestBuilder) -> StreamResult<String> {
        let response: Response = request.send().await?;
        let status = response.status();
        // 만료 판정과 같은 시계로 기록해야 함
        self.connection
            .observe_response(status.as_u16(), self.connection.now());

        let body = response.text().await?;
        if !status.is_success() {
            error!(status = status.as_u16(), "Quote request failed: {}", body);
            return Err(StreamError::Http {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl QuoteTransport for HttpTransport {
    async fn request_session(&self) -> StreamResult<String> {
        info!(
            version = %self.config.client_version,
            "Requesting new quote session..."
        );

        let body = self.execute(self.session_request()).await?;
        let response: SessionResponse = serde_json::from_str(&body).map_err(|e| {
            StreamError::Parse(format!("Failed to parse session response: {}", e))
        })?;

        if response.session_id.is_empty() {
            return Err(StreamError::Parse(
                "Session response contained an empty sessionId".to_string(),
            ));
        }

        Ok(response.session_id)
    }

    async fn subscribe(&self, session_id: &str, payload: &str) -> StreamResult<()> {
        debug!(
            session = %quotecast_core::session_prefix(session_id),
            payload,
            "Sending subscription control"
        );
        self.execute(self.subscribe_request(session_id, payload))
            .await?;
        Ok(())
    }

    async fn poll(&self, session_id: &str) -> StreamResult<String> {
        self.execute(self.poll_request(session_id)).await
    }
}
