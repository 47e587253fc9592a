//! 설정 관리.
//!
//! 설정 파일(`config/default.toml`) + `QUOTECAST__` 접두사 환경 변수,
//! 또는 `.env`/환경 변수(`QUOTECAST_*`)만으로 피드 설정을 구성할 수 있습니다.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CoreError, CoreResult};

/// 시세 피드 세션 유휴 타임아웃 기본값 (초). 서버는 약 15초간 폴링이 없으면 세션을 폐기합니다.
pub const DEFAULT_QUOTE_SESSION_TIMEOUT_SECS: u64 = 15;

/// 트레이딩 API 세션 유휴 타임아웃 기본값 (초).
pub const DEFAULT_TRADING_SESSION_TIMEOUT_SECS: u64 = 30 * 60;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 시세 피드 설정
    #[serde(default)]
    pub feed: FeedConfig,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 로깅 설정 섹션.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 참조 테이블 불일치(미등록 참조 해제, 미등록 참조 값) 처리 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyPolicy {
    /// 즉시 에러 반환 (테이블이 서버와 어긋난 것으로 간주)
    #[default]
    Fail,
    /// 경고 로그를 남기고 해당 메시지만 버림
    LogAndDrop,
}

impl std::str::FromStr for InconsistencyPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "log_and_drop" | "drop" => Ok(Self::LogAndDrop),
            other => Err(CoreError::InvalidInput(format!(
                "unknown inconsistency policy: {}",
                other
            ))),
        }
    }
}

/// 시세 피드 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// 스트리밍 엔드포인트 기본 URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 세션 요청 시 전달하는 클라이언트 버전
    #[serde(default = "default_client_version")]
    pub client_version: String,
    /// 세션 요청 본문의 referrer
    #[serde(default = "default_referrer")]
    pub referrer: String,
    /// 마지막 성공 응답 이후 세션을 만료로 간주하는 시간 (초)
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
    /// 개별 HTTP 요청 타임아웃 (초)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 폴링 간 대기 시간 (밀리초)
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// 이번 폴링에 없는 지표를 이전 값으로 채울지 여부
    #[serde(default)]
    pub fill_na: bool,
    /// 세션 만료 시 최대 재연결 시도 횟수
    #[serde(default = "default_max_reconnect")]
    pub max_reconnect_attempts: u32,
    /// 재연결 대기 시간 (초)
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// 참조 테이블 불일치 처리 정책
    #[serde(default)]
    pub inconsistency_policy: InconsistencyPolicy,
}

fn default_base_url() -> String {
    "https://degiro.quotecast.vwdservices.com/CORS".to_string()
}
fn default_client_version() -> String {
    "1.0.20201211".to_string()
}
fn default_referrer() -> String {
    "https://trader.degiro.nl".to_string()
}
fn default_session_timeout() -> u64 {
    DEFAULT_QUOTE_SESSION_TIMEOUT_SECS
}
fn default_request_timeout() -> u64 {
    30
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_max_reconnect() -> u32 {
    3
}
fn default_reconnect_delay() -> u64 {
    5
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            client_version: default_client_version(),
            referrer: default_referrer(),
            session_timeout_secs: default_session_timeout(),
            request_timeout_secs: default_request_timeout(),
            poll_interval_ms: default_poll_interval(),
            fill_na: false,
            max_reconnect_attempts: default_max_reconnect(),
            reconnect_delay_secs: default_reconnect_delay(),
            inconsistency_policy: InconsistencyPolicy::Fail,
        }
    }
}

impl FeedConfig {
    /// 기본 URL 지정.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// forward-fill 여부 지정.
    pub fn with_fill_na(mut self, enabled: bool) -> Self {
        self.fill_na = enabled;
        self
    }

    /// 세션 타임아웃 지정.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout_secs = timeout.as_secs();
        self
    }

    /// 폴링 간격 지정.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    /// 재연결 정책 지정.
    pub fn with_reconnect(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay_secs = delay.as_secs();
        self
    }

    /// 불일치 처리 정책 지정.
    pub fn with_inconsistency_policy(mut self, policy: InconsistencyPolicy) -> Self {
        self.inconsistency_policy = policy;
        self
    }

    /// 세션 타임아웃.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// HTTP 요청 타임아웃.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// 폴링 간격.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// 재연결 대기 시간.
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// 설정값 검증.
    pub fn validate(&self) -> CoreResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(CoreError::Config("feed.base_url이 비어 있습니다".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(CoreError::Config(format!(
                "feed.base_url은 http(s) URL이어야 합니다: {}",
                self.base_url
            )));
        }
        if self.session_timeout_secs == 0 {
            return Err(CoreError::Config(
                "feed.session_timeout_secs는 0보다 커야 합니다".to_string(),
            ));
        }
        Ok(())
    }

    /// 환경 변수에서 설정 생성.
    ///
    /// # 환경 변수
    /// - `QUOTECAST_BASE_URL`, `QUOTECAST_CLIENT_VERSION`, `QUOTECAST_REFERRER`
    /// - `QUOTECAST_SESSION_TIMEOUT_SECS`, `QUOTECAST_REQUEST_TIMEOUT_SECS`
    /// - `QUOTECAST_POLL_INTERVAL_MS`, `QUOTECAST_FILL_NA`
    /// - `QUOTECAST_MAX_RECONNECT_ATTEMPTS`, `QUOTECAST_RECONNECT_DELAY_SECS`
    /// - `QUOTECAST_INCONSISTENCY_POLICY` ("fail" | "log_and_drop")
    pub fn from_env() -> CoreResult<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let inconsistency_policy = match std::env::var("QUOTECAST_INCONSISTENCY_POLICY") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.inconsistency_policy,
        };

        let config = Self {
            base_url: std::env::var("QUOTECAST_BASE_URL").unwrap_or(defaults.base_url),
            client_version: std::env::var("QUOTECAST_CLIENT_VERSION")
                .unwrap_or(defaults.client_version),
            referrer: std::env::var("QUOTECAST_REFERRER").unwrap_or(defaults.referrer),
            session_timeout_secs: env_var_parse(
                "QUOTECAST_SESSION_TIMEOUT_SECS",
                defaults.session_timeout_secs,
            ),
            request_timeout_secs: env_var_parse(
                "QUOTECAST_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
            poll_interval_ms: env_var_parse("QUOTECAST_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            fill_na: env_var_bool("QUOTECAST_FILL_NA", defaults.fill_na),
            max_reconnect_attempts: env_var_parse(
                "QUOTECAST_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            reconnect_delay_secs: env_var_parse(
                "QUOTECAST_RECONNECT_DELAY_SECS",
                defaults.reconnect_delay_secs,
            ),
            inconsistency_policy,
        };

        config.validate()?;
        Ok(config)
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 환경 변수는 `QUOTECAST__FEED__FILL_NA=true`처럼 `__`로 섹션을 구분합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("QUOTECAST")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.feed.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load("config/default.toml")
    }
}

fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_feed_config_defaults() {
        let config = FeedConfig::default();
        assert_eq!(config.session_timeout(), Duration::from_secs(15));
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert!(!config.fill_na);
        assert_eq!(config.inconsistency_policy, InconsistencyPolicy::Fail);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_feed_config_builder() {
        let config = FeedConfig::default()
            .with_base_url("http://localhost:8080/CORS")
            .with_fill_na(true)
            .with_session_timeout(Duration::from_secs(30))
            .with_reconnect(5, Duration::from_secs(1))
            .with_inconsistency_policy(InconsistencyPolicy::LogAndDrop);

        assert_eq!(config.base_url, "http://localhost:8080/CORS");
        assert!(config.fill_na);
        assert_eq!(config.session_timeout_secs, 30);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(1));
        assert_eq!(config.inconsistency_policy, InconsistencyPolicy::LogAndDrop);
    }

    #[test]
    fn test_feed_config_validation() {
        assert!(FeedConfig::default().with_base_url("").validate().is_err());
        assert!(FeedConfig::default().with_base_url("ftp://host").validate().is_err());

        let zero_timeout = FeedConfig {
            session_timeout_secs: 0,
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_inconsistency_policy_parsing() {
        assert_eq!(
            "fail".parse::<InconsistencyPolicy>().unwrap(),
            InconsistencyPolicy::Fail
        );
        assert_eq!(
            "LOG_AND_DROP".parse::<InconsistencyPolicy>().unwrap(),
            InconsistencyPolicy::LogAndDrop
        );
        assert!("ignore".parse::<InconsistencyPolicy>().is_err());
    }

    #[test]
    fn test_feed_config_deserialize_partial() {
        let config: FeedConfig =
            serde_json::from_str(r#"{"fill_na": true, "inconsistency_policy": "log_and_drop"}"#)
                .unwrap();
        assert!(config.fill_na);
        assert_eq!(config.inconsistency_policy, InconsistencyPolicy::LogAndDrop);
        assert_eq!(config.session_timeout_secs, DEFAULT_QUOTE_SESSION_TIMEOUT_SECS);
    }

    #[test]
    fn test_app_config_load_from_file() {
        let dir = std::env::temp_dir().join(format!("quotecast-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("feed.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[feed]\nbase_url = \"http://127.0.0.1:9000/CORS\"\nfill_na = true\npoll_interval_ms = 250\n\n[logging]\nlevel = \"debug\"\nformat = \"json\""
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.feed.base_url, "http://127.0.0.1:9000/CORS");
        assert!(config.feed.fill_na);
        assert_eq!(config.feed.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.logging.format, "json");

        std::fs::remove_dir_all(&dir).ok();
    }
}
