//! Backend Configuration
//!
//! Supabase 접속 설정 로드/검증. 설정이 불완전하면 초기화 단계에서 실패하며,
//! 이후 어떤 스토어 작업도 시도되지 않습니다.

use std::time::Duration;

use crate::error::CseError;

/// 기본 재시도 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// 기본 재시도 간격 (선형 백오프의 기준값)
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);
/// 배치 저장 시 청크 크기
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// 청크 사이 대기 시간
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(100);

/// Supabase 백엔드 설정
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    /// 프로젝트 URL (https:// 필수)
    pub url: String,
    /// anon/publishable 키
    pub anon_key: String,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    /// 초기화 직후 연결 테스트 수행 여부
    pub auto_test_connection: bool,
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, CseError> {
        let config = SupabaseConfig {
            url: url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            auto_test_connection: true,
        };
        config.validate()?;
        Ok(config)
    }

    /// 환경 변수에서 설정 로드
    ///
    /// 우선순위: SUPABASE_URL > VITE_SUPABASE_URL (키도 동일)
    pub fn from_env() -> Result<Self, CseError> {
        let url = env_first(&["SUPABASE_URL", "VITE_SUPABASE_URL"]).ok_or_else(|| {
            CseError::Config(
                "Supabase URL is missing. Please set SUPABASE_URL in .env.local".to_string(),
            )
        })?;
        let anon_key = env_first(&["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"]).ok_or_else(
            || {
                CseError::Config(
                    "Supabase anon key is missing. Please set SUPABASE_ANON_KEY in .env.local"
                        .to_string(),
                )
            },
        )?;

        SupabaseConfig::new(url, anon_key)
    }

    fn validate(&self) -> Result<(), CseError> {
        if self.url.trim().is_empty() || self.anon_key.trim().is_empty() {
            return Err(CseError::Config(
                "Supabase config requires both url and anon key".to_string(),
            ));
        }

        let parsed = url::Url::parse(&self.url)
            .map_err(|e| CseError::Config(format!("Invalid Supabase URL: {}", e)))?;
        let loopback = matches!(parsed.host_str(), Some("localhost") | Some("127.0.0.1"));
        match parsed.scheme() {
            "https" => Ok(()),
            // 로컬 개발/테스트 백엔드는 평문 허용
            "http" if loopback => Ok(()),
            other => Err(CseError::Config(format!(
                "Supabase URL must use https (got scheme: {})",
                other
            ))),
        }
    }

    /// PostgREST 테이블 엔드포인트
    pub fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.url, table)
    }

    /// 실시간 변경 스트림(SSE) 엔드포인트
    pub fn realtime_url(&self) -> String {
        format!("{}/realtime/v1/changes", self.url)
    }
}

fn env_first(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(v) = std::env::var(key) {
            if !v.trim().is_empty() {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}
