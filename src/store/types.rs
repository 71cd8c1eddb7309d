//! PostgREST 요청/응답 타입 정의

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// upsert 요청 한 행
///
/// `created_at`은 백엔드 기본값에 맡기고, `updated_at`만 클라이언트가
/// 찍습니다 (원 테이블 스키마와 동일한 관례).
#[derive(Debug, Clone, Serialize)]
pub struct UpsertRow {
    pub page_name: String,
    pub section_name: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

/// 통계 집계용 축약 행
#[derive(Debug, Clone, Deserialize)]
pub struct StatRow {
    pub page_name: String,
    pub section_name: String,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// PostgREST 에러 응답 본문
#[derive(Debug, Clone, Deserialize)]
pub struct PostgrestError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}
