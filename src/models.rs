//! ClubSite Data Models
//!
//! 백엔드 `site_data` 테이블 및 명령 응답과 매핑되는 데이터 모델

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `site_data` 한 행: (page_name, section_name) 키당 최대 1개
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    pub page_name: String,
    pub section_name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// 저장 결과의 action 구분
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveAction {
    Created,
    Updated,
}

/// 단건 저장 결과
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<SaveAction>,
    pub section: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveOutcome {
    pub fn ok(section: &str, action: SaveAction, timestamp: DateTime<Utc>) -> Self {
        SaveOutcome {
            success: true,
            action: Some(action),
            section: section.to_string(),
            timestamp: Some(timestamp),
            error: None,
        }
    }

    pub fn failed(section: &str, error: impl Into<String>) -> Self {
        SaveOutcome {
            success: false,
            action: None,
            section: section.to_string(),
            timestamp: None,
            error: Some(error.into()),
        }
    }
}

/// 삭제 결과 (존재하지 않는 구역 삭제도 성공)
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub success: bool,
    pub section: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 배치 저장 집계 결과
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub success: bool,
    #[serde(rename = "batchId")]
    pub batch_id: String,
    pub results: Vec<SaveOutcome>,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// 실시간 변경 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventType {
    Insert,
    Update,
    Delete,
}

/// 실시간 푸시로 전달되는 변경 이벤트
///
/// DELETE 이벤트는 `new`가 비고 `old`에 삭제된 행이 담깁니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "eventType")]
    pub event_type: ChangeEventType,
    #[serde(rename = "new", default, skip_serializing_if = "Option::is_none")]
    pub new_record: Option<SectionRecord>,
    #[serde(rename = "old", default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<SectionRecord>,
}

impl ChangeEvent {
    /// 이벤트가 가리키는 구역 이름
    pub fn section_name(&self) -> Option<&str> {
        self.new_record
            .as_ref()
            .or(self.old_record.as_ref())
            .map(|r| r.section_name.as_str())
    }
}

/// 연결 테스트 결과
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
    #[serde(rename = "responseTimeMs")]
    pub response_time_ms: Option<u64>,
}

/// 저장된 구역 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct SiteStats {
    #[serde(rename = "totalSections")]
    pub total_sections: usize,
    pub pages: HashMap<String, usize>,
    #[serde(rename = "lastUpdated")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// 로그인된 사용자 프로필 (자격 검증은 외부 서비스 몫)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub student_id: String,
    pub name: String,
    #[serde(default)]
    pub grade: Option<String>,
    pub role: String,
}

impl UserProfile {
    /// 편집 권한이 있는 역할인지 여부
    pub fn can_edit(&self) -> bool {
        matches!(self.role.as_str(), "admin" | "teacher")
    }
}
