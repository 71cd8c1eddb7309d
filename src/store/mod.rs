//! Remote Store Client
//!
//! `site_data` 테이블에 대한 내구성 있는 키-값 접근.
//! (page_name, section_name)을 키로 PostgREST 엔드포인트를 호출하며,
//! 쓰기는 유니크 제약 기반 upsert 한 건으로 원자적으로 처리합니다.

pub mod realtime;
pub mod types;

use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::SupabaseConfig;
use crate::error::CseError;
use crate::models::{
    BatchOutcome, ConnectionTest, DeleteOutcome, SaveAction, SaveOutcome, SectionRecord, SiteStats,
};
use crate::retry::{batch_save, with_retry};
use realtime::{ChangeHandler, RealtimeSubscription};
use types::{PostgrestError, StatRow, UpsertRow};

const TABLE: &str = "site_data";
const SELECT_COLUMNS: &str = "page_name,section_name,content,created_at,updated_at";

/// 사이트 콘텐츠 스토어 클라이언트
///
/// 앱 시작 시 한 번 만들어 참조로 전달합니다 (전역 싱글톤 금지).
pub struct SiteStore {
    config: SupabaseConfig,
    http: reqwest::Client,
    /// 클라이언트 인스턴스당 활성 구독은 최대 하나
    subscription: Mutex<Option<RealtimeSubscription>>,
}

impl SiteStore {
    pub fn new(config: SupabaseConfig) -> Result<Self, CseError> {
        let http = reqwest::Client::builder().build()?;
        Ok(SiteStore {
            config,
            http,
            subscription: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("apikey", &self.config.anon_key)
            .header("Authorization", format!("Bearer {}", self.config.anon_key))
    }

    /// 구역 하나 조회. 없는 키는 `None`이며 에러가 아닙니다.
    pub async fn get_content(
        &self,
        page: &str,
        section: &str,
    ) -> Result<Option<SectionRecord>, CseError> {
        let query = format!(
            "select={}&page_name=eq.{}&section_name=eq.{}&limit=1",
            SELECT_COLUMNS,
            urlencoding::encode(page),
            urlencoding::encode(section)
        );

        let rows = with_retry(
            || {
                let query = query.clone();
                async move { self.fetch_records(&query).await }
            },
            self.config.max_retries,
            self.config.retry_delay,
        )
        .await?;

        Ok(rows.into_iter().next())
    }

    /// 페이지의 모든 구역 조회 (삽입 순서 = id 오름차순)
    pub async fn get_page_contents(&self, page: &str) -> Result<Vec<SectionRecord>, CseError> {
        let query = format!(
            "select={}&page_name=eq.{}&order=id.asc",
            SELECT_COLUMNS,
            urlencoding::encode(page)
        );

        with_retry(
            || {
                let query = query.clone();
                async move { self.fetch_records(&query).await }
            },
            self.config.max_retries,
            self.config.retry_delay,
        )
        .await
    }

    /// (page, section) 키로 upsert 저장.
    ///
    /// 쓰기는 단건 upsert라서 동시 호출에도 같은 키의 중복 행이 생기지
    /// 않습니다. 사전 존재 조회는 `action` 라벨을 정하기 위한 것으로,
    /// 실패해도 저장 자체는 계속합니다.
    pub async fn save_content(&self, page: &str, section: &str, content: &str) -> SaveOutcome {
        let section = section.trim();
        if section.is_empty() {
            return SaveOutcome::failed(section, "Section name cannot be empty");
        }
        if content.trim().is_empty() {
            return SaveOutcome::failed(section, "Content cannot be empty");
        }

        let existed = self.section_exists(page, section).await.unwrap_or(false);

        let row = UpsertRow {
            page_name: page.to_string(),
            section_name: section.to_string(),
            content: content.to_string(),
            updated_at: Utc::now(),
        };

        let result = with_retry(
            || {
                let row = row.clone();
                async move { self.upsert_row(&row).await }
            },
            self.config.max_retries,
            self.config.retry_delay,
        )
        .await;

        match result {
            Ok(()) => {
                let action = if existed {
                    SaveAction::Updated
                } else {
                    SaveAction::Created
                };
                println!("[Store] Saved {}/{}", page, section);
                SaveOutcome::ok(section, action, row.updated_at)
            }
            Err(e) => {
                eprintln!("[Store] Save failed [{}]: {}", section, e);
                SaveOutcome::failed(section, e.to_string())
            }
        }
    }

    /// 구역 삭제. 이미 없는 구역을 지워도 성공입니다.
    pub async fn delete_section(&self, page: &str, section: &str) -> DeleteOutcome {
        let section = section.trim();
        if section.is_empty() {
            return DeleteOutcome {
                success: false,
                section: section.to_string(),
                error: Some("Section name cannot be empty".to_string()),
            };
        }

        let result = with_retry(
            || async move { self.delete_rows(page, section).await },
            self.config.max_retries,
            self.config.retry_delay,
        )
        .await;

        match result {
            Ok(()) => {
                println!("[Store] Deleted {}/{}", page, section);
                DeleteOutcome {
                    success: true,
                    section: section.to_string(),
                    error: None,
                }
            }
            Err(e) => {
                eprintln!("[Store] Delete failed [{}]: {}", section, e);
                DeleteOutcome {
                    success: false,
                    section: section.to_string(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// 여러 구역을 배치 저장 (청크 순차, 청크 내 동시 발행)
    pub async fn save_multiple_sections(
        &self,
        page: &str,
        sections: Vec<(String, String)>,
    ) -> BatchOutcome {
        batch_save(
            sections,
            self.config.batch_size,
            self.config.batch_delay,
            |name, content| async move { self.save_content(page, &name, &content).await },
        )
        .await
    }

    /// 연결 테스트 (응답 시간 측정 포함)
    pub async fn test_connection(&self) -> ConnectionTest {
        let started = Instant::now();
        match self.fetch_raw("select=section_name&limit=1").await {
            Ok(_) => {
                let ms = started.elapsed().as_millis() as u64;
                ConnectionTest {
                    success: true,
                    message: format!("Database connection OK ({}ms)", ms),
                    response_time_ms: Some(ms),
                }
            }
            Err(e) => ConnectionTest {
                success: false,
                message: format!("Connection failed: {}", e),
                response_time_ms: None,
            },
        }
    }

    /// 저장된 구역 통계 (페이지별 개수, 마지막 갱신 시각)
    pub async fn get_stats(&self) -> Result<SiteStats, CseError> {
        let query = "select=page_name,section_name,updated_at&order=updated_at.desc".to_string();
        let url = format!("{}?{}", self.config.rest_url(TABLE), query);

        let response = self.authed(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }
        let rows: Vec<StatRow> = response.json().await?;

        let mut stats = SiteStats {
            total_sections: rows.len(),
            last_updated: rows.first().and_then(|r| r.updated_at),
            ..Default::default()
        };
        for row in &rows {
            *stats.pages.entry(row.page_name.clone()).or_insert(0) += 1;
        }
        Ok(stats)
    }

    /// 페이지 변경 푸시 구독. 기존 구독이 있으면 먼저 해제합니다.
    pub async fn subscribe_to_changes(
        &self,
        page: &str,
        handler: ChangeHandler,
    ) -> Result<(), CseError> {
        let mut guard = self.subscription.lock().await;
        if let Some(prev) = guard.take() {
            println!("[Store] Replacing subscription for page '{}'", prev.page());
            prev.shutdown().await;
        }

        let subscription =
            RealtimeSubscription::connect(&self.http, &self.config, page, handler).await?;
        *guard = Some(subscription);
        Ok(())
    }

    /// 구독 해제 (활성 구독이 없으면 아무 일도 하지 않음)
    pub async fn unsubscribe(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.shutdown().await;
        }
    }

    pub async fn subscribed_page(&self) -> Option<String> {
        self.subscription
            .lock()
            .await
            .as_ref()
            .map(|s| s.page().to_string())
    }

    // ---- 내부 REST 헬퍼 ----

    async fn fetch_records(&self, query: &str) -> Result<Vec<SectionRecord>, CseError> {
        let url = format!("{}?{}", self.config.rest_url(TABLE), query);
        let response = self.authed(self.http.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn fetch_raw(&self, query: &str) -> Result<Vec<serde_json::Value>, CseError> {
        let url = format!("{}?{}", self.config.rest_url(TABLE), query);
        let response = self.authed(self.http.get(&url)).send().await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }
        Ok(response.json().await?)
    }

    async fn section_exists(&self, page: &str, section: &str) -> Result<bool, CseError> {
        let query = format!(
            "select=section_name&page_name=eq.{}&section_name=eq.{}&limit=1",
            urlencoding::encode(page),
            urlencoding::encode(section)
        );
        Ok(!self.fetch_raw(&query).await?.is_empty())
    }

    async fn upsert_row(&self, row: &UpsertRow) -> Result<(), CseError> {
        let url = format!(
            "{}?on_conflict=page_name,section_name",
            self.config.rest_url(TABLE)
        );

        let response = self
            .authed(self.http.post(&url))
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }
        Ok(())
    }

    async fn delete_rows(&self, page: &str, section: &str) -> Result<(), CseError> {
        let url = format!(
            "{}?page_name=eq.{}&section_name=eq.{}",
            self.config.rest_url(TABLE),
            urlencoding::encode(page),
            urlencoding::encode(section)
        );

        let response = self.authed(self.http.delete(&url)).send().await?;
        if !response.status().is_success() {
            return Err(self.backend_error(response).await);
        }
        Ok(())
    }

    async fn backend_error(&self, response: reqwest::Response) -> CseError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let message = match serde_json::from_str::<PostgrestError>(&body) {
            Ok(err) => err.message,
            Err(_) if !body.is_empty() => body,
            Err(_) => "empty error body".to_string(),
        };

        CseError::Backend { status, message }
    }
}
