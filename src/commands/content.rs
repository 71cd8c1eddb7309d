//! Content Commands
//!
//! 클라이언트 표면: getContent / getPageContents / saveContent /
//! deleteSection / saveMultipleSections / subscribeToChanges /
//! setCurrentPage / testConnection 에 대응하는 작업들.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::binder::PageBinder;
use crate::commands::editor::{EditorPanel, NoticeLevel};
use crate::commands::{lock_binder, lock_panel, require_editor};
use crate::error::{CommandError, CommandResult};
use crate::models::{
    BatchOutcome, ChangeEvent, ConnectionTest, DeleteOutcome, SaveAction, SaveOutcome, SiteStats,
};
use crate::store::realtime::ChangeHandler;
use crate::AppContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetContentArgs {
    pub section: String,
    #[serde(default)]
    pub default_value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPageContentsArgs {
    #[serde(default)]
    pub include_metadata: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveContentArgs {
    pub section: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSectionArgs {
    pub section: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveMultipleSectionsArgs {
    pub sections: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetCurrentPageArgs {
    pub page: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionMetaDto {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContentsDto {
    pub contents: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, SectionMetaDto>>,
    /// 슬롯에 반영된 구역 수
    pub applied: usize,
}

/// 구역 하나 조회. 없으면 `defaultValue`(없으면 빈 문자열)를 돌려줍니다.
pub async fn get_content(ctx: &AppContext, args: GetContentArgs) -> CommandResult<String> {
    let page = {
        let binder = lock_binder(ctx)?;
        binder.current_page().to_string()
    };

    match ctx.store.get_content(&page, args.section.trim()).await {
        Ok(Some(record)) => Ok(record.content),
        Ok(None) => Ok(args.default_value.unwrap_or_default()),
        Err(e) => {
            let mut panel = lock_panel(ctx)?;
            panel.push(NoticeLevel::Error, format!("Load failed: {}", e));
            Err(e.into())
        }
    }
}

/// 활성 페이지의 모든 구역 조회 + 슬롯 반영
pub async fn get_page_contents(
    ctx: &AppContext,
    args: GetPageContentsArgs,
) -> CommandResult<PageContentsDto> {
    let page = {
        let binder = lock_binder(ctx)?;
        binder.current_page().to_string()
    };

    let records = match ctx.store.get_page_contents(&page).await {
        Ok(records) => records,
        Err(e) => {
            let mut panel = lock_panel(ctx)?;
            panel.push(NoticeLevel::Error, format!("Load failed: {}", e));
            return Err(e.into());
        }
    };

    let applied = {
        let mut binder = lock_binder(ctx)?;
        binder.load_contents(&records)
    };

    let mut contents = HashMap::new();
    let mut metadata = HashMap::new();
    for record in &records {
        contents.insert(record.section_name.clone(), record.content.clone());
        metadata.insert(
            record.section_name.clone(),
            SectionMetaDto {
                created_at: record.created_at,
                updated_at: record.updated_at,
            },
        );
    }

    {
        let mut panel = lock_panel(ctx)?;
        panel.push(
            NoticeLevel::Success,
            format!("Loaded {} sections ({} applied)", records.len(), applied),
        );
    }

    Ok(PageContentsDto {
        contents,
        metadata: args.include_metadata.unwrap_or(false).then_some(metadata),
        applied,
    })
}

/// 구역 하나 저장 (upsert)
pub async fn save_content(ctx: &AppContext, args: SaveContentArgs) -> CommandResult<SaveOutcome> {
    require_editor(ctx).await?;

    let section = args.section.trim().to_string();
    if section.is_empty() {
        let mut panel = lock_panel(ctx)?;
        panel.push(NoticeLevel::Error, "Section name cannot be empty");
        return Err(CommandError::new(
            "VALIDATION_ERROR",
            "Section name cannot be empty",
        ));
    }
    if args.content.trim().is_empty() {
        let mut panel = lock_panel(ctx)?;
        panel.push(NoticeLevel::Error, "Content cannot be empty");
        return Err(CommandError::new(
            "VALIDATION_ERROR",
            "Content cannot be empty",
        ));
    }

    let page = {
        let binder = lock_binder(ctx)?;
        binder.current_page().to_string()
    };

    let outcome = ctx.store.save_content(&page, &section, &args.content).await;

    if outcome.success {
        {
            let mut binder = lock_binder(ctx)?;
            binder.edit_section(&section, &args.content);
            binder.mark_saved(&section, outcome.timestamp);
        }
        let mut panel = lock_panel(ctx)?;
        panel.push(
            NoticeLevel::Success,
            format!("Saved '{}' ({})", section, action_label(&outcome)),
        );
    } else {
        let mut panel = lock_panel(ctx)?;
        panel.push(
            NoticeLevel::Error,
            format!(
                "Save failed for '{}': {}",
                section,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        );
    }

    Ok(outcome)
}

/// 구역 삭제 (이미 없어도 성공)
pub async fn delete_section(
    ctx: &AppContext,
    args: DeleteSectionArgs,
) -> CommandResult<DeleteOutcome> {
    require_editor(ctx).await?;

    let section = args.section.trim().to_string();
    if section.is_empty() {
        return Err(CommandError::new(
            "VALIDATION_ERROR",
            "Section name cannot be empty",
        ));
    }

    let page = {
        let binder = lock_binder(ctx)?;
        binder.current_page().to_string()
    };

    let outcome = ctx.store.delete_section(&page, &section).await;

    if outcome.success {
        {
            let mut binder = lock_binder(ctx)?;
            binder.forget_section(&section);
        }
        let mut panel = lock_panel(ctx)?;
        panel.push(NoticeLevel::Success, format!("Deleted '{}'", section));
    } else {
        let mut panel = lock_panel(ctx)?;
        panel.push(
            NoticeLevel::Error,
            format!(
                "Delete failed for '{}': {}",
                section,
                outcome.error.as_deref().unwrap_or("unknown error")
            ),
        );
    }

    Ok(outcome)
}

/// 여러 구역을 배치 저장
pub async fn save_multiple_sections(
    ctx: &AppContext,
    args: SaveMultipleSectionsArgs,
) -> CommandResult<BatchOutcome> {
    require_editor(ctx).await?;

    if args.sections.is_empty() {
        let mut panel = lock_panel(ctx)?;
        panel.push(NoticeLevel::Info, "No sections to save");
        return Ok(BatchOutcome {
            success: true,
            batch_id: uuid::Uuid::new_v4().to_string(),
            results: vec![],
            total: 0,
            successful: 0,
            failed: 0,
        });
    }

    let page = {
        let binder = lock_binder(ctx)?;
        binder.current_page().to_string()
    };

    // 결정적 순서를 위해 이름순 정렬
    let mut sections: Vec<(String, String)> = args.sections.clone().into_iter().collect();
    sections.sort_by(|a, b| a.0.cmp(&b.0));

    let outcome = ctx.store.save_multiple_sections(&page, sections).await;

    {
        let mut binder = lock_binder(ctx)?;
        for result in outcome.results.iter().filter(|r| r.success) {
            if let Some(content) = args.sections.get(&result.section) {
                binder.edit_section(&result.section, content);
                binder.mark_saved(&result.section, result.timestamp);
            }
        }
    }

    let mut panel = lock_panel(ctx)?;
    if outcome.success {
        panel.push(
            NoticeLevel::Success,
            format!("Batch save complete: {} sections", outcome.successful),
        );
    } else {
        panel.push(
            NoticeLevel::Error,
            format!(
                "Batch save finished with errors: {} successful, {} failed",
                outcome.successful, outcome.failed
            ),
        );
    }

    Ok(outcome)
}

/// 활성 페이지 전환. 구독 중이면 새 페이지로 다시 구독합니다.
pub async fn set_current_page(
    ctx: &AppContext,
    args: SetCurrentPageArgs,
) -> CommandResult<String> {
    let page = args.page.trim().to_string();
    if page.is_empty() {
        return Err(CommandError::new(
            "VALIDATION_ERROR",
            "Page name cannot be empty",
        ));
    }

    {
        let mut binder = lock_binder(ctx)?;
        binder.switch_page(&page);
    }

    if ctx.store.subscribed_page().await.is_some() {
        let handler = live_update_handler(ctx.binder.clone(), ctx.panel.clone());
        ctx.store
            .subscribe_to_changes(&page, handler)
            .await
            .map_err(CommandError::from)?;
    }

    let mut panel = lock_panel(ctx)?;
    panel.push(NoticeLevel::Info, format!("Page switched to '{}'", page));
    Ok(page)
}

/// 활성 페이지의 실시간 변경 구독 시작
pub async fn subscribe_to_changes(ctx: &AppContext) -> CommandResult<()> {
    let page = {
        let binder = lock_binder(ctx)?;
        binder.current_page().to_string()
    };

    let handler = live_update_handler(ctx.binder.clone(), ctx.panel.clone());
    match ctx.store.subscribe_to_changes(&page, handler).await {
        Ok(()) => {
            let mut panel = lock_panel(ctx)?;
            panel.push(
                NoticeLevel::Info,
                format!("Live updates enabled for page '{}'", page),
            );
            Ok(())
        }
        Err(e) => {
            let mut panel = lock_panel(ctx)?;
            panel.push(NoticeLevel::Error, format!("Subscribe failed: {}", e));
            Err(e.into())
        }
    }
}

/// 실시간 구독 해제
pub async fn unsubscribe_changes(ctx: &AppContext) -> CommandResult<()> {
    ctx.store.unsubscribe().await;
    let mut panel = lock_panel(ctx)?;
    panel.push(NoticeLevel::Info, "Live updates disabled");
    Ok(())
}

/// 백엔드 연결 테스트
pub async fn test_connection(ctx: &AppContext) -> CommandResult<ConnectionTest> {
    let probe = ctx.store.test_connection().await;

    let mut panel = lock_panel(ctx)?;
    if probe.success {
        panel.push(NoticeLevel::Success, probe.message.clone());
    } else {
        panel.push(NoticeLevel::Error, probe.message.clone());
    }
    Ok(probe)
}

/// 저장된 구역 통계
pub async fn get_stats(ctx: &AppContext) -> CommandResult<SiteStats> {
    ctx.store.get_stats().await.map_err(CommandError::from)
}

fn action_label(outcome: &SaveOutcome) -> &'static str {
    match outcome.action {
        Some(SaveAction::Created) => "created",
        Some(SaveAction::Updated) => "updated",
        None => "saved",
    }
}

/// 수신한 변경을 바인더에 반영하고 알림을 남기는 표준 핸들러
fn live_update_handler(
    binder: Arc<Mutex<PageBinder>>,
    panel: Arc<Mutex<EditorPanel>>,
) -> ChangeHandler {
    Arc::new(move |event: ChangeEvent| {
        let section = event
            .section_name()
            .unwrap_or("(unknown)")
            .to_string();

        if let Ok(mut binder) = binder.lock() {
            binder.apply_event(&event);
            binder.clear_expired_highlights();
        }
        if let Ok(mut panel) = panel.lock() {
            panel.push(NoticeLevel::Info, format!("Live update: {}", section));
        }
    })
}
