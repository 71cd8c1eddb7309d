//! Editor Commands
//!
//! 편집 패널 상태와 편집 워크플로 (스테이징 → 저장 전부/재로드).
//! 인증 게이트를 통과하지 못하면 모든 편집 명령이 거부됩니다.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::commands::{lock_binder, lock_panel, require_editor};
use crate::error::{CommandError, CommandResult};
use crate::models::BatchOutcome;
use crate::AppContext;

/// 패널에 보관하는 알림 최대 개수
const MAX_NOTICES: usize = 20;

/// 알림 수준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
    Info,
}

/// 사용자에게 보여줄 알림 한 건
///
/// 사용자 트리거 동작은 전부 성공/실패 알림을 남깁니다 (무음 실패 금지).
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// 편집 패널 상태
pub struct EditorPanel {
    pub visible: bool,
    notices: VecDeque<Notice>,
}

impl EditorPanel {
    pub fn new() -> Self {
        EditorPanel {
            visible: false,
            notices: VecDeque::new(),
        }
    }

    pub fn push(&mut self, level: NoticeLevel, message: impl Into<String>) {
        let message = message.into();
        println!("[Editor] Notice ({:?}): {}", level, message);

        self.notices.push_back(Notice {
            level,
            message,
            at: Utc::now(),
        });
        while self.notices.len() > MAX_NOTICES {
            self.notices.pop_front();
        }
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices.iter().cloned().collect()
    }
}

impl Default for EditorPanel {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSectionArgs {
    pub section: String,
    pub content: String,
}

/// 로컬 편집 스테이징 (저장 전까지 캐시에만 반영)
pub async fn edit_section(ctx: &AppContext, args: EditSectionArgs) -> CommandResult<()> {
    require_editor(ctx).await?;

    let section = args.section.trim().to_string();
    if section.is_empty() {
        return Err(CommandError::new(
            "VALIDATION_ERROR",
            "Section name cannot be empty",
        ));
    }

    {
        let mut binder = lock_binder(ctx)?;
        binder.edit_section(&section, &args.content);
    }

    let mut panel = lock_panel(ctx)?;
    panel.push(NoticeLevel::Info, format!("Staged edit: {}", section));
    Ok(())
}

/// 편집 가능한 구역 이름 목록 (편집기 UI 영역 제외)
pub async fn list_editable_sections(ctx: &AppContext) -> CommandResult<Vec<String>> {
    require_editor(ctx).await?;

    let mut binder = lock_binder(ctx)?;
    Ok(binder
        .collect_editable()
        .into_iter()
        .map(|(_, name)| name)
        .collect())
}

/// 열려 있는 편집(더티 구역) 전부 저장
pub async fn save_all_edits(ctx: &AppContext) -> CommandResult<BatchOutcome> {
    require_editor(ctx).await?;

    let (page, dirty) = {
        let binder = lock_binder(ctx)?;
        (binder.current_page().to_string(), binder.dirty_sections())
    };

    if dirty.is_empty() {
        let mut panel = lock_panel(ctx)?;
        panel.push(NoticeLevel::Info, "No changes to save");
        return Ok(BatchOutcome {
            success: true,
            batch_id: uuid::Uuid::new_v4().to_string(),
            results: vec![],
            total: 0,
            successful: 0,
            failed: 0,
        });
    }

    let outcome = ctx.store.save_multiple_sections(&page, dirty).await;

    {
        let mut binder = lock_binder(ctx)?;
        for result in outcome.results.iter().filter(|r| r.success) {
            binder.mark_saved(&result.section, result.timestamp);
        }
    }

    let mut panel = lock_panel(ctx)?;
    if outcome.success {
        panel.push(
            NoticeLevel::Success,
            format!("Saved all edits: {} sections", outcome.successful),
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

/// 활성 페이지를 백엔드 상태로 다시 로드 (로컬 편집은 버려짐)
pub async fn reload_page(ctx: &AppContext) -> CommandResult<usize> {
    require_editor(ctx).await?;

    let page = {
        let binder = lock_binder(ctx)?;
        binder.current_page().to_string()
    };

    let records = match ctx.store.get_page_contents(&page).await {
        Ok(records) => records,
        Err(e) => {
            let mut panel = lock_panel(ctx)?;
            panel.push(NoticeLevel::Error, format!("Reload failed: {}", e));
            return Err(e.into());
        }
    };

    let applied = {
        let mut binder = lock_binder(ctx)?;
        binder.load_contents(&records)
    };

    let mut panel = lock_panel(ctx)?;
    panel.push(
        NoticeLevel::Success,
        format!("Reloaded {} sections ({} applied)", records.len(), applied),
    );
    Ok(applied)
}

/// 패널 표시 여부 토글. 새 상태를 돌려줍니다.
pub async fn toggle_panel(ctx: &AppContext) -> CommandResult<bool> {
    require_editor(ctx).await?;

    let mut panel = lock_panel(ctx)?;
    panel.visible = !panel.visible;
    Ok(panel.visible)
}

/// 알림 목록 조회 (게이트 없음: 읽기 전용)
pub fn panel_notices(ctx: &AppContext) -> CommandResult<Vec<Notice>> {
    let panel = lock_panel(ctx)?;
    Ok(panel.notices())
}
