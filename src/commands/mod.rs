//! Commands Module
//!
//! 얇은 명령 표면: 스토어/바인더/세션을 묶어 호출 가능한 작업으로 노출.
//! 명령은 전부 `AppContext`를 참조로 받습니다.

pub mod content;
pub mod editor;
pub mod session;

use std::sync::MutexGuard;

use crate::binder::PageBinder;
use crate::error::{CommandError, CommandResult};
use crate::AppContext;
use editor::{EditorPanel, NoticeLevel};

pub(crate) fn lock_binder(ctx: &AppContext) -> CommandResult<MutexGuard<'_, PageBinder>> {
    ctx.binder.lock().map_err(|e| CommandError {
        code: "LOCK_ERROR".to_string(),
        message: format!("Failed to acquire binder lock: {}", e),
        details: None,
    })
}

pub(crate) fn lock_panel(ctx: &AppContext) -> CommandResult<MutexGuard<'_, EditorPanel>> {
    ctx.panel.lock().map_err(|e| CommandError {
        code: "LOCK_ERROR".to_string(),
        message: format!("Failed to acquire editor panel lock: {}", e),
        details: None,
    })
}

/// 편집 affordance 게이트: admin/teacher 세션이 아니면 거부
pub(crate) async fn require_editor(ctx: &AppContext) -> CommandResult<()> {
    if ctx.session.can_edit().await {
        return Ok(());
    }

    if let Ok(mut panel) = ctx.panel.lock() {
        panel.push(
            NoticeLevel::Error,
            "Editing requires an admin or teacher session",
        );
    }
    Err(CommandError::new(
        "AUTH_REQUIRED",
        "Editing requires an admin or teacher session",
    ))
}
