//! Session Commands
//!
//! 로그인/로그아웃/손님 모드 전환. 프로필은 외부 인증 서비스가 검증해
//! 넘겨준 것을 그대로 받습니다.

use serde::Deserialize;

use crate::commands::editor::NoticeLevel;
use crate::commands::lock_panel;
use crate::error::CommandResult;
use crate::models::UserProfile;
use crate::AppContext;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginArgs {
    pub profile: UserProfile,
    /// "로그인 상태 유지" 선택 시 true (키체인에 영속 저장)
    #[serde(default)]
    pub remember: bool,
}

/// 로그인 처리 후 프로필을 돌려줍니다.
pub async fn login(ctx: &AppContext, args: LoginArgs) -> CommandResult<UserProfile> {
    ctx.session.login(args.profile.clone(), args.remember).await;

    let mut panel = lock_panel(ctx)?;
    panel.push(
        NoticeLevel::Success,
        format!("Welcome, {}", args.profile.name),
    );
    // 편집 권한이 없으면 패널은 닫힌 상태를 유지
    if !args.profile.can_edit() {
        panel.visible = false;
    }
    Ok(args.profile)
}

pub async fn logout(ctx: &AppContext) -> CommandResult<()> {
    ctx.session.logout().await;

    let mut panel = lock_panel(ctx)?;
    panel.visible = false;
    panel.push(NoticeLevel::Info, "Logged out");
    Ok(())
}

/// 손님 모드 전환 (세션 제거 + 편집 패널 비활성)
pub async fn set_guest_mode(ctx: &AppContext) -> CommandResult<()> {
    ctx.session.set_guest_mode().await;

    let mut panel = lock_panel(ctx)?;
    panel.visible = false;
    panel.push(NoticeLevel::Info, "Switched to guest mode");
    Ok(())
}

/// 저장된 세션 복원 (탭 수명 우선, 없으면 키체인)
pub async fn restore_session(ctx: &AppContext) -> CommandResult<Option<UserProfile>> {
    let profile = ctx.session.restore().await;

    if let Some(profile) = &profile {
        let mut panel = lock_panel(ctx)?;
        panel.push(
            NoticeLevel::Info,
            format!("Welcome back, {}", profile.name),
        );
    }
    Ok(profile)
}

pub async fn current_user(ctx: &AppContext) -> CommandResult<Option<UserProfile>> {
    Ok(ctx.session.current_user().await)
}
