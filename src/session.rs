//! Session Manager
//!
//! 로그인 세션의 두 가지 수명 관리:
//! - 탭 수명: 프로세스 메모리
//! - 영속 수명("로그인 상태 유지"): OS 키체인
//!
//! 자격 검증(아이디/비밀번호 대조)은 외부 인증 서비스 몫이며, 여기서는
//! 이미 검증된 프로필만 보관합니다.

use keyring::Entry;
use tokio::sync::RwLock;

use crate::models::UserProfile;

const KEYCHAIN_SERVICE: &str = "com.clubsite.app";
const KEYCHAIN_SESSION_PROFILE: &str = "session:profile";

/// 세션 상태 관리자
pub struct SessionManager {
    current: RwLock<Option<UserProfile>>,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            current: RwLock::new(None),
        }
    }

    /// 로그인 처리 (메모리 + remember 선택 시 키체인)
    pub async fn login(&self, profile: UserProfile, remember: bool) {
        if remember {
            Self::persist_profile(&profile);
        }

        println!("[Session] Logged in: {} ({})", profile.name, profile.role);
        *self.current.write().await = Some(profile);
    }

    /// 기존 로그인 복원 (메모리 우선, 없으면 키체인)
    pub async fn restore(&self) -> Option<UserProfile> {
        if let Some(profile) = self.current.read().await.clone() {
            return Some(profile);
        }

        let profile = Self::load_persisted()?;
        *self.current.write().await = Some(profile.clone());
        println!("[Session] Restored persisted session: {}", profile.name);
        Some(profile)
    }

    /// 로그아웃: 두 수명 모두 제거
    pub async fn logout(&self) {
        *self.current.write().await = None;
        Self::clear_persisted();
        println!("[Session] Logged out");
    }

    /// 손님 모드 전환 (로그아웃과 동일하게 세션을 비움)
    pub async fn set_guest_mode(&self) {
        self.logout().await;
        println!("[Session] Switched to guest mode");
    }

    pub async fn current_user(&self) -> Option<UserProfile> {
        self.current.read().await.clone()
    }

    /// 세션 존재 여부 = 인증 여부
    pub async fn is_authenticated(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// 편집 affordance 허용 여부 (admin/teacher 역할)
    pub async fn can_edit(&self) -> bool {
        self.current
            .read()
            .await
            .as_ref()
            .map(|p| p.can_edit())
            .unwrap_or(false)
    }

    // 키체인 저장은 best-effort: 실패해도 메모리 세션은 유지
    fn persist_profile(profile: &UserProfile) {
        let json = match serde_json::to_string(profile) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("[Session] Failed to serialize profile: {}", e);
                return;
            }
        };

        match Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_SESSION_PROFILE) {
            Ok(entry) => {
                if let Err(e) = entry.set_password(&json) {
                    eprintln!("[Session] Failed to persist session to keychain: {}", e);
                } else {
                    println!("[Session] Session persisted to keychain");
                }
            }
            Err(e) => eprintln!("[Session] Failed to create keychain entry: {}", e),
        }
    }

    fn load_persisted() -> Option<UserProfile> {
        let entry = Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_SESSION_PROFILE).ok()?;
        match entry.get_password() {
            Ok(json) => serde_json::from_str(&json).ok(),
            Err(keyring::Error::NoEntry) => None,
            Err(e) => {
                eprintln!("[Session] Failed to load session from keychain: {}", e);
                None
            }
        }
    }

    fn clear_persisted() {
        if let Ok(entry) = Entry::new(KEYCHAIN_SERVICE, KEYCHAIN_SESSION_PROFILE) {
            let _ = entry.delete_password();
        }
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
