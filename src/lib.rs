//! ClubSite - Content Sync Backend Library
//!
//! 학교 동아리 웹사이트의 콘텐츠 동기화/편집 백엔드.
//! 원격 스토어 접근, 재시도/배치 정책, 페이지 바인딩, 세션 게이트를 담당합니다.

pub mod binder;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use binder::PageBinder;
use commands::editor::EditorPanel;
use config::SupabaseConfig;
use error::CseError;
use session::SessionManager;
use store::SiteStore;

/// 시작 시 활성화되는 기본 페이지
pub const DEFAULT_PAGE: &str = "home";

fn is_valid_env_key(key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    // 관례적으로 ENV 키는 A-Z0-9_ 로 제한 (SUPABASE_*, VITE_* 등)
    key.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn try_load_env_lenient(path: &Path) -> std::io::Result<usize> {
    let text = std::fs::read_to_string(path)?;
    let mut loaded = 0usize;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        // dotenvy는 markdown 같은 "KEY=VALUE" 외 라인에서 실패할 수 있으므로,
        // lenient 모드에서는 주석/코드펜스/설명 라인을 최대한 무시합니다.
        if line.starts_with('#') || line.starts_with("```") {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line).trim();
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let key = k.trim();
        if !is_valid_env_key(key) {
            continue;
        }
        // 이미 설정된 값이 "비어있지 않으면" 덮어쓰지 않음.
        // (특정 런처/환경에서 빈 문자열로 미리 주입되는 케이스를 방지)
        if let Ok(existing) = std::env::var(key) {
            if !existing.trim().is_empty() {
                continue;
            }
        }

        let mut value = v.trim().to_string();
        // 간단한 quote 제거 ("..." / '...')
        if (value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\''))
        {
            value = value[1..value.len().saturating_sub(1)].to_string();
        }

        std::env::set_var(key, value);
        loaded += 1;
    }

    Ok(loaded)
}

fn find_upwards(start: PathBuf, filename: &str, max_hops: usize) -> Option<PathBuf> {
    let mut cur = start;
    for _ in 0..=max_hops {
        let candidate = cur.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        if !cur.pop() {
            break;
        }
    }
    None
}

/// `.env.local`에서 Supabase 설정을 로드합니다.
///
/// anon 키는 정적 페이지에 노출해도 되는 publishable 키지만, 배포 환경마다
/// 달라지므로 소스가 아니라 env 파일에서 읽습니다.
pub fn load_env() {
    // 1) 가장 단순한 케이스: CWD 기준 (.env.local)
    if dotenvy::from_filename(".env.local").is_ok() {
        return;
    }

    // 2) CWD가 프로젝트 루트가 아닐 수 있으니, 상위로 올라가며 탐색
    let mut candidates: Vec<PathBuf> = vec![];
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_upwards(cwd, ".env.local", 6) {
            candidates.push(p);
        }
    }

    // 3) 실행 파일 위치 기준으로도 탐색 (cargo run 환경 대응)
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_upwards(dir.to_path_buf(), ".env.local", 8) {
                candidates.push(p);
            }
        }
    }

    // 후보 중 하나라도 성공하면 OK
    for p in candidates {
        // strict 파서 우선
        if dotenvy::from_path(&p).is_ok() {
            return;
        }
        // strict 파서가 실패하면(예: markdown 포함), lenient 로더로 보강
        if let Ok(loaded) = try_load_env_lenient(&p) {
            if loaded > 0 {
                return;
            }
        }
    }
}

/// 앱 전역 컨텍스트
///
/// 시작 시 한 번 만들어 모든 명령에 참조로 전달합니다.
/// 바인더는 활성 페이지의 콘텐츠 캐시를 단독 소유합니다.
pub struct AppContext {
    pub config: SupabaseConfig,
    pub store: SiteStore,
    pub session: SessionManager,
    pub binder: Arc<Mutex<PageBinder>>,
    pub panel: Arc<Mutex<EditorPanel>>,
}

impl AppContext {
    /// 환경 변수(.env.local 포함)에서 설정을 읽어 초기화
    pub async fn init() -> Result<Self, CseError> {
        load_env();
        let _ = dotenvy::dotenv();

        let config = SupabaseConfig::from_env()?;
        Self::with_config(config).await
    }

    /// 주어진 설정으로 초기화
    pub async fn with_config(config: SupabaseConfig) -> Result<Self, CseError> {
        let store = SiteStore::new(config.clone())?;

        if config.auto_test_connection {
            let probe = store.test_connection().await;
            if probe.success {
                println!("[App] {}", probe.message);
            } else {
                eprintln!("[App] Connection test failed: {}", probe.message);
            }
        }

        Ok(AppContext {
            config,
            store,
            session: SessionManager::new(),
            binder: Arc::new(Mutex::new(PageBinder::new(DEFAULT_PAGE))),
            panel: Arc::new(Mutex::new(EditorPanel::new())),
        })
    }
}
