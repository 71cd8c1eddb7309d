//! Page Binder
//!
//! 콘텐츠 캐시와 렌더 슬롯 사이의 다리.
//!
//! 원 사이트는 DOM을 순회하며 편집 가능한 요소를 찾았지만, 여기서는
//! 구역 이름 ↔ 렌더 대상 매핑을 명시적 레지스트리로 선언합니다.
//! 캐시는 활성 페이지 전용이며, 페이지 전환/재조회 시 병합 없이 통째로
//! 교체됩니다.

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::models::{ChangeEvent, ChangeEventType, SectionRecord};

/// 편집 가능한 슬롯 종류 (원 페이지의 태그 화이트리스트에 대응)
pub static DEFAULT_EDITABLE_KINDS: Lazy<Vec<&'static str>> =
    Lazy::new(|| vec!["heading", "paragraph", "content", "list_item", "cell"]);

/// 실시간 하이라이트 유지 시간 (UX 전용)
const HIGHLIGHT_TTL_SECS: i64 = 2;

/// 렌더 대상 한 칸
#[derive(Debug, Clone)]
pub struct RenderSlot {
    /// 명시적 요소 id (1순위 매칭 키)
    pub element_id: Option<String>,
    /// 구조적 구역 속성 (2순위 매칭 키, `data-section` 대응)
    pub section_attr: Option<String>,
    /// 슬롯 종류 라벨 (위치 기반 이름 유도에 사용)
    pub kind: String,
    /// 편집기 자체 UI 영역이면 true (편집 대상에서 제외)
    pub editor_ui: bool,
    content: String,
    loaded: bool,
}

impl RenderSlot {
    pub fn with_id(kind: &str, element_id: &str) -> Self {
        RenderSlot {
            element_id: Some(element_id.to_string()),
            section_attr: None,
            kind: kind.to_string(),
            editor_ui: false,
            content: String::new(),
            loaded: false,
        }
    }

    pub fn with_attr(kind: &str, section_attr: &str) -> Self {
        RenderSlot {
            element_id: None,
            section_attr: Some(section_attr.to_string()),
            kind: kind.to_string(),
            editor_ui: false,
            content: String::new(),
            loaded: false,
        }
    }

    /// 자연 식별자가 없는 슬롯 (이름은 위치 기반으로 유도됨)
    pub fn anonymous(kind: &str) -> Self {
        RenderSlot {
            element_id: None,
            section_attr: None,
            kind: kind.to_string(),
            editor_ui: false,
            content: String::new(),
            loaded: false,
        }
    }

    pub fn editor_ui(mut self) -> Self {
        self.editor_ui = true;
        self
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

/// 캐시된 구역 하나
#[derive(Debug, Clone)]
pub struct CachedSection {
    pub content: String,
    /// 서버 상태 기준 digest (로컬 편집 감지용)
    pub digest: String,
    pub dirty: bool,
    pub updated_at: Option<DateTime<Utc>>,
    /// 실시간 반영 시각 (하이라이트 UX 전용)
    pub highlighted_at: Option<DateTime<Utc>>,
}

/// 활성 페이지의 바인더
pub struct PageBinder {
    page: String,
    slots: Vec<RenderSlot>,
    cache: HashMap<String, CachedSection>,
}

impl PageBinder {
    pub fn new(page: &str) -> Self {
        PageBinder {
            page: page.to_string(),
            slots: Vec::new(),
            cache: HashMap::new(),
        }
    }

    pub fn current_page(&self) -> &str {
        &self.page
    }

    pub fn register_slot(&mut self, slot: RenderSlot) {
        self.slots.push(slot);
    }

    pub fn register_slots(&mut self, slots: impl IntoIterator<Item = RenderSlot>) {
        self.slots.extend(slots);
    }

    pub fn slots(&self) -> &[RenderSlot] {
        &self.slots
    }

    /// 페이지 전환: 캐시는 병합 없이 교체, 슬롯 렌더 상태 초기화
    pub fn switch_page(&mut self, page: &str) {
        if self.page != page {
            println!("[Binder] Page switch: {} -> {}", self.page, page);
        }
        self.page = page.to_string();
        self.cache.clear();
        for slot in &mut self.slots {
            slot.content.clear();
            slot.loaded = false;
        }
    }

    /// 조회 결과 전체를 반영: 캐시를 통째로 재구축한 뒤 슬롯에 적용.
    /// 매칭되는 슬롯이 없는 구역은 조용히 건너뜁니다.
    pub fn load_contents(&mut self, records: &[SectionRecord]) -> usize {
        self.cache.clear();

        let mut applied = 0;
        for record in records {
            self.cache.insert(
                record.section_name.clone(),
                CachedSection {
                    content: record.content.clone(),
                    digest: content_digest(&record.content),
                    dirty: false,
                    updated_at: record.updated_at,
                    highlighted_at: None,
                },
            );

            if self.apply_one(&record.section_name, &record.content) {
                applied += 1;
            }
        }

        println!(
            "[Binder] Loaded {} sections, {} applied to slots",
            records.len(),
            applied
        );
        applied
    }

    /// 구역 하나를 슬롯에 반영. 매칭 슬롯이 없으면 false (에러 아님).
    ///
    /// 요소 id 매칭이 구역 속성 매칭보다 항상 우선합니다.
    fn apply_one(&mut self, section_name: &str, content: &str) -> bool {
        let index = self
            .slots
            .iter()
            .position(|s| s.element_id.as_deref() == Some(section_name))
            .or_else(|| {
                self.slots
                    .iter()
                    .position(|s| s.section_attr.as_deref() == Some(section_name))
            });

        match index {
            Some(i) => {
                let slot = &mut self.slots[i];
                slot.content = content.to_string();
                slot.loaded = true;
                true
            }
            None => false,
        }
    }

    /// 실시간 이벤트 한 건 반영.
    ///
    /// INSERT/UPDATE는 캐시 갱신 + 슬롯 적용 + 하이라이트,
    /// DELETE는 캐시 항목 제거만 수행합니다(렌더된 내용은 유지).
    pub fn apply_event(&mut self, event: &ChangeEvent) -> bool {
        match event.event_type {
            ChangeEventType::Insert | ChangeEventType::Update => {
                let Some(record) = event.new_record.as_ref() else {
                    return false;
                };

                self.cache.insert(
                    record.section_name.clone(),
                    CachedSection {
                        content: record.content.clone(),
                        digest: content_digest(&record.content),
                        dirty: false,
                        updated_at: record.updated_at,
                        highlighted_at: Some(Utc::now()),
                    },
                );

                let applied = self.apply_one(&record.section_name, &record.content);
                if applied {
                    println!("[Binder] Live update applied: {}", record.section_name);
                }
                applied
            }
            ChangeEventType::Delete => {
                if let Some(name) = event.section_name() {
                    self.cache.remove(name);
                }
                false
            }
        }
    }

    /// 편집 가능한 슬롯마다 유도된 구역 이름을 배정합니다.
    ///
    /// 이름 우선순위: 요소 id > 구역 속성 > 위치 기반 `{kind}_{n}`.
    /// 위치 기반 이름은 슬롯에 다시 기록되어 같은 세션 안에서는
    /// 편집→저장 왕복에 안정적으로 쓰입니다. 편집기 UI 슬롯과
    /// 화이트리스트 밖의 종류는 제외.
    pub fn collect_editable(&mut self) -> Vec<(usize, String)> {
        let mut kind_counters: HashMap<String, usize> = HashMap::new();
        let mut editable = Vec::new();

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.editor_ui || !DEFAULT_EDITABLE_KINDS.contains(&slot.kind.as_str()) {
                continue;
            }

            let position = kind_counters.entry(slot.kind.clone()).or_insert(0);
            let name = if let Some(id) = &slot.element_id {
                id.clone()
            } else if let Some(attr) = &slot.section_attr {
                attr.clone()
            } else {
                let derived = format!("{}_{}", slot.kind, position);
                slot.section_attr = Some(derived.clone());
                derived
            };
            *position += 1;

            editable.push((index, name));
        }

        editable
    }

    /// 로컬 편집 반영: 캐시에 dirty로 기록하고 슬롯에도 적용
    pub fn edit_section(&mut self, section_name: &str, content: &str) {
        let entry = self
            .cache
            .entry(section_name.to_string())
            .or_insert_with(|| CachedSection {
                content: String::new(),
                digest: String::new(),
                dirty: false,
                updated_at: None,
                highlighted_at: None,
            });

        entry.content = content.to_string();
        entry.dirty = entry.digest != content_digest(content);
        self.apply_one(section_name, content);
    }

    /// 저장이 필요한 (로컬에서 바뀐) 구역들
    pub fn dirty_sections(&self) -> Vec<(String, String)> {
        let mut dirty: Vec<(String, String)> = self
            .cache
            .iter()
            .filter(|(_, c)| c.dirty)
            .map(|(name, c)| (name.clone(), c.content.clone()))
            .collect();
        dirty.sort_by(|a, b| a.0.cmp(&b.0));
        dirty
    }

    /// 저장 성공 후 호출: digest를 서버 상태로 갱신
    pub fn mark_saved(&mut self, section_name: &str, timestamp: Option<DateTime<Utc>>) {
        if let Some(entry) = self.cache.get_mut(section_name) {
            entry.digest = content_digest(&entry.content);
            entry.dirty = false;
            entry.updated_at = timestamp;
        }
    }

    /// 삭제된 구역을 캐시에서 제거 (렌더된 내용은 유지)
    pub fn forget_section(&mut self, section_name: &str) {
        self.cache.remove(section_name);
    }

    pub fn cached_content(&self, section_name: &str) -> Option<&str> {
        self.cache.get(section_name).map(|c| c.content.as_str())
    }

    pub fn cached_sections(&self) -> &HashMap<String, CachedSection> {
        &self.cache
    }

    /// 만료된 하이라이트 정리. 정리한 개수를 돌려줍니다.
    pub fn clear_expired_highlights(&mut self) -> usize {
        let cutoff = Utc::now() - ChronoDuration::seconds(HIGHLIGHT_TTL_SECS);
        let mut cleared = 0;
        for section in self.cache.values_mut() {
            if let Some(at) = section.highlighted_at {
                if at < cutoff {
                    section.highlighted_at = None;
                    cleared += 1;
                }
            }
        }
        cleared
    }
}

fn content_digest(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(page: &str, section: &str, content: &str) -> SectionRecord {
        SectionRecord {
            page_name: page.to_string(),
            section_name: section.to_string(),
            content: content.to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    fn home_binder() -> PageBinder {
        let mut binder = PageBinder::new("home");
        binder.register_slots([
            RenderSlot::with_id("heading", "title"),
            RenderSlot::with_attr("paragraph", "intro"),
            RenderSlot::anonymous("heading"),
            RenderSlot::with_id("panel", "editor-panel").editor_ui(),
        ]);
        binder
    }

    #[test]
    fn test_apply_sets_matching_slot_content() {
        let mut binder = home_binder();
        let applied = binder.load_contents(&[record("home", "title", "Hi")]);

        assert_eq!(applied, 1);
        let slot = &binder.slots()[0];
        assert_eq!(slot.content(), "Hi");
        assert!(slot.is_loaded());
    }

    #[test]
    fn test_unmatched_section_is_skipped_silently() {
        let mut binder = home_binder();
        let applied = binder.load_contents(&[record("home", "no_such_slot", "x")]);

        assert_eq!(applied, 0);
        assert!(binder.slots().iter().all(|s| !s.is_loaded()));
        // 캐시에는 남는다: 페이지가 모든 구역을 렌더할 필요는 없음
        assert_eq!(binder.cached_content("no_such_slot"), Some("x"));
    }

    #[test]
    fn test_attr_match_is_second_priority() {
        let mut binder = home_binder();
        binder.load_contents(&[record("home", "intro", "<p>소개</p>")]);
        assert_eq!(binder.slots()[1].content(), "<p>소개</p>");
    }

    #[test]
    fn test_collect_editable_names_are_stable_and_skip_editor_ui() {
        let mut binder = home_binder();
        let first = binder.collect_editable();
        let second = binder.collect_editable();

        let names: Vec<&str> = first.iter().map(|(_, n)| n.as_str()).collect();
        assert_eq!(names, vec!["title", "intro", "heading_1"]);
        assert_eq!(first, second);
        // 편집기 UI 슬롯은 목록에 없다
        assert!(!names.contains(&"editor-panel"));
    }

    #[test]
    fn test_positional_name_round_trips_after_assignment() {
        let mut binder = PageBinder::new("home");
        binder.register_slot(RenderSlot::anonymous("heading"));

        let editable = binder.collect_editable();
        assert_eq!(editable[0].1, "heading_0");

        // 유도된 이름으로 적용하면 같은 슬롯에 닿는다
        let applied = binder.load_contents(&[record("home", "heading_0", "Welcome")]);
        assert_eq!(applied, 1);
        assert_eq!(binder.slots()[0].content(), "Welcome");
    }

    #[test]
    fn test_page_switch_replaces_cache_and_resets_slots() {
        let mut binder = home_binder();
        binder.load_contents(&[record("home", "title", "Hi")]);
        assert!(binder.cached_content("title").is_some());

        binder.switch_page("about");
        assert_eq!(binder.current_page(), "about");
        assert!(binder.cached_content("title").is_none());
        assert!(!binder.slots()[0].is_loaded());
    }

    #[test]
    fn test_edit_and_dirty_tracking() {
        let mut binder = home_binder();
        binder.load_contents(&[record("home", "title", "Hi")]);
        assert!(binder.dirty_sections().is_empty());

        binder.edit_section("title", "Hello");
        assert_eq!(
            binder.dirty_sections(),
            vec![("title".to_string(), "Hello".to_string())]
        );

        // 원래 내용으로 되돌리면 dirty가 풀린다
        binder.edit_section("title", "Hi");
        assert!(binder.dirty_sections().is_empty());

        binder.edit_section("title", "Hello again");
        binder.mark_saved("title", Some(Utc::now()));
        assert!(binder.dirty_sections().is_empty());
    }

    #[test]
    fn test_apply_event_updates_slot_and_highlights() {
        let mut binder = home_binder();
        binder.load_contents(&[record("home", "title", "Welcome")]);

        let event = ChangeEvent {
            event_type: ChangeEventType::Update,
            new_record: Some(record("home", "title", "Welcome Back")),
            old_record: None,
        };

        assert!(binder.apply_event(&event));
        assert_eq!(binder.slots()[0].content(), "Welcome Back");
        assert!(binder.cached_sections()["title"].highlighted_at.is_some());
    }

    #[test]
    fn test_delete_event_removes_cache_entry_only() {
        let mut binder = home_binder();
        binder.load_contents(&[record("home", "title", "Hi")]);

        let event = ChangeEvent {
            event_type: ChangeEventType::Delete,
            new_record: None,
            old_record: Some(record("home", "title", "Hi")),
        };

        assert!(!binder.apply_event(&event));
        assert!(binder.cached_content("title").is_none());
        // 렌더된 내용은 그대로 둔다
        assert_eq!(binder.slots()[0].content(), "Hi");
    }
}
