//! 테스트 지원: 가짜 PostgREST + SSE 백엔드
//!
//! `site_data` 한 테이블만 흉내 내는 인메모리 서버.
//! upsert/delete가 성공하면 해당 페이지 구독자에게 변경 이벤트를
//! 브로드캐스트합니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
struct StoredRow {
    id: i64,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct UpsertPayload {
    page_name: String,
    section_name: String,
    content: String,
    updated_at: DateTime<Utc>,
}

#[derive(Clone)]
struct ServerState {
    rows: Arc<Mutex<BTreeMap<(String, String), StoredRow>>>,
    next_id: Arc<Mutex<i64>>,
    fail_sections: Arc<Mutex<HashSet<String>>>,
    rest_requests: Arc<Mutex<usize>>,
    events_tx: broadcast::Sender<(String, String)>,
}

impl ServerState {
    fn bump(&self) {
        *self.rest_requests.lock().unwrap() += 1;
    }
}

/// 테스트용 가짜 백엔드 핸들
pub struct FakeBackend {
    addr: SocketAddr,
    state: ServerState,
}

impl FakeBackend {
    pub async fn spawn() -> Self {
        let (events_tx, _) = broadcast::channel(64);
        let state = ServerState {
            rows: Arc::new(Mutex::new(BTreeMap::new())),
            next_id: Arc::new(Mutex::new(1)),
            fail_sections: Arc::new(Mutex::new(HashSet::new())),
            rest_requests: Arc::new(Mutex::new(0)),
            events_tx,
        };

        let app = Router::new()
            .route(
                "/rest/v1/site_data",
                get(rest_get).post(rest_post).delete(rest_delete),
            )
            .route("/realtime/v1/changes", get(sse_changes))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        FakeBackend { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// 이후 이 구역에 대한 upsert가 500으로 실패하도록 설정
    pub fn fail_section(&self, section: &str) {
        self.state
            .fail_sections
            .lock()
            .unwrap()
            .insert(section.to_string());
    }

    pub fn row_count(&self, page: &str, section: &str) -> usize {
        if self
            .state
            .rows
            .lock()
            .unwrap()
            .contains_key(&(page.to_string(), section.to_string()))
        {
            1
        } else {
            0
        }
    }

    pub fn request_count(&self) -> usize {
        *self.state.rest_requests.lock().unwrap()
    }
}

fn filter_value<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.strip_prefix("eq."))
}

fn row_json(page: &str, section: &str, row: &StoredRow) -> Value {
    json!({
        "id": row.id,
        "page_name": page,
        "section_name": section,
        "content": row.content,
        "created_at": row.created_at.to_rfc3339(),
        "updated_at": row.updated_at.to_rfc3339(),
    })
}

async fn rest_get(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    state.bump();

    let page = filter_value(&params, "page_name");
    let section = filter_value(&params, "section_name");
    let limit = params.get("limit").and_then(|l| l.parse::<usize>().ok());

    let rows = state.rows.lock().unwrap();
    let mut matched: Vec<(String, String, StoredRow)> = rows
        .iter()
        .filter(|((p, s), _)| {
            page.map_or(true, |want| want == p.as_str())
                && section.map_or(true, |want| want == s.as_str())
        })
        .map(|((p, s), row)| (p.clone(), s.clone(), row.clone()))
        .collect();

    match params.get("order").map(String::as_str) {
        Some("updated_at.desc") => matched.sort_by(|a, b| b.2.updated_at.cmp(&a.2.updated_at)),
        _ => matched.sort_by_key(|(_, _, row)| row.id),
    }
    if let Some(limit) = limit {
        matched.truncate(limit);
    }

    let body: Vec<Value> = matched
        .iter()
        .map(|(p, s, row)| row_json(p, s, row))
        .collect();
    Json(json!(body))
}

async fn rest_post(
    State(state): State<ServerState>,
    Json(payload): Json<Vec<UpsertPayload>>,
) -> (StatusCode, Json<Value>) {
    state.bump();

    for row in payload {
        if state
            .fail_sections
            .lock()
            .unwrap()
            .contains(&row.section_name)
        {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"code": "P0001", "message": "injected failure"})),
            );
        }

        let key = (row.page_name.clone(), row.section_name.clone());
        let (event_type, new_row, old_row) = {
            let mut rows = state.rows.lock().unwrap();
            match rows.get(&key).cloned() {
                Some(existing) => {
                    let updated = StoredRow {
                        id: existing.id,
                        content: row.content.clone(),
                        created_at: existing.created_at,
                        updated_at: row.updated_at,
                    };
                    rows.insert(key.clone(), updated.clone());
                    ("UPDATE", updated, Some(existing))
                }
                None => {
                    let mut next_id = state.next_id.lock().unwrap();
                    let created = StoredRow {
                        id: *next_id,
                        content: row.content.clone(),
                        created_at: row.updated_at,
                        updated_at: row.updated_at,
                    };
                    *next_id += 1;
                    rows.insert(key.clone(), created.clone());
                    ("INSERT", created, None)
                }
            }
        };

        let payload = json!({
            "eventType": event_type,
            "new": row_json(&key.0, &key.1, &new_row),
            "old": old_row.map(|old| row_json(&key.0, &key.1, &old)),
        });
        let _ = state.events_tx.send((key.0.clone(), payload.to_string()));
    }

    (StatusCode::CREATED, Json(json!([])))
}

async fn rest_delete(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> StatusCode {
    state.bump();

    let page = filter_value(&params, "page_name").unwrap_or_default().to_string();
    let section = filter_value(&params, "section_name")
        .unwrap_or_default()
        .to_string();

    let removed = state
        .rows
        .lock()
        .unwrap()
        .remove(&(page.clone(), section.clone()));

    if let Some(old) = removed {
        let payload = json!({
            "eventType": "DELETE",
            "new": null,
            "old": row_json(&page, &section, &old),
        });
        let _ = state.events_tx.send((page, payload.to_string()));
    }

    StatusCode::NO_CONTENT
}

async fn sse_changes(
    State(state): State<ServerState>,
    Query(params): Query<HashMap<String, String>>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let page = params
        .get("filter")
        .and_then(|f| f.strip_prefix("page_name=eq."))
        .unwrap_or_default()
        .to_string();

    let rx = state.events_tx.subscribe();
    let stream = futures::stream::unfold((rx, page), |(mut rx, page)| async move {
        loop {
            match rx.recv().await {
                Ok((event_page, payload)) => {
                    if event_page == page {
                        let event = SseEvent::default().event("change").data(payload);
                        return Some((Ok(event), (rx, page)));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
