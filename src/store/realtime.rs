//! Realtime Subscription
//!
//! 백엔드의 변경 스트림(SSE)을 구독해 `site_data` 변경 이벤트를
//! 핸들러에 전달합니다. 페이지 필터는 서버 측에서 적용됩니다.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use rand::Rng;
use reqwest_eventsource::{Event, EventSource};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::SupabaseConfig;
use crate::error::CseError;
use crate::models::ChangeEvent;

/// 변경 이벤트 핸들러
pub type ChangeHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;

/// 연결 수립 대기 한도
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// 스트림 에러 시 최대 재시도 횟수
const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// 활성 구독 핸들 (드롭 전에 `shutdown()`으로 해제)
pub struct RealtimeSubscription {
    page: String,
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RealtimeSubscription {
    /// SSE 스트림에 연결하고 이벤트 처리 태스크를 띄웁니다.
    ///
    /// 연결이 열린 것을 확인한 뒤에 반환하므로, 반환 이후 백엔드가
    /// 내보내는 이벤트는 순서대로 핸들러에 도착합니다.
    pub async fn connect(
        http: &reqwest::Client,
        config: &SupabaseConfig,
        page: &str,
        handler: ChangeHandler,
    ) -> Result<Self, CseError> {
        let filter = format!("page_name=eq.{}", page);
        let url = format!(
            "{}?table=site_data&filter={}",
            config.realtime_url(),
            urlencoding::encode(&filter)
        );

        println!("[Realtime] Connecting: {}", url);

        let request = http
            .get(&url)
            .header("apikey", &config.anon_key)
            .header("Authorization", format!("Bearer {}", config.anon_key))
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache");

        let mut es = EventSource::new(request)
            .map_err(|e| CseError::Subscription(format!("Failed to create EventSource: {}", e)))?;

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (ready_tx, ready_rx) = oneshot::channel::<()>();
        let page_name = page.to_string();

        let task = tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            let mut attempts: u32 = 0;

            loop {
                tokio::select! {
                    event = es.next() => {
                        match event {
                            Some(Ok(Event::Open)) => {
                                println!("[Realtime] Stream opened for page '{}'", page_name);
                                attempts = 0;
                                if let Some(tx) = ready_tx.take() {
                                    let _ = tx.send(());
                                }
                            }
                            Some(Ok(Event::Message(msg))) => match msg.event.as_str() {
                                "change" => {
                                    match serde_json::from_str::<ChangeEvent>(&msg.data) {
                                        Ok(change) => handler(change),
                                        Err(e) => {
                                            eprintln!(
                                                "[Realtime] Malformed change payload: {} - {}",
                                                e, msg.data
                                            );
                                        }
                                    }
                                }
                                other => {
                                    println!("[Realtime] Ignoring event '{}': {}", other, msg.data);
                                }
                            },
                            Some(Err(e)) => {
                                attempts += 1;
                                if attempts > MAX_RECONNECT_ATTEMPTS {
                                    eprintln!(
                                        "[Realtime] Giving up after {} reconnect attempts: {}",
                                        MAX_RECONNECT_ATTEMPTS, e
                                    );
                                    es.close();
                                    break;
                                }

                                // 지수 백오프 + 지터, 최대 30초
                                let base_delay_ms = 1000u64 * (1u64 << (attempts - 1));
                                let jitter_ms = rand::thread_rng().gen_range(0..1000);
                                let delay_ms = std::cmp::min(base_delay_ms + jitter_ms, 30_000);

                                eprintln!(
                                    "[Realtime] Stream error (attempt {}): {}. Retrying in {}ms...",
                                    attempts, e, delay_ms
                                );
                                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                            }
                            None => {
                                println!("[Realtime] Stream ended for page '{}'", page_name);
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        println!("[Realtime] Unsubscribing page '{}'", page_name);
                        es.close();
                        break;
                    }
                }
            }
        });

        // 스트림이 열릴 때까지 대기 (한도 초과 시 태스크 정리 후 실패)
        match tokio::time::timeout(CONNECT_TIMEOUT, ready_rx).await {
            Ok(Ok(())) => Ok(RealtimeSubscription {
                page: page.to_string(),
                shutdown_tx,
                task,
            }),
            _ => {
                let _ = shutdown_tx.send(()).await;
                task.abort();
                Err(CseError::Subscription(format!(
                    "Timed out connecting realtime stream for page '{}'",
                    page
                )))
            }
        }
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    /// 구독 해제: 태스크에 종료 신호를 보내고 끝날 때까지 기다립니다.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}
