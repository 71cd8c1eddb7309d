//! Retry / Batch Policy
//!
//! 스토어 호출에 씌우는 복원력 래퍼. 별도 스토어가 아니라 정책 계층입니다.
//! - `with_retry`: 선형 백오프 재시도
//! - `batch_save`: 청크 단위 동시 저장 + 청크 간 지연

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;

use crate::error::CseError;
use crate::models::{BatchOutcome, SaveOutcome};

/// 작업을 최대 `max_attempts`회 수행. 실패한 n번째 시도 후 `backoff * n`만큼
/// 대기합니다(선형 백오프). 성공하면 즉시 반환, 마지막 실패는 그대로 전파.
///
/// Config/Validation 에러는 재시도해도 같은 결과이므로 즉시 전파합니다.
pub async fn with_retry<T, F, Fut>(
    mut operation: F,
    max_attempts: u32,
    backoff: Duration,
) -> Result<T, CseError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CseError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) if attempt < max_attempts && error.is_retryable() => {
                eprintln!(
                    "[Retry] Attempt {}/{} failed: {}. Retrying...",
                    attempt, max_attempts, error
                );
                tokio::time::sleep(backoff * attempt).await;
                attempt += 1;
            }
            Err(error) => return Err(error),
        }
    }
}

/// 여러 구역을 청크 단위로 저장합니다.
///
/// - 청크는 순차 처리, 청크 안의 항목은 동시에 발행
/// - 청크 사이에 `chunk_delay` 대기 (백엔드 과부하 방지)
/// - 일부 실패해도 남은 청크는 계속 실행되며, 하나라도 실패하면
///   집계 `success`는 false
pub async fn batch_save<F, Fut>(
    sections: Vec<(String, String)>,
    chunk_size: usize,
    chunk_delay: Duration,
    save: F,
) -> BatchOutcome
where
    F: Fn(String, String) -> Fut,
    Fut: Future<Output = SaveOutcome>,
{
    let batch_id = uuid::Uuid::new_v4().to_string();
    let chunk_size = chunk_size.max(1);
    let total = sections.len();
    let mut results: Vec<SaveOutcome> = Vec::with_capacity(total);

    if total <= chunk_size {
        // 소규모 배치는 나누지 않고 한 번에 동시 발행
        let futures = sections
            .into_iter()
            .map(|(name, content)| save(name, content));
        results.extend(join_all(futures).await);
    } else {
        let chunks: Vec<Vec<(String, String)>> = sections
            .chunks(chunk_size)
            .map(|c| c.to_vec())
            .collect();
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            let futures = chunk.into_iter().map(|(name, content)| save(name, content));
            results.extend(join_all(futures).await);

            if index + 1 < chunk_count {
                tokio::time::sleep(chunk_delay).await;
            }
        }
    }

    let successful = results.iter().filter(|r| r.success).count();
    let failed = results.len() - successful;

    println!(
        "[Batch] Completed: {} successful, {} failed (batch {})",
        successful, failed, batch_id
    );

    BatchOutcome {
        success: failed == 0,
        batch_id,
        results,
        total,
        successful,
        failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn backend_error() -> CseError {
        CseError::Backend {
            status: 503,
            message: "service unavailable".to_string(),
        }
    }

    #[tokio::test]
    async fn test_always_failing_op_attempted_exactly_max_times() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), CseError> = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(backend_error())
                }
            },
            3,
            Duration::from_millis(1),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_success_short_circuits_remaining_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 2 {
                        Err(backend_error())
                    } else {
                        Ok(n)
                    }
                }
            },
            5,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_validation_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), CseError> = with_retry(
            move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(CseError::Validation("empty section name".to_string()))
                }
            },
            4,
            Duration::from_millis(1),
        )
        .await;

        assert!(matches!(result, Err(CseError::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_aggregates_partial_failure() {
        let sections = vec![
            ("a".to_string(), "x".to_string()),
            ("b".to_string(), "y".to_string()),
        ];

        let outcome = batch_save(sections, 5, Duration::from_millis(1), |name, _content| async move {
            if name == "b" {
                SaveOutcome::failed(&name, "backend rejected")
            } else {
                SaveOutcome::ok(&name, crate::models::SaveAction::Created, chrono::Utc::now())
            }
        })
        .await;

        assert!(!outcome.success);
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.successful, 1);
        assert_eq!(outcome.failed, 1);
    }

    #[tokio::test]
    async fn test_large_batch_runs_every_chunk_despite_failures() {
        let saved = Arc::new(AtomicU32::new(0));
        let sections: Vec<(String, String)> = (0..7)
            .map(|i| (format!("section_{}", i), format!("content {}", i)))
            .collect();

        let counter = saved.clone();
        let outcome = batch_save(sections, 3, Duration::from_millis(1), move |name, _| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if name == "section_2" {
                    SaveOutcome::failed(&name, "boom")
                } else {
                    SaveOutcome::ok(&name, crate::models::SaveAction::Updated, chrono::Utc::now())
                }
            }
        })
        .await;

        // 첫 청크에서 실패가 나도 7건 전부 시도된다
        assert_eq!(saved.load(Ordering::SeqCst), 7);
        assert_eq!(outcome.total, 7);
        assert_eq!(outcome.successful, 6);
        assert_eq!(outcome.failed, 1);
        assert!(!outcome.success);
    }
}
