//! Concurrent resolution of one entity's related remote entities.
//!
//! [`resolve_many`] issues one fetch per related id, each in its own task,
//! and merges the outcomes all-or-nothing. The first error (in completion
//! order) wins: siblings are cancelled, partial results are dropped and the
//! error comes back as `OperationError::Aggregate` naming the id that failed.
//! On success results are returned in input order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::config::FanOutConfig;
use super::operation::{OperationContext, OperationError};

/// Resolves every id in `related_ids` concurrently through `fetch`.
///
/// Each fetch gets a child of `ctx`: the same deadline and a cancellation
/// token that fires when the parent is cancelled or a sibling fails. An
/// empty `related_ids` returns `Ok(vec![])` without spawning anything.
///
/// # Errors
///
/// `Aggregate { seed_id, related_id, source }` for the first failing id.
/// A fetch that panics reports `Internal` as its source. If `ctx` is
/// cancelled before every id resolves, returns `Cancelled`.
pub async fn resolve_many<E, F, Fut>(
    ctx: &OperationContext,
    seed_id: &str,
    related_ids: &[String],
    config: FanOutConfig,
    fetch: F,
) -> Result<Vec<E>, OperationError>
where
    E: Send + 'static,
    F: Fn(OperationContext, String) -> Fut,
    Fut: Future<Output = Result<E, OperationError>> + Send + 'static,
{
    if related_ids.is_empty() {
        return Ok(Vec::new());
    }

    let job = ctx.child();
    let limit = (config.max_concurrency > 0)
        .then(|| Arc::new(Semaphore::new(config.max_concurrency)));
    let mut tasks = JoinSet::new();

    for (index, id) in related_ids.iter().enumerate() {
        let unit_ctx = job.child();
        let cancel = unit_ctx.cancel.clone();
        let limit = limit.clone();
        let fut = fetch(unit_ctx, id.clone());
        tasks.spawn(async move {
            let _permit = match limit {
                Some(sem) => tokio::select! {
                    () = cancel.cancelled() => return (index, Err(OperationError::Cancelled)),
                    permit = sem.acquire_owned() => permit.ok(),
                },
                None => None,
            };
            let outcome = tokio::select! {
                () = cancel.cancelled() => Err(OperationError::Cancelled),
                res = AssertUnwindSafe(fut).catch_unwind() => res.unwrap_or_else(|panic| {
                    Err(OperationError::Internal(anyhow::anyhow!(
                        "fetch panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                }),
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<E>> = std::iter::repeat_with(|| None)
        .take(related_ids.len())
        .collect();
    let mut remaining = related_ids.len();

    while remaining > 0 {
        let joined = tokio::select! {
            () = ctx.cancel.cancelled() => {
                job.cancel.cancel();
                tasks.abort_all();
                return Err(OperationError::Cancelled);
            }
            joined = tasks.join_next() => joined,
        };
        let Some(joined) = joined else { break };
        let (index, outcome) = match joined {
            Ok(pair) => pair,
            // Panics are caught inside the task and aborts only happen on
            // the way out, so the index is lost only on runtime shutdown.
            Err(err) => {
                job.cancel.cancel();
                tasks.abort_all();
                return Err(OperationError::Internal(anyhow::anyhow!(
                    "fan-out task failed: {err}"
                )));
            }
        };
        match outcome {
            Ok(entity) => {
                slots[index] = Some(entity);
                remaining -= 1;
            }
            Err(source) => {
                job.cancel.cancel();
                tasks.abort_all();
                let related_id = related_ids[index].clone();
                warn!(seed_id, related_id = %related_id, error = %source, "fan-out failed");
                return Err(OperationError::Aggregate {
                    seed_id: seed_id.to_string(),
                    related_id,
                    source: Box::new(source),
                });
            }
        }
    }

    debug!(seed_id, resolved = related_ids.len(), "fan-out complete");
    slots
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| OperationError::Internal(anyhow::anyhow!("fan-out slot left empty")))
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use lms_core::{Course, ErrorKind};
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::service::middleware::testing::make_ctx;
    use crate::service::operation::methods;

    fn ids(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    fn course(id: &str) -> Course {
        Course {
            id: id.parse().unwrap(),
            name: format!("course-{id}"),
        }
    }

    #[tokio::test]
    async fn empty_input_never_calls_fetch() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let ctx = make_ctx(methods::GET_STUDENT_COURSES);
        let out = resolve_many(&ctx, "1", &[], FanOutConfig::default(), move |_, id| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move { Ok(course(&id)) }
        })
        .await
        .unwrap();
        assert!(out.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn all_success_preserves_input_order() {
        let ctx = make_ctx(methods::GET_STUDENT_COURSES);
        // Later ids finish first.
        let out = resolve_many(&ctx, "1", &ids(&["3", "2", "1"]), FanOutConfig::default(), |_, id| async move {
            let delay: u64 = id.parse().unwrap();
            tokio::time::sleep(Duration::from_millis(delay * 10)).await;
            Ok(course(&id))
        })
        .await
        .unwrap();
        let got: Vec<i64> = out.iter().map(|c| c.id).collect();
        assert_eq!(got, vec![3, 2, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failure_fails_the_whole_job() {
        let ctx = make_ctx(methods::GET_STUDENT_COURSES);
        let err = resolve_many(&ctx, "7", &ids(&["1", "2", "3"]), FanOutConfig::default(), |_, id| async move {
            if id == "2" {
                Err(OperationError::NotFound {
                    entity: "course",
                    id,
                })
            } else {
                Ok(course(&id))
            }
        })
        .await
        .unwrap_err();

        match err {
            OperationError::Aggregate {
                seed_id,
                related_id,
                source,
            } => {
                assert_eq!(seed_id, "7");
                assert_eq!(related_id, "2");
                assert_eq!(source.kind(), ErrorKind::NotFound);
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn siblings_are_cancelled_on_first_error() {
        let ctx = make_ctx(methods::GET_STUDENT_COURSES);
        let tokens = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let captured = Arc::clone(&tokens);
        let related = ids(&["1", "2", "3"]);
        let err = resolve_many(&ctx, "1", &related, FanOutConfig::default(), move |unit, id| {
            captured.lock().push(unit.cancel.clone());
            async move {
                if id == "1" {
                    return Err(OperationError::RemoteUnavailable {
                        dependency: "courses",
                        reason: "refused".to_string(),
                    });
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(course(&id))
            }
        })
        .await
        .unwrap_err();

        assert!(err.is_aggregate());
        assert_eq!(err.kind(), ErrorKind::RemoteUnavailable);
        assert_eq!(tokens.lock().len(), 3);
        assert!(tokens.lock().iter().all(CancellationToken::is_cancelled));
        assert!(!ctx.cancel.is_cancelled(), "parent context stays usable");
    }

    #[tokio::test]
    async fn panicking_fetch_surfaces_as_internal() {
        let ctx = make_ctx(methods::GET_STUDENT_COURSES);
        let err = resolve_many(&ctx, "1", &ids(&["1", "2"]), FanOutConfig::default(), |_, id| async move {
            if id == "2" {
                panic!("decoder exploded");
            }
            Ok(course(&id))
        })
        .await
        .unwrap_err();
        match err {
            OperationError::Aggregate {
                related_id, source, ..
            } => {
                assert_eq!(related_id, "2");
                assert!(source.to_string().contains("decoder exploded"));
                assert_eq!(source.kind(), ErrorKind::Internal);
            }
            other => panic!("expected aggregate, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let ctx = make_ctx(methods::GET_STUDENT_COURSES);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (Arc::clone(&active), Arc::clone(&peak));
        let related = ids(&["1", "2", "3", "4", "5", "6"]);
        let out = resolve_many(&ctx, "1", &related, FanOutConfig { max_concurrency: 2 }, move |_, id| {
            let (a, p) = (Arc::clone(&a), Arc::clone(&p));
            async move {
                let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                a.fetch_sub(1, Ordering::SeqCst);
                Ok(course(&id))
            }
        })
        .await
        .unwrap();
        assert_eq!(out.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_stops_the_job() {
        let ctx = make_ctx(methods::GET_STUDENT_COURSES);
        let trigger = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });
        let err = resolve_many(&ctx, "1", &ids(&["1"]), FanOutConfig::default(), |_, id| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(course(&id))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, OperationError::Cancelled));
    }
}
