use crate::agent::Agent;
use crate::error::{InvocationError, RoundError};
use crate::progress::Progress;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tracing::{info, warn};

/// Aborts every spawned task it still holds when dropped
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Run one task per agent in parallel and collect the results by agent name.
///
/// The pool is sized to the agent count. The first failing task aborts the
/// others and its error is returned; partial results are never handed out.
/// Dropping the returned future aborts the tasks as well.
pub async fn run_round<T, F, Fut>(
    label: &str,
    agents: &[Arc<Agent>],
    progress: &Progress,
    task: F,
) -> Result<BTreeMap<String, T>, RoundError>
where
    F: Fn(Arc<Agent>) -> Fut,
    Fut: Future<Output = Result<T, InvocationError>> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(agents.len().max(1)));
    let total = agents.len();

    info!("{}: dispatching {} agents", label, total);

    let mut futures = FuturesUnordered::new();
    let mut in_flight = AbortOnDrop(Vec::with_capacity(total));

    for (idx, agent) in agents.iter().enumerate() {
        info!("  - [{}/{}] {} queued", idx + 1, total, agent.name);

        let permit = semaphore.clone().acquire_owned().await?;
        let work = task(agent.clone());
        let progress = progress.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit; // hold until done
            let result = work.await;
            if result.is_ok() {
                progress.mark_agent_done();
            }
            result
        });
        in_flight.0.push(handle.abort_handle());

        let name = agent.name.clone();
        futures.push(async move { (name, handle.await) });
    }

    let mut results = BTreeMap::new();
    while let Some((name, joined)) = futures.next().await {
        match joined {
            Ok(Ok(value)) => {
                results.insert(name.clone(), value);
                info!("    ✓ [{}/{}] {} finished", results.len(), total, name);
            }
            Ok(Err(e)) => {
                warn!("    ✗ {} failed: {}", name, e);
                return Err(RoundError::Invocation {
                    round: label.to_string(),
                    source: e,
                });
            }
            Err(e) => {
                warn!("    ✗ task for {} did not complete: {}", name, e);
                return Err(RoundError::TaskPanicked {
                    round: label.to_string(),
                    agent: name,
                    message: e.to_string(),
                });
            }
        }
    }

    // Everything joined; nothing left to abort
    in_flight.0.clear();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Family;
    use crate::error::ProviderError;
    use crate::progress::Phase;
    use crate::provider::testing::ScriptedRunner;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    fn agents(n: usize) -> Vec<Arc<Agent>> {
        (0..n)
            .map(|i| {
                Arc::new(Agent {
                    name: format!("Agent{}", i),
                    family: Family::Gemini,
                    model: "m".to_string(),
                    workdir: PathBuf::from("."),
                    memo_dir: PathBuf::from("."),
                    backend: Arc::new(ScriptedRunner::new(Vec::new())),
                })
            })
            .collect()
    }

    fn failure(agent: &Agent) -> InvocationError {
        InvocationError::Exhausted {
            agent: agent.name.clone(),
            attempts: 4,
            source: ProviderError::NonZeroExit {
                code: 1,
                stderr: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_all_agents_dispatched_and_collected() {
        let roster = agents(4);
        let progress = Progress::new(0);
        progress.start_round(Phase::InitialReviews, roster.len());
        let dispatched = Arc::new(AtomicUsize::new(0));

        let counter = dispatched.clone();
        let results = run_round("round", &roster, &progress, |agent| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(format!("review by {}", agent.name)) }
        })
        .await
        .unwrap();

        assert_eq!(dispatched.load(Ordering::SeqCst), 4);
        assert_eq!(results.len(), 4);
        assert_eq!(results["Agent2"], "review by Agent2");
        assert_eq!(progress.snapshot().agents_done, 4);
    }

    #[tokio::test]
    async fn test_tasks_run_concurrently() {
        let roster = agents(3);
        let barrier = Arc::new(Barrier::new(3));

        // Completes only if all three tasks are in flight at once
        let results = tokio::time::timeout(
            Duration::from_secs(5),
            run_round("round", &roster, &Progress::new(0), |_| {
                let barrier = barrier.clone();
                async move {
                    barrier.wait().await;
                    Ok(())
                }
            }),
        )
        .await
        .expect("round deadlocked")
        .unwrap();

        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_first_failure_aborts_round() {
        let roster = agents(3);
        let slow_finished = Arc::new(AtomicBool::new(false));

        let flag = slow_finished.clone();
        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run_round("cross-check", &roster, &Progress::new(0), |agent| {
                let flag = flag.clone();
                async move {
                    match agent.name.as_str() {
                        "Agent1" => Err(failure(&agent)),
                        "Agent2" => {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            flag.store(true, Ordering::SeqCst);
                            Ok(())
                        }
                        _ => Ok(()),
                    }
                }
            }),
        )
        .await
        .expect("round should abort promptly")
        .unwrap_err();

        match err {
            RoundError::Invocation { round, source } => {
                assert_eq!(round, "cross-check");
                assert!(source.to_string().contains("Agent1"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!slow_finished.load(Ordering::SeqCst));
    }

    struct CountOnDrop(Arc<AtomicUsize>);

    impl Drop for CountOnDrop {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dropping_round_aborts_tasks() {
        let roster = agents(2);
        let dropped = Arc::new(AtomicUsize::new(0));

        let counter = dropped.clone();
        let outcome = tokio::time::timeout(
            Duration::from_millis(100),
            run_round("round", &roster, &Progress::new(0), |_| {
                let guard = CountOnDrop(counter.clone());
                async move {
                    let _guard = guard;
                    std::future::pending::<Result<(), InvocationError>>().await
                }
            }),
        )
        .await;
        assert!(outcome.is_err());

        // Aborted tasks are torn down by the runtime shortly after
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 2);
    }
}
