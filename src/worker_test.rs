use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::config::{QueueConfig, RemoteConfig};
use crate::sink::{CsvAppendLog, RemotePushSink};

/// Capability that replays a fixed script of responses
struct ScriptedCapability {
    responses: Mutex<VecDeque<Result<String, ExplainError>>>,
    session_opens: Mutex<VecDeque<Result<SessionId, ExplainError>>>,
    calls: AtomicU64,
    sessions_opened: AtomicU64,
    call_delay: Duration,
}

impl ScriptedCapability {
    fn new(responses: Vec<Result<String, ExplainError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            session_opens: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            call_delay: Duration::ZERO,
        }
    }

    fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }

    fn with_session_opens(self, opens: Vec<Result<SessionId, ExplainError>>) -> Self {
        *self.session_opens.lock() = opens.into();
        self
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExplainCapability for ScriptedCapability {
    async fn open_session(&self) -> Result<SessionId, ExplainError> {
        self.sessions_opened.fetch_add(1, Ordering::SeqCst);
        match self.session_opens.lock().pop_front() {
            Some(result) => result,
            None => Ok(SessionId::new("s1")),
        }
    }

    async fn explain(
        &self,
        _session: &SessionId,
        _request: &ExplainRequest,
    ) -> Result<String, ExplainError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.call_delay.is_zero() {
            tokio::time::sleep(self.call_delay).await;
        }
        match self.responses.lock().pop_front() {
            Some(result) => result,
            None => Ok("__SKIP__".into()),
        }
    }
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_millis(100),
        total_budget: Duration::from_secs(5),
    }
}

fn request() -> ExplainRequest {
    ExplainRequest {
        term: "MES".into(),
        category: "Product".into(),
        context: "MES 알람이 떴어요".into(),
    }
}

fn fanout_with_dead_remote(dir: &TempDir, metrics: Arc<PipelineMetrics>) -> Arc<SinkFanout> {
    let remote = RemoteConfig {
        base_url: "http://127.0.0.1:9".into(),
        meeting_id: "m1".into(),
        connect_timeout: Duration::from_millis(50),
        read_timeout: Duration::from_millis(50),
    };
    Arc::new(SinkFanout::new(
        CsvAppendLog::create(dir.path()).unwrap(),
        RemotePushSink::new(&remote).unwrap(),
        metrics,
    ))
}

fn task(entity: &str) -> Task {
    Task {
        timestamp: "t1".into(),
        category: "Product".into(),
        entity: entity.into(),
        confidence: 0.9,
        source_context: "ctx".into(),
    }
}

#[test]
fn test_backoff_doubles_with_bounded_jitter() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(800),
        attempt_timeout: Duration::from_secs(25),
        total_budget: Duration::from_secs(60),
    };

    for _ in 0..50 {
        let first = policy.backoff_delay(1);
        assert!(first >= Duration::from_millis(800), "{first:?}");
        assert!(first < Duration::from_millis(960), "{first:?}");

        let second = policy.backoff_delay(2);
        assert!(second >= Duration::from_millis(1600), "{second:?}");
        assert!(second < Duration::from_millis(1920), "{second:?}");
    }
}

#[tokio::test]
async fn test_retry_first_attempt_success() {
    let capability = ScriptedCapability::new(vec![Ok("Tech. a protocol.".into())]);
    let text = fast_policy()
        .call_with_retry(&capability, &SessionId::new("s1"), &request())
        .await
        .unwrap();
    assert_eq!(text, "Tech. a protocol.");
    assert_eq!(capability.calls(), 1);
}

#[tokio::test]
async fn test_retry_recovers_from_transient() {
    let capability = ScriptedCapability::new(vec![
        Err(ExplainError::Transient("503".into())),
        Err(ExplainError::Transient("reset".into())),
        Ok("Tech. a protocol.".into()),
    ]);
    let text = fast_policy()
        .call_with_retry(&capability, &SessionId::new("s1"), &request())
        .await
        .unwrap();
    assert_eq!(text, "Tech. a protocol.");
    assert_eq!(capability.calls(), 3);
}

#[tokio::test]
async fn test_retry_fatal_aborts_immediately() {
    let capability = ScriptedCapability::new(vec![
        Err(ExplainError::Unauthorized("401".into())),
        Ok("never reached".into()),
    ]);
    let err = fast_policy()
        .call_with_retry(&capability, &SessionId::new("s1"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, ExplainError::Unauthorized(_)));
    assert_eq!(capability.calls(), 1);
}

#[tokio::test]
async fn test_retry_exhausts_attempts() {
    let capability = ScriptedCapability::new(vec![
        Err(ExplainError::Transient("a".into())),
        Err(ExplainError::Transient("b".into())),
        Err(ExplainError::Transient("c".into())),
    ]);
    let err = fast_policy()
        .call_with_retry(&capability, &SessionId::new("s1"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, ExplainError::BudgetExceeded { attempts: 3 }));
    assert_eq!(capability.calls(), 3);
}

#[tokio::test]
async fn test_retry_attempt_timeout_counts_as_failure() {
    let capability = ScriptedCapability::new(vec![]).with_call_delay(Duration::from_millis(200));
    let policy = RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_millis(20),
        total_budget: Duration::from_secs(5),
    };
    let err = policy
        .call_with_retry(&capability, &SessionId::new("s1"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, ExplainError::BudgetExceeded { attempts: 2 }));
    assert_eq!(capability.calls(), 2);
}

#[tokio::test]
async fn test_retry_total_budget_caps_attempts() {
    let capability = ScriptedCapability::new(vec![]).with_call_delay(Duration::from_millis(200));
    let policy = RetryPolicy {
        max_attempts: 10,
        base_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_millis(500),
        total_budget: Duration::from_millis(60),
    };
    let err = policy
        .call_with_retry(&capability, &SessionId::new("s1"), &request())
        .await
        .unwrap_err();
    assert!(matches!(err, ExplainError::BudgetExceeded { .. }));
    assert!(capability.calls() < 10);
}

async fn run_pool_until_drained(
    capability: Arc<ScriptedCapability>,
    tasks: Vec<Task>,
    workers: usize,
) -> (crate::metrics::PipelineSnapshot, String) {
    let dir = TempDir::new().unwrap();
    let metrics = Arc::new(PipelineMetrics::new());
    let queue = Arc::new(DispatchQueue::new(QueueConfig::default(), Arc::clone(&metrics)));
    for t in tasks {
        queue.offer(t);
    }
    let fanout = fanout_with_dead_remote(&dir, Arc::clone(&metrics));
    let log_path = fanout.log_path().to_path_buf();

    let config = WorkerConfig {
        count: workers,
        poll_interval: Duration::from_millis(10),
        retry_max_attempts: 2,
        retry_base_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_millis(200),
        total_timeout: Duration::from_secs(2),
    };
    let cancel = CancellationToken::new();
    let pool = WorkerPool::spawn(
        &config,
        Arc::clone(&queue),
        capability,
        fanout,
        Arc::clone(&metrics),
        cancel.clone(),
    );

    for _ in 0..200 {
        if queue.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();
    pool.join().await;

    let content = std::fs::read_to_string(log_path).unwrap();
    (metrics.snapshot(), content)
}

#[tokio::test]
async fn test_pool_delivers_explained_terms() {
    let capability = Arc::new(ScriptedCapability::new(vec![Ok(
        "Manufacturing. 생산 실행 시스템이다.".into(),
    )]));
    let (snapshot, log) =
        run_pool_until_drained(Arc::clone(&capability), vec![task("MES")], 1).await;

    assert_eq!(snapshot.tasks_completed, 1);
    assert_eq!(snapshot.log_rows_written, 1);
    assert!(log.contains("MES"));
    assert!(log.contains("생산 실행 시스템이다."));
    assert!(log.contains("Manufacturing"));
}

#[tokio::test]
async fn test_pool_counts_declines_without_rows() {
    let capability = Arc::new(ScriptedCapability::new(vec![
        Ok("__SKIP__".into()),
        Ok("OnlyALabel".into()),
    ]));
    let (snapshot, log) =
        run_pool_until_drained(Arc::clone(&capability), vec![task("a"), task("b")], 1).await;

    assert_eq!(snapshot.tasks_declined, 2);
    assert_eq!(snapshot.tasks_completed, 0);
    assert_eq!(snapshot.log_rows_written, 0);
    assert_eq!(log.lines().count(), 1);
}

#[tokio::test]
async fn test_pool_reuses_one_session_per_worker() {
    let capability = Arc::new(ScriptedCapability::new(vec![
        Ok("D. one.".into()),
        Ok("D. two.".into()),
        Ok("D. three.".into()),
    ]));
    let (snapshot, _) = run_pool_until_drained(
        Arc::clone(&capability),
        vec![task("a"), task("b"), task("c")],
        1,
    )
    .await;

    assert_eq!(snapshot.tasks_completed, 3);
    assert_eq!(capability.sessions_opened(), 1);
}

#[tokio::test]
async fn test_pool_session_open_failure_drops_task_and_recovers() {
    let capability = Arc::new(
        ScriptedCapability::new(vec![Ok("D. second task explained.".into())])
            .with_session_opens(vec![
                Err(ExplainError::Transient("agent create failed".into())),
                Ok(SessionId::new("s2")),
            ]),
    );
    let (snapshot, _) =
        run_pool_until_drained(Arc::clone(&capability), vec![task("a"), task("b")], 1).await;

    assert_eq!(snapshot.tasks_failed, 1);
    assert_eq!(snapshot.tasks_completed, 1);
    assert_eq!(capability.sessions_opened(), 2);
}

#[tokio::test]
async fn test_pool_task_failure_does_not_stop_worker() {
    let capability = Arc::new(ScriptedCapability::new(vec![
        Err(ExplainError::InvalidTarget("no such target".into())),
        Ok("D. still alive.".into()),
    ]));
    let (snapshot, log) =
        run_pool_until_drained(Arc::clone(&capability), vec![task("a"), task("b")], 1).await;

    assert_eq!(snapshot.tasks_failed, 1);
    assert_eq!(snapshot.tasks_completed, 1);
    assert!(log.contains("still alive."));
}
