// ============================================================================
// Delivery Pipeline
// ============================================================================
//
// Drives a single request through New -> Processing -> {Success |
// TemporaryFailure | PermanentFailure} while holding the per-request lock.
//
// The delivery timeout starts once the lock is held, so waiting on a
// contended lock ends as lock contention, never as a timeout. Every exit path
// releases the lock. Release runs on its own task so a cancelled caller
// cannot leave the key held until the TTL.
//
// ============================================================================

use crate::ledger::{EmailStatus, RequestLedger};
use crate::lock::{LockGuard, Locker, lock_key};
use crate::preparer::Preparer;
use crate::provider::EmailProvider;
use courier_config::{LockConfig, WorkerConfig};
use courier_error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub lock_key_prefix: String,
    pub lock_ttl: Duration,
    /// Upper bound on the work done while the lock is held
    pub delivery_timeout: Duration,
}

impl PipelineSettings {
    pub fn new(lock: &LockConfig, worker: &WorkerConfig) -> Self {
        Self {
            lock_key_prefix: lock.key_prefix.clone(),
            lock_ttl: lock.ttl(),
            delivery_timeout: worker.delivery_timeout(),
        }
    }
}

/// Successful pipeline results. All of them allow the log entry to be acked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Provider accepted the message and the ledger says `Success`
    Sent,
    /// The ledger already recorded `Success`; nothing was sent again
    AlreadyDelivered,
    /// No ledger record exists (admission compensated); nothing was sent
    Orphaned,
}

impl RunOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunOutcome::Sent => "sent",
            RunOutcome::AlreadyDelivered => "already_delivered",
            RunOutcome::Orphaned => "orphaned",
        }
    }
}

pub struct DeliveryPipeline {
    ledger: Arc<dyn RequestLedger>,
    locker: Arc<dyn Locker>,
    preparer: Arc<dyn Preparer>,
    provider: Arc<dyn EmailProvider>,
    settings: PipelineSettings,
}

impl DeliveryPipeline {
    pub fn new(
        ledger: Arc<dyn RequestLedger>,
        locker: Arc<dyn Locker>,
        preparer: Arc<dyn Preparer>,
        provider: Arc<dyn EmailProvider>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            ledger,
            locker,
            preparer,
            provider,
            settings,
        }
    }

    /// Deliver one request.
    pub async fn run(
        &self,
        request_id: &str,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> AppResult<RunOutcome> {
        validate(request_id, recipient, subject, content)?;

        debug!(request_id = %request_id, recipient = %recipient, "Sending raw email");

        let key = lock_key(&self.settings.lock_key_prefix, request_id);
        let guard = match LockGuard::acquire(self.locker.clone(), key, self.settings.lock_ttl).await
        {
            Ok(guard) => guard,
            Err(e) => {
                if e.is_contention() {
                    courier_metrics::LOCK_CONTENTION_TOTAL.inc();
                }
                warn!(request_id = %request_id, error = %e, "Failed to acquire lock");
                return Err(AppError::Lock(e));
            }
        };

        let timeout = self.settings.delivery_timeout;
        let result = tokio::time::timeout(
            timeout,
            self.run_locked(request_id, recipient, subject, content),
        )
        .await
        .unwrap_or_else(|_| {
            warn!(
                request_id = %request_id,
                timeout_secs = timeout.as_secs(),
                "Delivery timed out"
            );
            Err(AppError::Timeout(timeout.as_secs()))
        });

        if let Err(e) = guard.release().await {
            warn!(request_id = %request_id, error = %e, "Failed to release lock");
        }

        result
    }

    async fn run_locked(
        &self,
        request_id: &str,
        recipient: &str,
        subject: &str,
        content: &str,
    ) -> AppResult<RunOutcome> {
        match self.ledger.find(request_id).await? {
            None => {
                warn!(request_id = %request_id, "No ledger record; skipping send");
                return Ok(RunOutcome::Orphaned);
            }
            Some(record) if record.status == EmailStatus::Success => {
                debug!(request_id = %request_id, "Already delivered; skipping send");
                return Ok(RunOutcome::AlreadyDelivered);
            }
            Some(_) => {}
        }

        if let Err(e) = self
            .ledger
            .update_status(request_id, EmailStatus::Processing)
            .await
        {
            warn!(request_id = %request_id, error = %e, "Failed to set status=processing");
            return Err(e);
        }

        let raw = match self.preparer.prepare(recipient, subject, content).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "Prepare failed");
                let e = match e {
                    AppError::Preparation(_) => e,
                    other => AppError::preparation(other.to_string()),
                };
                return Err(self
                    .mark_failed(request_id, EmailStatus::TemporaryFailure, e)
                    .await);
            }
        };

        if let Err(e) = self.ledger.update_content(request_id, &raw).await {
            warn!(request_id = %request_id, error = %e, "Failed to store prepared content");
            return Err(self
                .mark_failed(request_id, EmailStatus::TemporaryFailure, e)
                .await);
        }

        if let Err(e) = self.provider.send_raw(recipient, &raw).await {
            warn!(request_id = %request_id, error = %e, "SendRaw failed");
            let e = match e {
                AppError::Provider(_) => e,
                other => AppError::provider(other.to_string()),
            };
            return Err(self
                .mark_failed(request_id, EmailStatus::PermanentFailure, e)
                .await);
        }

        // The send already happened; a failure here is reporting-only
        if let Err(e) = self
            .ledger
            .update_status(request_id, EmailStatus::Success)
            .await
        {
            warn!(request_id = %request_id, error = %e, "Failed to set status=success");
            return Err(e);
        }

        debug!(request_id = %request_id, "Send raw completed");
        Ok(RunOutcome::Sent)
    }

    /// Best-effort status downgrade after `primary` failed.
    ///
    /// Returns `primary` when the update succeeds, otherwise a compound error
    /// carrying both failures.
    async fn mark_failed(
        &self,
        request_id: &str,
        status: EmailStatus,
        primary: AppError,
    ) -> AppError {
        match self.ledger.update_status(request_id, status).await {
            Ok(()) => primary,
            Err(update_err) => {
                warn!(
                    request_id = %request_id,
                    status = %status,
                    error = %update_err,
                    "Failed to record failure status"
                );
                AppError::compensation(primary, update_err)
            }
        }
    }
}

fn validate(request_id: &str, recipient: &str, subject: &str, content: &str) -> AppResult<()> {
    if request_id.is_empty() {
        return Err(AppError::validation("request_id is required"));
    }
    if recipient.is_empty() {
        return Err(AppError::validation("recipient is required"));
    }
    if subject.is_empty() {
        return Err(AppError::validation("subject is required"));
    }
    if content.is_empty() {
        return Err(AppError::validation("content is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{EmailRequest, InMemoryLedger, LedgerOp};
    use crate::lock::{MemoryTokenStore, TokenLocker};
    use crate::preparer::{PreparerChain, RawMimeStep};
    use async_trait::async_trait;
    use courier_error::LockError;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records every lock call and can refuse acquisition
    #[derive(Default)]
    struct RecordingLocker {
        acquired: Mutex<Vec<String>>,
        released: Mutex<Vec<String>>,
        refuse: bool,
    }

    #[async_trait]
    impl Locker for RecordingLocker {
        async fn acquire(&self, key: &str, _ttl: Duration) -> Result<(), LockError> {
            if self.refuse {
                return Err(LockError::NotAcquired);
            }
            self.acquired.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn release(&self, key: &str) -> Result<(), LockError> {
            self.released.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }

    struct FailingPreparer;

    #[async_trait]
    impl Preparer for FailingPreparer {
        async fn prepare(&self, _: &str, _: &str, _: &str) -> AppResult<String> {
            Err(AppError::preparation("template missing"))
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        sent: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EmailProvider for CountingProvider {
        async fn send_raw(&self, _recipient: &str, _raw: &str) -> AppResult<()> {
            if self.fail {
                return Err(AppError::provider("mailbox unavailable"));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        ledger: Arc<InMemoryLedger>,
        locker: Arc<RecordingLocker>,
        provider: Arc<CountingProvider>,
        pipeline: DeliveryPipeline,
    }

    fn harness(
        locker: RecordingLocker,
        preparer: Arc<dyn Preparer>,
        provider: CountingProvider,
    ) -> Harness {
        let ledger = Arc::new(InMemoryLedger::new());
        let locker = Arc::new(locker);
        let provider = Arc::new(provider);
        let pipeline = DeliveryPipeline::new(
            ledger.clone(),
            locker.clone(),
            preparer,
            provider.clone(),
            PipelineSettings {
                lock_key_prefix: "notifications:email:".into(),
                lock_ttl: Duration::from_secs(120),
                delivery_timeout: Duration::from_secs(5),
            },
        );
        Harness {
            ledger,
            locker,
            provider,
            pipeline,
        }
    }

    fn mime() -> Arc<dyn Preparer> {
        let step = RawMimeStep::new("noreply@example.com");
        Arc::new(PreparerChain::new().with_step(step))
    }

    async fn seed(ledger: &InMemoryLedger, id: &str) {
        ledger
            .create(&EmailRequest::new(id, "a@b.com", "subj", "content-long"))
            .await
            .unwrap();
    }

    fn assert_locked_once(h: &Harness) {
        let key = "notifications:email:req-1".to_string();
        assert_eq!(*h.locker.acquired.lock().unwrap(), vec![key.clone()]);
        assert_eq!(*h.locker.released.lock().unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn test_success_path() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;

        let outcome = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Sent);
        assert_eq!(
            h.ledger.status_history("req-1").await,
            vec![EmailStatus::New, EmailStatus::Processing, EmailStatus::Success]
        );
        let record = h.ledger.get("req-1").await.unwrap();
        assert!(record.content.starts_with("From: noreply@example.com\r\n"));
        assert!(record.content.ends_with("\r\n\r\ncontent-long"));
        assert_eq!(h.provider.sent.load(Ordering::SeqCst), 1);
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_prepare_failure_marks_temporary() {
        let h = harness(
            RecordingLocker::default(),
            Arc::new(FailingPreparer),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Preparation(_)));
        assert_eq!(
            h.ledger.status_history("req-1").await,
            vec![
                EmailStatus::New,
                EmailStatus::Processing,
                EmailStatus::TemporaryFailure
            ]
        );
        assert_eq!(h.provider.sent.load(Ordering::SeqCst), 0);
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_prepare_failure_with_failed_compensation() {
        let h = harness(
            RecordingLocker::default(),
            Arc::new(FailingPreparer),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;
        h.ledger
            .fail_on(LedgerOp::UpdateStatus(EmailStatus::TemporaryFailure))
            .await;

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(matches!(err, AppError::Compensation { .. }));
        assert!(msg.contains("template missing"));
        assert!(msg.contains("injected failure"));
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_content_store_failure_marks_temporary() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;
        h.ledger.fail_on(LedgerOp::UpdateContent).await;

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert!(err.is_storage());
        assert_eq!(
            h.ledger.status_history("req-1").await.last(),
            Some(&EmailStatus::TemporaryFailure)
        );
        assert_eq!(h.provider.sent.load(Ordering::SeqCst), 0);
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_provider_failure_marks_permanent() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider {
                fail: true,
                ..Default::default()
            },
        );
        seed(&h.ledger, "req-1").await;

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Send failed: mailbox unavailable");
        assert_eq!(
            h.ledger.status_history("req-1").await,
            vec![
                EmailStatus::New,
                EmailStatus::Processing,
                EmailStatus::PermanentFailure
            ]
        );
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_processing_update_failure_sends_nothing() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;
        h.ledger
            .fail_on(LedgerOp::UpdateStatus(EmailStatus::Processing))
            .await;

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert!(err.is_storage());
        assert_eq!(
            h.ledger.status_history("req-1").await,
            vec![EmailStatus::New]
        );
        assert_eq!(h.provider.sent.load(Ordering::SeqCst), 0);
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_success_update_failure_is_reported() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;
        h.ledger
            .fail_on(LedgerOp::UpdateStatus(EmailStatus::Success))
            .await;

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert!(err.is_storage());
        assert_eq!(h.provider.sent.load(Ordering::SeqCst), 1);
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_lock_contention_touches_nothing() {
        let h = harness(
            RecordingLocker {
                refuse: true,
                ..Default::default()
            },
            mime(),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert!(err.is_lock_contention());
        assert_eq!(
            h.ledger.status_history("req-1").await,
            vec![EmailStatus::New]
        );
        assert!(h.locker.released.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_happens_before_locking() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider::default(),
        );

        let err = h
            .pipeline
            .run("req-1", "a@b.com", "", "content-long")
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Validation error: subject is required");
        assert!(h.locker.acquired.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redelivery_after_success_does_not_resend() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider::default(),
        );
        seed(&h.ledger, "req-1").await;

        h.pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap();
        let again = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap();

        assert_eq!(again, RunOutcome::AlreadyDelivered);
        assert_eq!(h.provider.sent.load(Ordering::SeqCst), 1);
        assert_eq!(h.locker.released.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_record_is_orphaned() {
        let h = harness(
            RecordingLocker::default(),
            mime(),
            CountingProvider::default(),
        );

        let outcome = h
            .pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Orphaned);
        assert_eq!(h.provider.sent.load(Ordering::SeqCst), 0);
        assert_locked_once(&h);
    }

    #[tokio::test]
    async fn test_concurrent_runs_one_wins() {
        let store = MemoryTokenStore::new();
        let ledger = Arc::new(InMemoryLedger::new());
        seed(&ledger, "req-1").await;

        let provider = Arc::new(SlowProvider::default());
        let make = |store: MemoryTokenStore| {
            DeliveryPipeline::new(
                ledger.clone(),
                Arc::new(TokenLocker::new(store)),
                mime(),
                provider.clone(),
                PipelineSettings {
                    lock_key_prefix: "notifications:email:".into(),
                    lock_ttl: Duration::from_secs(120),
                    delivery_timeout: Duration::from_secs(5),
                },
            )
        };
        let first = make(store.clone());
        let second = make(store.clone());

        let (a, b) = tokio::join!(
            first.run("req-1", "a@b.com", "subj", "content-long"),
            second.run("req-1", "a@b.com", "subj", "content-long"),
        );

        let contended = [&a, &b]
            .iter()
            .filter(|r| matches!(r, Err(e) if e.is_lock_contention()))
            .count();
        assert_eq!(contended, 1);
        assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(provider.sent.load(Ordering::SeqCst), 1);
    }

    /// Waits out the whole TTL before reporting the key as taken
    struct WaitingLocker;

    #[async_trait]
    impl Locker for WaitingLocker {
        async fn acquire(&self, _key: &str, ttl: Duration) -> Result<(), LockError> {
            tokio::time::sleep(ttl).await;
            Err(LockError::NotAcquired)
        }

        async fn release(&self, _key: &str) -> Result<(), LockError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lock_wait_longer_than_delivery_timeout_reports_contention() {
        let ledger = Arc::new(InMemoryLedger::new());
        seed(&ledger, "req-1").await;
        let pipeline = DeliveryPipeline::new(
            ledger.clone(),
            Arc::new(WaitingLocker),
            mime(),
            Arc::new(CountingProvider::default()),
            PipelineSettings {
                lock_key_prefix: "notifications:email:".into(),
                lock_ttl: Duration::from_millis(200),
                delivery_timeout: Duration::from_millis(50),
            },
        );
        let contention_before = courier_metrics::LOCK_CONTENTION_TOTAL.get();

        let err = pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Lock(LockError::NotAcquired)));
        let contention_after = courier_metrics::LOCK_CONTENTION_TOTAL.get();
        assert!(contention_after > contention_before);
        assert_eq!(ledger.status_history("req-1").await, vec![EmailStatus::New]);
    }

    #[tokio::test]
    async fn test_timeout_under_lock_releases_lock() {
        let store = MemoryTokenStore::new();
        let ledger = Arc::new(InMemoryLedger::new());
        seed(&ledger, "req-1").await;
        let pipeline = DeliveryPipeline::new(
            ledger.clone(),
            Arc::new(TokenLocker::new(store.clone())),
            mime(),
            Arc::new(HangingProvider),
            PipelineSettings {
                lock_key_prefix: "notifications:email:".into(),
                lock_ttl: Duration::from_secs(120),
                delivery_timeout: Duration::from_millis(50),
            },
        );

        let err = pipeline
            .run("req-1", "a@b.com", "subj", "content-long")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Timeout(_)));
        assert!(!store.contains("notifications:email:req-1").await);
    }

    struct HangingProvider;

    #[async_trait]
    impl EmailProvider for HangingProvider {
        async fn send_raw(&self, _recipient: &str, _raw: &str) -> AppResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    /// Holds the lock long enough for a concurrent run to collide
    #[derive(Default)]
    struct SlowProvider {
        sent: AtomicUsize,
    }

    #[async_trait]
    impl EmailProvider for SlowProvider {
        async fn send_raw(&self, _recipient: &str, _raw: &str) -> AppResult<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}
