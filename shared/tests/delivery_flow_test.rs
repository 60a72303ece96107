// ============================================================================
// Delivery flow tests
// ============================================================================
//
// Admission, consumer loop and pipeline wired together over the in-memory
// ledger, delivery log and token store. No external services needed.
//
// ============================================================================

use async_trait::async_trait;
use courier_error::{AppError, AppResult, LockError};
use courier_shared::admission::AdmissionService;
use courier_shared::delivery_log::{DeliveryLog, InMemoryDeliveryLog};
use courier_shared::delivery_worker::{
    ConsumerSettings, DeliveryPipeline, EmailConsumer, PipelineSettings,
};
use courier_shared::dto::SendRawRequest;
use courier_shared::ledger::{EmailStatus, InMemoryLedger};
use courier_shared::lock::{Locker, MemoryTokenStore, TokenLocker};
use courier_shared::preparer::{Preparer, PreparerChain, RawMimeStep};
use courier_shared::provider::EmailProvider;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

const CONSUMER: &str = "worker-1";

/// Provider that records every send and can be told to fail
#[derive(Default)]
struct RecordingProvider {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

#[async_trait]
impl EmailProvider for RecordingProvider {
    async fn send_raw(&self, recipient: &str, raw: &str) -> AppResult<()> {
        if self.fail {
            return Err(AppError::provider("mailbox unavailable"));
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), raw.to_string()));
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

struct Flow {
    ledger: Arc<InMemoryLedger>,
    log: Arc<InMemoryDeliveryLog>,
    provider: Arc<RecordingProvider>,
    admission: AdmissionService,
    consumer: Arc<EmailConsumer>,
}

async fn flow(preparer: Arc<dyn Preparer>, provider: RecordingProvider) -> Flow {
    let ledger = Arc::new(InMemoryLedger::new());
    let log = Arc::new(InMemoryDeliveryLog::new());
    log.ensure_group().await.unwrap();
    let provider = Arc::new(provider);

    let pipeline = Arc::new(DeliveryPipeline::new(
        ledger.clone(),
        Arc::new(TokenLocker::new(MemoryTokenStore::new())),
        preparer,
        provider.clone(),
        PipelineSettings {
            lock_key_prefix: "notifications:email:".into(),
            lock_ttl: Duration::from_secs(120),
            delivery_timeout: Duration::from_secs(5),
        },
    ));

    let consumer = Arc::new(EmailConsumer::new(
        log.clone(),
        pipeline,
        ConsumerSettings {
            consumer_name: CONSUMER.into(),
            block: Duration::from_millis(20),
            error_backoff: Duration::from_millis(10),
            stats_interval: Duration::from_secs(30),
        },
    ));

    Flow {
        admission: AdmissionService::new(ledger.clone(), log.clone()),
        ledger,
        log,
        provider,
        consumer,
    }
}

fn mime() -> Arc<dyn Preparer> {
    let step = RawMimeStep::new("noreply@example.com");
    Arc::new(PreparerChain::new().with_step(step))
}

fn request(id: &str) -> SendRawRequest {
    SendRawRequest {
        request_id: id.into(),
        recipient: "a@b.com".into(),
        subject: "subj".into(),
        content: "content-long".into(),
    }
}

/// Run the consumer until `done` holds or two seconds pass
async fn drive<F, Fut>(consumer: &Arc<EmailConsumer>, done: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let shutdown = CancellationToken::new();
    let handle = {
        let consumer = consumer.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { consumer.run(shutdown).await })
    };

    for _ in 0..200 {
        if done().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_accepted_request_is_delivered_once() {
    let f = flow(mime(), RecordingProvider::default()).await;

    f.admission.admit(&request("req-1")).await.unwrap();
    assert_eq!(
        f.ledger.get("req-1").await.unwrap().status,
        EmailStatus::New
    );

    drive(&f.consumer, || async { f.log.acked().await.len() == 1 }).await;

    assert_eq!(
        f.ledger.status_history("req-1").await,
        vec![EmailStatus::New, EmailStatus::Processing, EmailStatus::Success]
    );
    assert!(f.log.pending_for(CONSUMER).await.is_empty());

    let sent = f.provider.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "a@b.com");
    assert!(sent[0].1.contains("Subject: subj"));

    // The stored content is the prepared payload
    assert_eq!(f.ledger.get("req-1").await.unwrap().content, sent[0].1);
}

#[tokio::test]
async fn test_duplicate_request_is_queued_once() {
    let f = flow(mime(), RecordingProvider::default()).await;

    f.admission.admit(&request("req-dup")).await.unwrap();
    let err = f.admission.admit(&request("req-dup")).await.unwrap_err();

    assert!(matches!(err, AppError::DuplicateRequest(_)));
    assert_eq!(f.log.len().await, 1);
}

#[tokio::test]
async fn test_publish_failure_leaves_no_record() {
    let f = flow(mime(), RecordingProvider::default()).await;
    f.log.fail_publish(true).await;

    assert!(f.admission.admit(&request("req-1")).await.is_err());
    assert!(f.ledger.get("req-1").await.is_none());

    assert!(f.log.is_empty().await);
}

#[tokio::test]
async fn test_prepare_failure_marks_temporary_and_stays_pending() {
    let f = flow(Arc::new(FailingPreparer), RecordingProvider::default()).await;
    f.admission.admit(&request("req-1")).await.unwrap();

    drive(&f.consumer, || async {
        f.consumer.stats().failed.load(Ordering::Relaxed) >= 1
    })
    .await;

    let history = f.ledger.status_history("req-1").await;
    assert_eq!(
        &history[..3],
        &[EmailStatus::New, EmailStatus::Processing, EmailStatus::TemporaryFailure]
    );
    assert!(f.log.acked().await.is_empty());
    assert_eq!(f.log.pending_for(CONSUMER).await.len(), 1);
    assert!(f.provider.sent.lock().await.is_empty());
}

#[tokio::test]
async fn test_provider_failure_marks_permanent() {
    let provider = RecordingProvider {
        fail: true,
        ..Default::default()
    };
    let f = flow(mime(), provider).await;
    f.admission.admit(&request("req-1")).await.unwrap();

    drive(&f.consumer, || async {
        f.consumer.stats().failed.load(Ordering::Relaxed) >= 1
    })
    .await;

    let history = f.ledger.status_history("req-1").await;
    assert_eq!(
        &history[..3],
        &[EmailStatus::New, EmailStatus::Processing, EmailStatus::PermanentFailure]
    );
    assert!(f.log.acked().await.is_empty());
}

#[tokio::test]
async fn test_pending_entry_is_delivered_after_restart() {
    let f = flow(Arc::new(FailingPreparer), RecordingProvider::default()).await;
    f.admission.admit(&request("req-1")).await.unwrap();

    drive(&f.consumer, || async {
        f.consumer.stats().failed.load(Ordering::Relaxed) >= 1
    })
    .await;
    assert_eq!(f.log.pending_for(CONSUMER).await.len(), 1);

    // Same consumer name, working preparer
    let provider = Arc::new(RecordingProvider::default());
    let pipeline = Arc::new(DeliveryPipeline::new(
        f.ledger.clone(),
        Arc::new(TokenLocker::new(MemoryTokenStore::new())),
        mime(),
        provider.clone(),
        PipelineSettings {
            lock_key_prefix: "notifications:email:".into(),
            lock_ttl: Duration::from_secs(120),
            delivery_timeout: Duration::from_secs(5),
        },
    ));
    let consumer = Arc::new(EmailConsumer::new(
        f.log.clone(),
        pipeline,
        ConsumerSettings {
            consumer_name: CONSUMER.into(),
            block: Duration::from_millis(20),
            error_backoff: Duration::from_millis(10),
            stats_interval: Duration::from_secs(30),
        },
    ));

    drive(&consumer, || async { f.log.acked().await.len() == 1 }).await;

    assert_eq!(
        f.ledger.get("req-1").await.unwrap().status,
        EmailStatus::Success
    );
    assert_eq!(provider.sent.lock().await.len(), 1);
    assert!(f.log.pending_for(CONSUMER).await.is_empty());
}

#[tokio::test]
async fn test_token_lock_contention() {
    let store = MemoryTokenStore::new();
    let first = TokenLocker::new(store.clone());
    let second = TokenLocker::new(store.clone());
    let ttl = Duration::from_secs(120);

    first
        .acquire("notifications:email:req-1", ttl)
        .await
        .unwrap();

    let again = first.acquire("notifications:email:req-1", ttl).await;
    assert!(matches!(again, Err(LockError::AlreadyHeld)));

    let started = std::time::Instant::now();
    let other = second.acquire("notifications:email:req-1", ttl).await;
    assert!(matches!(other, Err(LockError::NotAcquired)));
    assert!(started.elapsed() < Duration::from_secs(1));

    first.release("notifications:email:req-1").await.unwrap();
    second
        .acquire("notifications:email:req-1", ttl)
        .await
        .unwrap();
}
