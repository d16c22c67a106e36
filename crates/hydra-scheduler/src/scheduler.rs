// SPDX-License-Identifier: MIT
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hydra_common::{HydraError, LatencyWindow, Priority, QueueStats};
use hydra_config::QueueConfig;
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bucket::TokenBucket;
use crate::item::{QueueItem, QueueItemStatus};
use crate::retry::retry_delay_for;

pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
pub type Handler = Arc<dyn Fn(String, Option<String>, Value) -> BoxFuture<Result<String, HydraError>> + Send + Sync>;

const PRIORITY_SLOTS: usize = 5;

struct Inner {
    items: HashMap<u64, QueueItem>,
    priority_queues: [VecDeque<u64>; PRIORITY_SLOTS],
    paused: bool,
    shutdown: bool,
    cancel_tokens: HashMap<u64, CancellationToken>,
}

struct Counters {
    completed: u64,
    failed: u64,
    cancelled: u64,
    retries: u64,
    latency: LatencyWindow,
}

/// Priority-ordered prompt queue with bounded concurrency, token-bucket
/// admission, retries with backoff, per-item timeouts, and cooperative
/// cancellation.
pub struct Scheduler {
    inner: Mutex<Inner>,
    admit_notify: Notify,
    completion: Mutex<HashMap<u64, Arc<Notify>>>,
    semaphore: Arc<Semaphore>,
    bucket: TokenBucket,
    handler: RwLock<Option<Handler>>,
    config: QueueConfig,
    counters: Mutex<Counters>,
    next_id: AtomicU64,
    handler_active: AtomicU64,
    started: Instant,
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Scheduler {
    pub fn new(config: QueueConfig) -> Arc<Self> {
        let bucket = TokenBucket::new(config.bucket_capacity, config.bucket_refill_per_sec);
        let this = Arc::new(Self {
            inner: Mutex::new(Inner {
                items: HashMap::new(),
                priority_queues: [
                    VecDeque::new(),
                    VecDeque::new(),
                    VecDeque::new(),
                    VecDeque::new(),
                    VecDeque::new(),
                ],
                paused: false,
                shutdown: false,
                cancel_tokens: HashMap::new(),
            }),
            admit_notify: Notify::new(),
            completion: Mutex::new(HashMap::new()),
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            bucket,
            handler: RwLock::new(None),
            config,
            counters: Mutex::new(Counters {
                completed: 0,
                failed: 0,
                cancelled: 0,
                retries: 0,
                latency: LatencyWindow::new(256),
            }),
            next_id: AtomicU64::new(1),
            handler_active: AtomicU64::new(0),
            started: Instant::now(),
        });
        let admission = Arc::clone(&this);
        tokio::spawn(async move { admission.admission_loop().await });
        this
    }

    pub async fn set_handler(&self, handler: Handler) {
        *self.handler.write().await = Some(handler);
    }

    pub async fn enqueue(
        &self,
        prompt: String,
        model: Option<String>,
        priority: Priority,
        metadata: Value,
        per_item_timeout_ms: Option<u64>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let item = QueueItem::new(id, prompt, model, priority, metadata, per_item_timeout_ms, now_ms());
        {
            let mut inner = self.inner.lock().await;
            inner.priority_queues[priority.as_index()].push_back(id);
            inner.items.insert(id, item);
        }
        self.admit_notify.notify_one();
        id
    }

    pub async fn enqueue_batch(
        &self,
        items: Vec<(String, Option<String>, Priority, Value)>,
    ) -> Vec<u64> {
        let mut ids = Vec::with_capacity(items.len());
        for (prompt, model, priority, metadata) in items {
            ids.push(self.enqueue(prompt, model, priority, metadata, None).await);
        }
        ids
    }

    pub async fn cancel(&self, id: u64) -> bool {
        let (cancelled_now, terminal_now) = {
            let mut inner = self.inner.lock().await;
            match inner.items.get(&id).map(|i| i.status) {
                Some(QueueItemStatus::Queued) => {
                    let priority = inner.items[&id].priority;
                    inner.priority_queues[priority.as_index()].retain(|x| *x != id);
                    let item = inner.items.get_mut(&id).unwrap();
                    item.status = QueueItemStatus::Cancelled;
                    item.completed_at = Some(now_ms());
                    (true, true)
                }
                Some(QueueItemStatus::Running) => {
                    if let Some(token) = inner.cancel_tokens.get(&id) {
                        token.cancel();
                    }
                    // Terminal transition happens in run_item once it
                    // observes the cancellation; the handler's own future may
                    // still win the race and complete or fail instead, so the
                    // counter is not touched here.
                    (true, false)
                }
                _ => (false, false),
            }
        };
        if terminal_now {
            self.counters.lock().await.cancelled += 1;
            self.signal_completion(id).await;
        }
        cancelled_now
    }

    pub async fn cancel_all(&self) -> Vec<u64> {
        let ids: Vec<u64> = {
            let inner = self.inner.lock().await;
            inner
                .items
                .values()
                .filter(|i| !i.status.is_terminal())
                .map(|i| i.id)
                .collect()
        };
        let mut cancelled = Vec::new();
        for id in ids {
            if self.cancel(id).await {
                cancelled.push(id);
            }
        }
        cancelled
    }

    pub async fn pause(&self) {
        self.inner.lock().await.paused = true;
    }

    pub async fn resume(&self) {
        self.inner.lock().await.paused = false;
        self.admit_notify.notify_waiters();
    }

    pub async fn item(&self, id: u64) -> Option<QueueItem> {
        self.inner.lock().await.items.get(&id).cloned()
    }

    pub async fn wait_for(&self, id: u64, timeout: Duration) -> Result<QueueItem, HydraError> {
        if let Some(item) = self.item(id).await {
            if item.status.is_terminal() {
                return Ok(item);
            }
        } else {
            return Err(HydraError::Validation {
                message: format!("no such queue item: {id}"),
            });
        }
        let notify = {
            let mut completion = self.completion.lock().await;
            Arc::clone(completion.entry(id).or_insert_with(|| Arc::new(Notify::new())))
        };
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            if let Some(item) = self.item(id).await {
                if item.status.is_terminal() {
                    return Ok(item);
                }
            }
            tokio::select! {
                biased;
                _ = &mut deadline => return Err(HydraError::WaitTimeout),
                _ = notify.notified() => continue,
            }
        }
    }

    pub async fn status(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        let queued = inner.priority_queues.iter().map(|q| q.len()).sum();
        let running = inner.items.values().filter(|i| i.status == QueueItemStatus::Running).count();
        drop(inner);
        let counters = self.counters.lock().await;
        QueueStats {
            queued,
            running,
            completed: counters.completed,
            failed: counters.failed,
            cancelled: counters.cancelled,
            retries: counters.retries,
            avg_latency_ms: counters.latency.average(),
            p95_latency_ms: counters.latency.percentile(0.95),
            tokens_remaining: self.bucket.remaining().await,
            handler_active: self.handler_active.load(Ordering::SeqCst) as usize,
            uptime_ms: self.started.elapsed().as_millis() as u64,
        }
    }

    pub async fn shutdown(&self) {
        let ids: Vec<u64> = {
            let mut inner = self.inner.lock().await;
            inner.shutdown = true;
            inner.items.values().filter(|i| !i.status.is_terminal()).map(|i| i.id).collect()
        };
        for id in ids {
            self.cancel(id).await;
        }
        self.admit_notify.notify_waiters();
    }

    async fn signal_completion(&self, id: u64) {
        if let Some(notify) = self.completion.lock().await.get(&id) {
            notify.notify_waiters();
        }
    }

    async fn next_eligible(&self) -> Option<u64> {
        let mut inner = self.inner.lock().await;
        if inner.shutdown || inner.paused {
            return None;
        }
        for queue in inner.priority_queues.iter_mut() {
            if let Some(id) = queue.pop_front() {
                return Some(id);
            }
        }
        None
    }

    async fn admission_loop(self: Arc<Self>) {
        loop {
            if self.inner.lock().await.shutdown {
                return;
            }
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(p) => p,
                Err(_) => return,
            };
            let id = loop {
                if self.inner.lock().await.shutdown {
                    return;
                }
                if let Some(id) = self.next_eligible().await {
                    break id;
                }
                self.admit_notify.notified().await;
            };
            self.bucket.take().await;

            let started = now_ms();
            {
                let mut inner = self.inner.lock().await;
                if let Some(item) = inner.items.get_mut(&id) {
                    item.status = QueueItemStatus::Running;
                    item.started_at = Some(started);
                    item.attempts += 1;
                }
                inner.cancel_tokens.insert(id, CancellationToken::new());
            }

            let this = Arc::clone(&self);
            tokio::spawn(async move {
                this.run_item(id, permit).await;
            });
        }
    }

    async fn run_item(self: Arc<Self>, id: u64, permit: tokio::sync::OwnedSemaphorePermit) {
        self.handler_active.fetch_add(1, Ordering::SeqCst);
        let (prompt, model, metadata, timeout_ms, priority, attempts) = {
            let inner = self.inner.lock().await;
            let item = &inner.items[&id];
            (
                item.prompt.clone(),
                item.model.clone(),
                item.metadata.clone(),
                item.per_item_timeout_ms.unwrap_or(self.config.timeout_ms),
                item.priority,
                item.attempts,
            )
        };
        let cancel = {
            let inner = self.inner.lock().await;
            inner.cancel_tokens.get(&id).cloned().unwrap_or_default()
        };

        let handler = self.handler.read().await.clone();
        let Some(handler) = handler else {
            self.finalize(id, Err(HydraError::Validation {
                message: "no handler configured".to_string(),
            }), attempts, priority, None)
            .await;
            self.handler_active.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
            self.admit_notify.notify_waiters();
            return;
        };

        let work = handler(prompt, model, metadata);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HydraError::Cancelled),
            _ = tokio::time::sleep(Duration::from_millis(timeout_ms)) => Err(HydraError::BackendTimeout {
                message: format!("item {id} exceeded per-item timeout of {timeout_ms}ms"),
            }),
            r = work => r,
        };

        self.handler_active.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(text) => {
                self.finalize(id, Ok(text), attempts, priority, Some(started_latency(&self, id).await)).await;
            }
            Err(HydraError::Cancelled) => {
                let mut inner = self.inner.lock().await;
                if let Some(item) = inner.items.get_mut(&id) {
                    item.status = QueueItemStatus::Cancelled;
                    item.completed_at = Some(now_ms());
                    item.last_error_kind = Some("Cancelled".to_string());
                }
                inner.cancel_tokens.remove(&id);
                drop(inner);
                self.counters.lock().await.cancelled += 1;
                self.signal_completion(id).await;
            }
            Err(e) => {
                let retryable = e.is_retryable() && attempts < self.config.max_retries;
                if retryable {
                    self.counters.lock().await.retries += 1;
                    let delay = retry_delay_for(
                        &e,
                        attempts,
                        self.config.retry_base_ms,
                        self.config.retry_max_delay_ms,
                        self.config.retry_jitter,
                    );
                    {
                        let mut inner = self.inner.lock().await;
                        if let Some(item) = inner.items.get_mut(&id) {
                            item.status = QueueItemStatus::Queued;
                            item.last_error_kind = Some(e.kind().to_string());
                        }
                        inner.cancel_tokens.remove(&id);
                    }
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let mut inner = this.inner.lock().await;
                        if let Some(item) = inner.items.get(&id) {
                            if item.status == QueueItemStatus::Queued {
                                inner.priority_queues[priority.as_index()].push_back(id);
                            }
                        }
                        drop(inner);
                        this.admit_notify.notify_waiters();
                    });
                } else {
                    self.finalize(id, Err(e), attempts, priority, None).await;
                }
            }
        }

        drop(permit);
        self.admit_notify.notify_waiters();
    }

    async fn finalize(
        &self,
        id: u64,
        result: Result<String, HydraError>,
        _attempts: u32,
        _priority: Priority,
        latency_ms: Option<f64>,
    ) {
        let is_ok = result.is_ok();
        {
            let mut inner = self.inner.lock().await;
            if let Some(item) = inner.items.get_mut(&id) {
                match result {
                    Ok(text) => {
                        item.status = QueueItemStatus::Completed;
                        item.response_text = Some(text);
                    }
                    Err(e) => {
                        item.status = QueueItemStatus::Failed;
                        item.last_error_kind = Some(e.kind().to_string());
                        item.error = Some(e.to_string());
                    }
                }
                item.completed_at = Some(now_ms());
            }
            inner.cancel_tokens.remove(&id);
        }
        let mut counters = self.counters.lock().await;
        if is_ok {
            counters.completed += 1;
        } else {
            counters.failed += 1;
        }
        if let Some(ms) = latency_ms {
            counters.latency.record(ms);
        }
        drop(counters);
        self.signal_completion(id).await;
        debug!(id, ok = is_ok, "queue item finalized");
    }
}

async fn started_latency(scheduler: &Scheduler, id: u64) -> f64 {
    let inner = scheduler.inner.lock().await;
    let item = &inner.items[&id];
    match item.started_at {
        Some(started) => (now_ms() - started) as f64,
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_config::QueueConfig;
    use std::sync::atomic::AtomicUsize;

    fn test_config() -> QueueConfig {
        QueueConfig {
            max_concurrent: 2,
            max_retries: 3,
            timeout_ms: 5_000,
            bucket_capacity: 100,
            bucket_refill_per_sec: 1000.0,
            retry_base_ms: 5,
            retry_max_delay_ms: 50,
            retry_jitter: 0.0,
        }
    }

    fn ok_handler() -> Handler {
        Arc::new(|prompt, _model, _meta| Box::pin(async move { Ok(format!("done:{prompt}")) }))
    }

    #[tokio::test]
    async fn enqueue_and_complete_happy_path() {
        let scheduler = Scheduler::new(test_config());
        scheduler.set_handler(ok_handler()).await;
        let id = scheduler.enqueue("hi".into(), None, Priority::Normal, Value::Null, None).await;
        let item = scheduler.wait_for(id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(item.status, QueueItemStatus::Completed);
        assert_eq!(item.response_text.unwrap(), "done:hi");
        assert_eq!(item.attempts, 1);
    }

    #[tokio::test]
    async fn cancel_queued_item_prevents_handler_invocation() {
        let scheduler = Scheduler::new(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        scheduler
            .set_handler(Arc::new(move |_p, _m, _meta| {
                let calls = Arc::clone(&calls2);
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok("x".to_string())
                })
            }))
            .await;
        scheduler.pause().await;
        let id = scheduler.enqueue("a".into(), None, Priority::Normal, Value::Null, None).await;
        assert!(scheduler.cancel(id).await);
        let item = scheduler.item(id).await.unwrap();
        assert_eq!(item.status, QueueItemStatus::Cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_then_succeed() {
        let scheduler = Scheduler::new(test_config());
        let attempt = Arc::new(AtomicUsize::new(0));
        let attempt2 = Arc::clone(&attempt);
        scheduler
            .set_handler(Arc::new(move |_p, _m, _meta| {
                let attempt = Arc::clone(&attempt2);
                Box::pin(async move {
                    let n = attempt.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err(HydraError::BackendHttp { status: 503, message: "busy".into() })
                    } else {
                        Ok("OK".to_string())
                    }
                })
            }))
            .await;
        let id = scheduler.enqueue("p".into(), None, Priority::Normal, Value::Null, None).await;
        let item = scheduler.wait_for(id, Duration::from_secs(2)).await.unwrap();
        assert_eq!(item.status, QueueItemStatus::Completed);
        assert_eq!(item.attempts, 3);
    }

    #[tokio::test]
    async fn higher_priority_is_admitted_before_lower() {
        let mut config = test_config();
        config.max_concurrent = 1;
        let scheduler = Scheduler::new(config);
        scheduler.pause().await;
        let started_order = Arc::new(Mutex::new(Vec::new()));
        let order2 = Arc::clone(&started_order);
        scheduler
            .set_handler(Arc::new(move |prompt, _m, _meta| {
                let order = Arc::clone(&order2);
                Box::pin(async move {
                    order.lock().await.push(prompt.clone());
                    Ok(prompt)
                })
            }))
            .await;
        let normal_id = scheduler.enqueue("normal".into(), None, Priority::Normal, Value::Null, None).await;
        let urgent_id = scheduler.enqueue("urgent".into(), None, Priority::Urgent, Value::Null, None).await;
        scheduler.resume().await;
        scheduler.wait_for(urgent_id, Duration::from_secs(2)).await.unwrap();
        scheduler.wait_for(normal_id, Duration::from_secs(2)).await.unwrap();
        let order = started_order.lock().await;
        assert_eq!(order.as_slice(), ["urgent", "normal"]);
    }
}
