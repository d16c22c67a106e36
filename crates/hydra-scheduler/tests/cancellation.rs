// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use hydra_common::Priority;
use hydra_config::QueueConfig;
use hydra_scheduler::{QueueItemStatus, Scheduler};
use serde_json::Value;

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

/// A RUNNING item that is cancelled mid-flight must abort the handler and
/// land in CANCELLED within 100ms, with the aggregate stats reflecting
/// exactly one cancellation and zero completions for it.
#[tokio::test]
async fn cancel_of_a_running_item_aborts_the_handler() {
    let scheduler = Scheduler::new(test_config());
    scheduler
        .set_handler(Arc::new(|prompt, _model, _meta| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(format!("done:{prompt}"))
            })
        }))
        .await;

    let id = scheduler.enqueue("p".into(), None, Priority::Normal, Value::Null, None).await;

    // The handler sleeps 500ms, giving a wide window to observe RUNNING
    // well before it could resolve on its own.
    loop {
        if scheduler.item(id).await.unwrap().status == QueueItemStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(scheduler.cancel(id).await);

    let deadline = tokio::time::Instant::now() + Duration::from_millis(100);
    loop {
        let item = scheduler.item(id).await.unwrap();
        if item.status == QueueItemStatus::Cancelled {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "item did not reach CANCELLED within 100ms of cancel, last status: {:?}",
            item.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = scheduler.status().await;
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.completed, 0);
}
