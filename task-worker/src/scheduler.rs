use shared::queue::TaskQueue;
use shared::Task;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info};

/// Periodically enqueues the expired-payment cleanup.
pub struct CleanupScheduler {
    queue: Arc<dyn TaskQueue>,
    interval: Duration,
}

impl CleanupScheduler {
    pub fn new(queue: Arc<dyn TaskQueue>, interval: Duration) -> Self {
        Self { queue, interval }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.interval);
        info!(every_secs = self.interval.as_secs(), "Cleanup scheduler started");

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&self) {
        if let Err(e) = self.queue.enqueue(Task::CleanupExpiredPayments).await {
            error!("Error scheduling payment cleanup: {}", e);
        }
    }
}
