use anyhow::Result;
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;
use tracing::info;

use crate::{Task, TaskMessage};

pub const DEFAULT_TASK_TOPIC: &str = "travel-tasks";

/// Fire-and-forget dispatch of background tasks.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task: Task) -> Result<TaskMessage>;
}

#[derive(Clone)]
pub struct KafkaTaskQueue {
    producer: FutureProducer,
    topic: String,
}

impl KafkaTaskQueue {
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self { producer, topic }
    }

    pub fn connect(brokers: &str, topic: String) -> Result<Self> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;
        Ok(Self::new(producer, topic))
    }
}

#[async_trait]
impl TaskQueue for KafkaTaskQueue {
    async fn enqueue(&self, task: Task) -> Result<TaskMessage> {
        let message = TaskMessage::new(task);
        let json = serde_json::to_string(&message)?;
        let key = message.task.routing_key();
        let record = FutureRecord::to(&self.topic)
            .payload(&json)
            .key(&key);

        self.producer.send(record, Duration::from_secs(5)).await
            .map_err(|(e, _)| anyhow::anyhow!("Failed to enqueue task: {}", e))?;

        info!(task_id = %message.id, task = message.task.name(), "Task enqueued");
        Ok(message)
    }
}
