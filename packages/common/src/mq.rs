use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt::Debug;

/// Core trait for all queue messages.
///
/// Consumers receive messages as typed `BrokerMessage<M>` payloads; the type
/// string and ID are used for diagnostics and retry tracking.
pub trait Message: Serialize + DeserializeOwned + Debug + Send + Sync + Clone {
    fn message_type() -> &'static str
    where
        Self: Sized;

    /// Stable identifier for dedup and retry tracking.
    fn message_id(&self) -> &str;
}

/// Generic envelope carried on the stage job queue.
///
/// The payload is kept opaque so a worker can always pull the message off the
/// queue; decoding failures are then reported through the failure path
/// instead of poisoning the queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTask {
    pub id: String,
    pub task_type: String,
    pub payload: serde_json::Value,
}

impl Message for QueueTask {
    fn message_type() -> &'static str {
        "task"
    }

    fn message_id(&self) -> &str {
        &self.id
    }
}
