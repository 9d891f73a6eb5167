use std::sync::Arc;

use mq::Mq;
use tracing::{debug, warn};

use common::pipeline::ActivityEvent;

/// Fire-and-forget append to the activity/audit queue.
///
/// The pipeline only ever writes here; nothing in this codebase reads the
/// queue back. A missing broker or a failed publish is logged and otherwise
/// ignored.
#[derive(Clone)]
pub struct ActivitySink {
    mq: Option<Arc<Mq>>,
    queue_name: String,
}

impl ActivitySink {
    pub fn new(mq: Option<Arc<Mq>>, queue_name: impl Into<String>) -> Self {
        Self {
            mq,
            queue_name: queue_name.into(),
        }
    }

    /// Sink with no broker attached; every event is dropped with a debug log.
    pub fn disabled() -> Self {
        Self {
            mq: None,
            queue_name: String::new(),
        }
    }

    pub fn record(&self, event: ActivityEvent) {
        let Some(mq) = self.mq.clone() else {
            debug!(topic = %event.topic, "Activity sink disabled, dropping event");
            return;
        };
        let queue_name = self.queue_name.clone();

        tokio::spawn(async move {
            if let Err(e) = mq.publish(&queue_name, None, &event, None).await {
                warn!(
                    topic = %event.topic,
                    error = %e,
                    "Failed to append activity event"
                );
            }
        });
    }
}
