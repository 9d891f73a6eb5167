// Re-exports of the broker's publish/consume option types. Kept behind this
// module so call sites don't name broccoli_queue directly.

pub type PublishConfig = broccoli_queue::queue::PublishOptions;
pub type ConsumeConfig = broccoli_queue::queue::ConsumeOptions;
pub type RetryStrategy = broccoli_queue::queue::RetryStrategy;
