use serde::Deserialize;

/// App-level MQ configuration shared by server and worker.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Whether MQ is enabled. Default: true.
    /// Note: Worker ignores this field (always requires MQ).
    #[serde(default = "default_mq_enabled")]
    pub enabled: bool,
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue for stage jobs (server publishes, worker consumes).
    #[serde(default = "default_stage_queue")]
    pub stage_queue_name: String,
    /// Queue for stage results (worker publishes, server consumes).
    #[serde(default = "default_result_queue")]
    pub result_queue_name: String,
    /// Queue for upload-finalized events (upload surface publishes).
    #[serde(default = "default_upload_queue")]
    pub upload_queue_name: String,
    /// Queue for failure-reported events (server publishes and consumes).
    #[serde(default = "default_failure_queue")]
    pub failure_queue_name: String,
    /// Queue for classification requests.
    #[serde(default = "default_classify_queue")]
    pub classify_queue_name: String,
    /// Queue for fire-and-forget activity events.
    #[serde(default = "default_activity_queue")]
    pub activity_queue_name: String,
    /// Infrastructure retry policy for worker job processing.
    #[serde(default)]
    pub retry: RetryPolicyConfig,
}

fn default_mq_enabled() -> bool {
    true
}
fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_stage_queue() -> String {
    "stage_jobs".into()
}
fn default_result_queue() -> String {
    "stage_results".into()
}
fn default_upload_queue() -> String {
    "upload_finalized".into()
}
fn default_failure_queue() -> String {
    "failure_events".into()
}
fn default_classify_queue() -> String {
    "classification_requests".into()
}
fn default_activity_queue() -> String {
    "activity_events".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            enabled: default_mq_enabled(),
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            stage_queue_name: default_stage_queue(),
            result_queue_name: default_result_queue(),
            upload_queue_name: default_upload_queue(),
            failure_queue_name: default_failure_queue(),
            classify_queue_name: default_classify_queue(),
            activity_queue_name: default_activity_queue(),
            retry: RetryPolicyConfig::default(),
        }
    }
}

/// Infrastructure-level retry policy (transient errors inside one worker).
#[derive(Debug, Deserialize, Clone)]
pub struct RetryPolicyConfig {
    /// Max retries before a job's failure is reported. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u8,
    /// Base backoff delay in milliseconds. Default: 1000.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds. Default: 60000.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// How often to sweep stale retry state. Default: 300.
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Age at which unfinished retry state is dropped. Default: 3600.
    #[serde(default = "default_retry_max_age")]
    pub max_age_secs: u64,
}

fn default_max_retries() -> u8 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_cleanup_interval() -> u64 {
    300
}
fn default_retry_max_age() -> u64 {
    3600
}

impl Default for RetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            cleanup_interval_secs: default_cleanup_interval(),
            max_age_secs: default_retry_max_age(),
        }
    }
}

/// Stuck-asset detector settings.
#[derive(Debug, Deserialize, Clone)]
pub struct StuckScanConfig {
    /// Seconds between scans. Default: 300.
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// An asset whose analysis phase is non-terminal and whose last update is
    /// older than this is considered stuck. Default: 1800.
    #[serde(default = "default_stuck_timeout")]
    pub stuck_timeout_secs: u64,
}

fn default_scan_interval() -> u64 {
    300
}
fn default_stuck_timeout() -> u64 {
    1800
}

impl Default for StuckScanConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
            stuck_timeout_secs: default_stuck_timeout(),
        }
    }
}

/// Classification agent settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    /// Whether triage requests are dispatched at all. Default: true.
    #[serde(default = "default_classifier_enabled")]
    pub enabled: bool,
    /// HTTP endpoint of the text-classification service.
    #[serde(default = "default_classifier_endpoint")]
    pub endpoint: String,
    /// Request timeout in seconds. Default: 30.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,
}

fn default_classifier_enabled() -> bool {
    true
}
fn default_classifier_endpoint() -> String {
    "http://localhost:8089/classify".into()
}
fn default_classifier_timeout() -> u64 {
    30
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            enabled: default_classifier_enabled(),
            endpoint: default_classifier_endpoint(),
            timeout_secs: default_classifier_timeout(),
        }
    }
}
