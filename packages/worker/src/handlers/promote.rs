use tracing::{info, instrument};

use common::pipeline::StageJob;
use common::{ContentHash, DerivativeFailureReason};

use crate::error::{Result, WorkerError};

/// Promote an asset into end-user views.
///
/// The actual visibility flip happens server-side when this stage's result is
/// absorbed; the worker's job is the final integrity check.
#[instrument(fields(asset_id = %job.asset_id, job_id = %job.job_id))]
pub fn handle(job: &StageJob) -> Result<serde_json::Value> {
    let Some(hash) = job.content_hash.as_deref() else {
        return Err(WorkerError::stage(
            DerivativeFailureReason::SourceCorrupt,
            format!("Asset {} has no content hash at promotion time", job.asset_id),
        ));
    };
    if ContentHash::from_hex(hash).is_err() {
        return Err(WorkerError::stage(
            DerivativeFailureReason::SourceCorrupt,
            format!("Asset {} content hash '{hash}' is not a valid digest", job.asset_id),
        ));
    }

    info!("Asset cleared for promotion");

    Ok(serde_json::json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PipelineStage;
    use uuid::Uuid;

    #[test]
    fn valid_hash_promotes() {
        let job = StageJob::new(
            Uuid::new_v4(),
            "t-1",
            "b-1",
            PipelineStage::Promotion,
            "logo.png",
            Some(ContentHash::compute(b"bytes").to_hex()),
        );
        assert!(handle(&job).is_ok());
    }

    #[test]
    fn missing_hash_blocks_promotion() {
        let job = StageJob::new(
            Uuid::new_v4(),
            "t-1",
            "b-1",
            PipelineStage::Promotion,
            "logo.png",
            None,
        );
        assert!(handle(&job).is_err());
    }
}
