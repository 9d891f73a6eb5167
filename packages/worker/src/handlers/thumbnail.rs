use tracing::{info, instrument};

use common::pipeline::StageJob;
use common::{ContentHash, DerivativeFailureReason};

use crate::error::{Result, WorkerError};

/// Generate thumbnail derivatives for an asset.
#[instrument(fields(asset_id = %job.asset_id, job_id = %job.job_id))]
pub fn handle(job: &StageJob) -> Result<serde_json::Value> {
    let Some(source_hash) = job.content_hash.as_deref() else {
        // No stored bytes to read; finalize never completed properly.
        return Err(WorkerError::stage(
            DerivativeFailureReason::SourceCorrupt,
            format!("Asset {} has no content hash, source unreadable", job.asset_id),
        ));
    };

    if ContentHash::from_hex(source_hash).is_err() {
        return Err(WorkerError::stage(
            DerivativeFailureReason::SourceCorrupt,
            format!("Asset {} carries malformed content hash '{source_hash}'", job.asset_id),
        ));
    }

    // TODO: real renditions once the media toolchain lands (transcode
    // service is still being carved out of the upload path).
    let sizes = ["small", "medium", "large"];
    let thumbnails: Vec<serde_json::Value> = sizes
        .iter()
        .map(|size| {
            let name = format!("{}-{size}.webp", job.asset_id);
            let hash = ContentHash::compute(name.as_bytes());
            serde_json::json!({ "name": name, "hash": hash.to_hex(), "size": size })
        })
        .collect();

    info!(count = thumbnails.len(), "Generated thumbnail renditions");

    Ok(serde_json::json!({ "thumbnails": thumbnails }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PipelineStage;
    use uuid::Uuid;

    fn job(content_hash: Option<String>) -> StageJob {
        StageJob::new(
            Uuid::new_v4(),
            "t-1",
            "b-1",
            PipelineStage::Thumbnail,
            "logo.png",
            content_hash,
        )
    }

    #[test]
    fn produces_non_empty_thumbnail_set() {
        let hash = ContentHash::compute(b"bytes").to_hex();
        let artifacts = handle(&job(Some(hash))).unwrap();
        let thumbnails = artifacts["thumbnails"].as_array().unwrap();
        assert_eq!(thumbnails.len(), 3);
        assert!(thumbnails[0]["hash"].as_str().unwrap().len() == 64);
    }

    #[test]
    fn missing_source_is_a_domain_failure() {
        let err = handle(&job(None)).unwrap_err();
        match err {
            WorkerError::Stage { reason, .. } => {
                assert_eq!(reason, DerivativeFailureReason::SourceCorrupt);
                assert!(!reason.is_retryable());
            }
            _ => panic!("expected stage failure"),
        }
    }
}
