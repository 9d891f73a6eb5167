use tracing::{info, instrument};

use common::pipeline::StageJob;

use crate::error::Result;

/// Extract technical metadata for an asset.
#[instrument(fields(asset_id = %job.asset_id, job_id = %job.job_id))]
pub fn handle(job: &StageJob) -> Result<serde_json::Value> {
    let guessed = mime_guess::from_path(&job.filename).first_raw();

    let extension = job
        .filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    let mut extracted = serde_json::json!({
        "filename": job.filename,
        "extension": extension,
    });
    if let Some(hash) = &job.content_hash {
        extracted["content_hash"] = serde_json::Value::String(hash.clone());
    }

    info!(content_type = ?guessed, "Extracted asset metadata");

    let mut artifacts = serde_json::json!({ "extracted": extracted });
    if let Some(content_type) = guessed {
        artifacts["content_type"] = serde_json::Value::String(content_type.to_string());
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PipelineStage;
    use uuid::Uuid;

    fn job(filename: &str) -> StageJob {
        StageJob::new(
            Uuid::new_v4(),
            "t-1",
            "b-1",
            PipelineStage::Metadata,
            filename,
            None,
        )
    }

    #[test]
    fn sniffs_content_type_from_filename() {
        let artifacts = handle(&job("brand-logo.png")).unwrap();
        assert_eq!(artifacts["content_type"], "image/png");
        assert_eq!(artifacts["extracted"]["extension"], "png");
    }

    #[test]
    fn unknown_extension_yields_no_content_type() {
        let artifacts = handle(&job("mystery.qqq")).unwrap();
        assert!(artifacts.get("content_type").is_none());
        // Extraction itself still succeeds.
        assert_eq!(artifacts["extracted"]["extension"], "qqq");
    }
}
