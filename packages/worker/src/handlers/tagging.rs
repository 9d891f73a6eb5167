use tracing::{info, instrument};

use common::pipeline::StageJob;

use crate::error::Result;

/// Tag an asset for search.
///
/// Stands in for the AI tagging service: tags are derived from the filename
/// so downstream consumers have something realistic to index.
#[instrument(fields(asset_id = %job.asset_id, job_id = %job.job_id))]
pub fn handle(job: &StageJob) -> Result<serde_json::Value> {
    let stem = job
        .filename
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(&job.filename);

    let mut tags: Vec<String> = stem
        .split(|c: char| c == '-' || c == '_' || c == ' ')
        .filter(|word| word.len() > 2)
        .map(|word| word.to_ascii_lowercase())
        .collect();
    tags.sort();
    tags.dedup();

    info!(count = tags.len(), "Tagged asset");

    Ok(serde_json::json!({ "tags": tags }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PipelineStage;
    use uuid::Uuid;

    #[test]
    fn derives_tags_from_filename() {
        let job = StageJob::new(
            Uuid::new_v4(),
            "t-1",
            "b-1",
            PipelineStage::Tagging,
            "Summer-Campaign_hero banner.jpg",
            None,
        );
        let artifacts = handle(&job).unwrap();
        let tags: Vec<&str> = artifacts["tags"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert!(tags.contains(&"summer"));
        assert!(tags.contains(&"campaign"));
        assert!(tags.contains(&"banner"));
        // Short fragments are dropped.
        assert!(!tags.iter().any(|t| t.len() <= 2));
    }
}
