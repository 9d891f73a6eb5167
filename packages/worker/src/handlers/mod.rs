pub mod metadata;
pub mod promote;
pub mod tagging;
pub mod thumbnail;

use common::PipelineStage;
use common::pipeline::StageJob;

use crate::error::Result;

/// Run the handler for the job's stage and return its artifacts.
pub fn handle_stage(job: &StageJob) -> Result<serde_json::Value> {
    match job.stage {
        PipelineStage::Thumbnail => thumbnail::handle(job),
        PipelineStage::Metadata => metadata::handle(job),
        PipelineStage::Tagging => tagging::handle(job),
        PipelineStage::Promotion => promote::handle(job),
    }
}
