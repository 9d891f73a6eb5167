pub mod activity;
pub mod plan;

pub use activity::ActivitySink;
pub use plan::{CachedPlanService, Feature, PlanService, StaticPlanService};
