pub mod store;
pub mod stuck;

pub use store::{IncidentStore, IncidentStats, ResolveResult, incident_store};
pub use stuck::run_stuck_asset_detector;
