pub mod asset;
pub mod asset_derivative_failure;
pub mod download;
pub mod system_incident;
pub mod ticket;
pub mod upload_session;
