pub mod assets;
pub mod incidents;
pub mod tickets;
