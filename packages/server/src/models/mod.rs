pub mod assets;
pub mod incidents;
pub mod shared;
pub mod tickets;
