pub mod acquire;
pub mod analysis;
pub mod config;
pub mod server;
