pub mod config;
pub mod errors;
pub mod events;
pub mod feedback;
pub mod gates;
pub mod gateway;
pub mod orchestrator;
pub mod phase;
pub mod server;
pub mod session;
