pub mod http;
pub mod orchestrator;
pub mod subsystems;
