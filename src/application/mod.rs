pub mod orchestrator;
pub mod registry;
pub mod scheduler;
pub mod stdio;
