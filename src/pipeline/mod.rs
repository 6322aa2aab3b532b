pub mod orchestrator;
pub mod sinks;
pub mod worker;
