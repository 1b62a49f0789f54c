pub mod naming;
pub mod orchestrator;
pub mod request;
