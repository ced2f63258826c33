pub mod aggregator;
pub mod compute;
pub mod dispatcher;
pub mod expander;
pub mod orchestrator;
pub mod recorder;
