pub mod api;
pub mod job;
pub mod selection;
