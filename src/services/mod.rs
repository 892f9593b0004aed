pub mod artifacts;
pub mod background;
pub mod dispatcher;
pub mod engine;
pub mod job_builder;
pub mod scenes;
pub mod setup;
pub mod workflow;
