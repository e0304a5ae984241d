pub mod config;
pub mod logging;

pub mod control;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod queue;
pub mod reaper;
pub mod service;
pub mod task;
