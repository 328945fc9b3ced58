pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;
pub mod matcher;
pub mod merge;
pub mod optout;
pub mod orchestrator;
pub mod providers;
pub mod server;
