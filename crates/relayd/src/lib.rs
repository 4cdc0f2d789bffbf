//! Relay daemon library - exposes modules for testing.

pub mod backend;
pub mod classifier;
pub mod config;
pub mod error;
pub mod formatter;
pub mod llm_client;
pub mod metrics;
pub mod orchestrator;
pub mod registry;
pub mod routes;
pub mod server;
