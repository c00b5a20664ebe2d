//! GitPulse core library.
//!
//! Exposes the crawl → align → normalize → encode → predict / → score
//! pipeline as a set of composable modules, driven end to end by
//! `Orchestrator`.

pub mod config;
pub mod error;
pub mod ingestion;
pub mod model;
pub mod models;
pub mod orchestrator;
pub mod panel;
pub mod scoring;
pub mod storage;

pub use config::Config;
pub use error::CoreError;
pub use orchestrator::Orchestrator;
