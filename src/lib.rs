//! assetwatch: LLM-generated risk summaries for monitored digital assets,
//! run as jobs on a bounded, rate-limited in-process scheduler.

pub mod anthropic;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod persistence;
pub mod scheduler;
pub mod summary;
pub mod ui;
