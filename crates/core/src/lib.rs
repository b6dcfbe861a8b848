//! Core types and configuration for the quote-graph system.
//!
//! This crate provides shared types used across all other crates:
//! - Quote records and aggregation rows
//! - Table schema and typed view configuration
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    Aggregate, Config, IngestionConfig, PlotKind, PrefixCheck, TableConfig, ViewConfig,
};
pub use error::{Error, Result};
pub use types::*;
