//! DuckDB-backed aggregation for the quote-graph system.
//!
//! This crate provides:
//! - An [`AggregationEngine`](quote_ingestion::AggregationEngine) over DuckDB tables
//! - SQL generation for schemas, inserts and pivoted views
//! - A chart surface that renders the configured view as series

pub mod query;
pub mod table;
pub mod surface;

pub use table::{DuckDbEngine, DuckDbTable};
pub use surface::{ChartFrame, ChartSurface, Series, TOTAL_ROW};
