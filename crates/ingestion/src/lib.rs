//! Streaming ingestion for the quote-graph system.
//!
//! This crate handles:
//! - Quote normalization into aggregation rows
//! - Committed-prefix tracking across cumulative deliveries
//! - The streaming sink that owns the aggregation table
//! - Engine and rendering surface interfaces

pub mod normalizer;
pub mod cursor;
pub mod engine;
pub mod sink;

pub use normalizer::{normalize, normalize_batch};
pub use cursor::IngestionCursor;
pub use engine::{AggregationEngine, AggregationTable, RenderSurface};
pub use sink::{AttachStatus, DeliveryOutcome, SinkConfig, StreamingSink};
