//! Interfaces of the aggregation engine and rendering surface.
//!
//! The sink only appends normalized rows; averaging, distinct counting and
//! drawing belong to whatever implements these traits.

use quote_core::{AggregationRow, Result, TableSchema, ViewConfig};

/// Runtime able to create aggregation tables.
///
/// Passed explicitly to [`StreamingSink::attach`](crate::StreamingSink::attach);
/// an unavailable runtime is `None` there rather than a global lookup.
pub trait AggregationEngine {
    /// Table type produced by this engine.
    type Table: AggregationTable;

    /// Create an empty table with the given schema.
    fn create_table(&self, name: &str, schema: &TableSchema) -> Result<Self::Table>;
}

/// Append-only columnar table.
pub trait AggregationTable {
    /// Table name.
    fn name(&self) -> &str;

    /// Declared schema.
    fn schema(&self) -> &TableSchema;

    /// Append rows as one batch.
    fn insert(&mut self, rows: &[AggregationRow]) -> Result<()>;

    /// Number of stored rows.
    fn size(&self) -> Result<usize>;

    /// Destroy the table.
    fn drop_table(self) -> Result<()>
    where
        Self: Sized;
}

/// Visual element that renders a table according to a view configuration.
pub trait RenderSurface<T: AggregationTable> {
    /// Apply the declarative view configuration.
    fn apply_view(&mut self, view: &ViewConfig) -> Result<()>;

    /// Bind a table; the surface redraws from it from now on.
    fn load(&mut self, table: &T) -> Result<()>;

    /// Called after each successful append.
    fn rows_inserted(&mut self, count: usize);

    /// Release the bound table.
    fn unload(&mut self);
}
