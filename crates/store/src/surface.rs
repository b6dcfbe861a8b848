//! Chart surface rendering a pivoted view of a DuckDB table.

use crate::query::pivot_query;
use crate::table::{db_err, DuckDbTable};
use duckdb::Connection;
use quote_core::{Error, PlotKind, Result, TableSchema, ViewConfig};
use quote_ingestion::{AggregationTable, RenderSurface};
use std::collections::BTreeMap;
use tracing::debug;

/// Row key used when the view has no row pivots.
pub const TOTAL_ROW: &str = "Total";

/// One line (or bar group) of the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    /// `<column pivot values>|<measure>`, or just the measure without column pivots.
    pub name: String,
    /// `(row key, aggregated value)` in row order.
    pub points: Vec<(String, f64)>,
}

/// A fully aggregated snapshot of the view.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartFrame {
    pub plot: PlotKind,
    /// Distinct row keys in row-pivot order.
    pub row_keys: Vec<String>,
    /// Series sorted by name.
    pub series: Vec<Series>,
}

impl ChartFrame {
    /// Find a series by name.
    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }
}

struct Bound {
    conn: Connection,
    table: String,
    schema: TableSchema,
}

/// Rendering surface that aggregates through SQL.
///
/// Inserted rows only mark the chart stale; [`ChartSurface::render`] redraws.
pub struct ChartSurface {
    view: ViewConfig,
    bound: Option<Bound>,
    stale: bool,
    frames_rendered: u64,
}

impl ChartSurface {
    /// Create an empty surface with the default view.
    pub fn new() -> Self {
        Self {
            view: ViewConfig::default(),
            bound: None,
            stale: false,
            frames_rendered: 0,
        }
    }

    /// Current view configuration.
    pub fn view(&self) -> &ViewConfig {
        &self.view
    }

    /// Whether a table is bound.
    pub fn is_loaded(&self) -> bool {
        self.bound.is_some()
    }

    /// Whether rows arrived since the last render.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Number of frames rendered so far.
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Aggregate the bound table into a frame.
    pub fn render(&mut self) -> Result<ChartFrame> {
        let bound = self
            .bound
            .as_ref()
            .ok_or_else(|| Error::engine("no table loaded into chart surface"))?;

        let view = &self.view;
        let row_pivots = view.row_pivots.len();
        let column_pivots = view.column_pivots.len();
        let measures: Vec<&'static str> = view.columns.iter().map(|c| c.name()).collect();

        let sql = pivot_query(&bound.table, &bound.schema, view);
        let mut stmt = bound.conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                let mut keys = Vec::with_capacity(row_pivots + column_pivots);
                for i in 0..row_pivots + column_pivots {
                    keys.push(row.get::<_, Option<String>>(i)?.unwrap_or_default());
                }
                let mut values = Vec::with_capacity(measures.len());
                for i in 0..measures.len() {
                    values.push(row.get::<_, Option<f64>>(row_pivots + column_pivots + i)?);
                }
                Ok((keys, values))
            })
            .map_err(db_err)?;

        let mut row_keys: Vec<String> = Vec::new();
        let mut series: BTreeMap<String, Vec<(String, f64)>> = BTreeMap::new();
        for row in rows {
            let (keys, values) = row.map_err(db_err)?;
            let (row_part, column_part) = keys.split_at(row_pivots);

            let row_key = if row_part.is_empty() {
                TOTAL_ROW.to_string()
            } else {
                row_part.join(" / ")
            };
            if row_keys.last() != Some(&row_key) {
                row_keys.push(row_key.clone());
            }

            for (measure, value) in measures.iter().zip(values) {
                let Some(value) = value else { continue };
                let name = if column_part.is_empty() {
                    measure.to_string()
                } else {
                    format!("{}|{}", column_part.join("|"), measure)
                };
                series.entry(name).or_default().push((row_key.clone(), value));
            }
        }

        self.stale = false;
        self.frames_rendered += 1;
        debug!(
            table = %bound.table,
            rows = row_keys.len(),
            series = series.len(),
            "rendered chart frame"
        );

        Ok(ChartFrame {
            plot: view.plot,
            row_keys,
            series: series
                .into_iter()
                .map(|(name, points)| Series { name, points })
                .collect(),
        })
    }
}

impl Default for ChartSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface<DuckDbTable> for ChartSurface {
    fn apply_view(&mut self, view: &ViewConfig) -> Result<()> {
        self.view = view.clone();
        self.stale = true;
        Ok(())
    }

    fn load(&mut self, table: &DuckDbTable) -> Result<()> {
        let conn = table.connection().try_clone().map_err(db_err)?;
        self.bound = Some(Bound {
            conn,
            table: table.name().to_string(),
            schema: table.schema().clone(),
        });
        self.stale = true;
        Ok(())
    }

    fn rows_inserted(&mut self, _count: usize) {
        self.stale = true;
    }

    fn unload(&mut self) {
        self.bound = None;
        self.stale = false;
    }
}
