//! PyO3 bindings for the quote-graph streaming sink.
//!
//! Lets a Python host hand over its cumulative quote history on every update
//! and read back the pivoted chart:
//! - Quote records
//! - The DuckDB-backed streaming sink
//! - Rendered chart series and encoded view attributes

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use quote_core::{
    Config as RustConfig, Error as RustError, PriceLevel, QuoteRecord as RustQuoteRecord,
    TimestampMs,
};
use quote_ingestion::{AggregationTable, AttachStatus, SinkConfig, StreamingSink};
use quote_store::{ChartSurface, DuckDbEngine};
use tracing::warn;

fn to_py_err(err: RustError) -> PyErr {
    match err {
        RustError::Config(_)
        | RustError::BatchRegressed { .. }
        | RustError::PrefixMismatch { .. }
        | RustError::Json(_) => PyValueError::new_err(err.to_string()),
        RustError::Engine(_) | RustError::Io(_) => PyRuntimeError::new_err(err.to_string()),
    }
}

fn level(price: Option<f64>, size: Option<f64>) -> Option<PriceLevel> {
    if price.is_none() && size.is_none() {
        None
    } else {
        Some(PriceLevel { price, size })
    }
}

// ============================================================================
// Python-exposed Types
// ============================================================================

/// A best bid/ask snapshot for one stock.
#[pyclass]
#[derive(Clone)]
pub struct Quote {
    #[pyo3(get, set)]
    pub stock: String,
    #[pyo3(get, set)]
    pub timestamp_ms: TimestampMs,
    #[pyo3(get, set)]
    pub bid_price: Option<f64>,
    #[pyo3(get, set)]
    pub ask_price: Option<f64>,
    #[pyo3(get, set)]
    pub bid_size: Option<f64>,
    #[pyo3(get, set)]
    pub ask_size: Option<f64>,
}

#[pymethods]
impl Quote {
    #[new]
    #[pyo3(signature = (stock, timestamp_ms, bid_price=None, ask_price=None, bid_size=None, ask_size=None))]
    fn new(
        stock: String,
        timestamp_ms: TimestampMs,
        bid_price: Option<f64>,
        ask_price: Option<f64>,
        bid_size: Option<f64>,
        ask_size: Option<f64>,
    ) -> Self {
        Quote {
            stock,
            timestamp_ms,
            bid_price,
            ask_price,
            bid_size,
            ask_size,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "Quote(stock={}, timestamp_ms={}, bid={:?}, ask={:?})",
            self.stock, self.timestamp_ms, self.bid_price, self.ask_price
        )
    }
}

impl Quote {
    fn to_record(&self) -> PyResult<RustQuoteRecord> {
        let timestamp = Utc
            .timestamp_millis_opt(self.timestamp_ms)
            .single()
            .ok_or_else(|| {
                PyValueError::new_err(format!("timestamp out of range: {}", self.timestamp_ms))
            })?;

        Ok(RustQuoteRecord {
            stock: self.stock.clone(),
            top_bid: level(self.bid_price, self.bid_size),
            top_ask: level(self.ask_price, self.ask_size),
            timestamp,
        })
    }
}

// ============================================================================
// Python-exposed Sink
// ============================================================================

/// Streaming sink writing into a DuckDB aggregation table.
#[pyclass(unsendable)]
pub struct QuoteSink {
    inner: StreamingSink<DuckDbEngine, ChartSurface>,
    engine: Option<DuckDbEngine>,
}

#[pymethods]
impl QuoteSink {
    /// Create a sink. `path=None` keeps the database in memory.
    ///
    /// With a file path, a table of the same name left in the file is dropped.
    #[new]
    #[pyo3(signature = (path=None, table_name=None, config_json=None))]
    fn new(
        path: Option<String>,
        table_name: Option<String>,
        config_json: Option<String>,
    ) -> PyResult<Self> {
        let mut config = match config_json {
            Some(json) => RustConfig::from_json_str(&json).map_err(to_py_err)?,
            None => RustConfig::default(),
        };
        if let Some(name) = table_name {
            config.table.name = name;
        }
        config.table.validate().map_err(to_py_err)?;

        let opened = match &path {
            Some(p) => DuckDbEngine::open(p),
            None => DuckDbEngine::open_in_memory(),
        };
        // A file may still hold the table of a process that exited attached.
        let opened = opened.and_then(|engine| {
            if path.is_some() {
                engine.drop_stale_table(&config.table.name)?;
            }
            Ok(engine)
        });
        let engine = match opened {
            Ok(engine) => Some(engine),
            Err(err) => {
                warn!(error = %err, path = ?path, "aggregation engine failed to open");
                None
            }
        };

        Ok(QuoteSink {
            inner: StreamingSink::new(SinkConfig::from_config(&config), ChartSurface::new()),
            engine,
        })
    }

    /// Attach the table: "attached", "already_attached" or "not_ready".
    fn attach(&mut self) -> PyResult<String> {
        let status = self
            .inner
            .attach(self.engine.as_ref())
            .map_err(to_py_err)?;
        let label = match status {
            AttachStatus::Attached { .. } => "attached",
            AttachStatus::AlreadyAttached => "already_attached",
            AttachStatus::EngineUnavailable => "not_ready",
        };
        Ok(label.to_string())
    }

    /// Deliver the cumulative history. Returns the number of rows inserted.
    fn deliver(&mut self, batch: Vec<Quote>) -> PyResult<usize> {
        let records = batch
            .iter()
            .map(Quote::to_record)
            .collect::<PyResult<Vec<_>>>()?;
        let outcome = self.inner.deliver(&records).map_err(to_py_err)?;
        Ok(outcome.inserted())
    }

    /// Drop the table and reset the cursor.
    fn detach(&mut self) -> PyResult<()> {
        self.inner.detach().map_err(to_py_err)
    }

    /// Number of committed records.
    #[getter]
    fn cursor(&self) -> usize {
        self.inner.cursor()
    }

    #[getter]
    fn is_attached(&self) -> bool {
        self.inner.is_attached()
    }

    /// Rows stored in the table (0 when unattached).
    fn row_count(&self) -> PyResult<usize> {
        match self.inner.table() {
            Some(table) => table.size().map_err(to_py_err),
            None => Ok(0),
        }
    }

    /// Render the chart: series name -> [(row key, value)].
    fn render(&mut self) -> PyResult<HashMap<String, Vec<(String, f64)>>> {
        let frame = self.inner.surface_mut().render().map_err(to_py_err)?;
        Ok(frame
            .series
            .into_iter()
            .map(|s| (s.name, s.points))
            .collect())
    }

    /// View configuration as string attributes for a browser widget.
    fn view_attributes(&self) -> PyResult<HashMap<String, String>> {
        let attrs = self.inner.config().view.to_attributes().map_err(to_py_err)?;
        Ok(attrs
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect())
    }
}

// ============================================================================
// Module Definition
// ============================================================================

/// Quote Graph Core - streaming quote ingestion for Python hosts.
#[pymodule]
fn quote_graph_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<Quote>()?;
    m.add_class::<QuoteSink>()?;
    Ok(())
}
