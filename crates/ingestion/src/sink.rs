//! Streaming sink.
//!
//! Receives the cumulative quote history on every update and appends only
//! the records it has not committed yet, so every record reaches the
//! aggregation table exactly once.

use crate::cursor::IngestionCursor;
use crate::engine::{AggregationEngine, AggregationTable, RenderSurface};
use crate::normalizer::normalize_batch;
use quote_core::{Config, IngestionConfig, QuoteRecord, Result, TableConfig, TableSchema, ViewConfig};
use tracing::{debug, error, info, warn};

/// Sink configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Table to create on attach.
    pub table: TableConfig,
    /// Schema of that table.
    pub schema: TableSchema,
    /// View applied to the surface on attach.
    pub view: ViewConfig,
    /// Delivery checks and pre-attach buffering.
    pub ingestion: IngestionConfig,
}

impl SinkConfig {
    /// Build from the system configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            table: config.table.clone(),
            schema: TableSchema::quotes(),
            view: config.view.clone(),
            ingestion: config.ingestion.clone(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of [`StreamingSink::attach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStatus {
    /// Table created and bound; `flushed` buffered records were committed.
    Attached { flushed: usize },
    /// A table was already attached; nothing changed.
    AlreadyAttached,
    /// No engine was available; the sink stays unattached and can retry.
    EngineUnavailable,
}

impl AttachStatus {
    /// Whether the sink has a table after this call.
    pub fn is_attached(self) -> bool {
        !matches!(self, AttachStatus::EngineUnavailable)
    }
}

/// Result of [`StreamingSink::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// `inserted` new rows were appended; the cursor now stands at `cursor`.
    Committed { inserted: usize, cursor: usize },
    /// The batch held nothing new.
    Unchanged { cursor: usize },
    /// Unattached; `records` leading records were kept for the next attach.
    Buffered { records: usize },
    /// Unattached with buffering disabled; the batch was discarded.
    Dropped { records: usize },
}

impl DeliveryOutcome {
    /// Rows appended to the table by this delivery.
    pub fn inserted(self) -> usize {
        match self {
            DeliveryOutcome::Committed { inserted, .. } => inserted,
            _ => 0,
        }
    }
}

/// Stateful sink owning the aggregation table for its lifetime.
pub struct StreamingSink<E, S>
where
    E: AggregationEngine,
    S: RenderSurface<E::Table>,
{
    config: SinkConfig,
    surface: S,
    table: Option<E::Table>,
    cursor: IngestionCursor,
    /// Latest cumulative batch seen while unattached.
    pending: Option<Vec<QuoteRecord>>,
}

impl<E, S> StreamingSink<E, S>
where
    E: AggregationEngine,
    S: RenderSurface<E::Table>,
{
    /// Create an unattached sink rendering into `surface`.
    pub fn new(config: SinkConfig, surface: S) -> Self {
        Self {
            config,
            surface,
            table: None,
            cursor: IngestionCursor::new(),
            pending: None,
        }
    }

    /// Create the table and bind it to the surface.
    ///
    /// `engine` is `None` when the aggregation runtime is not available yet;
    /// that is reported as [`AttachStatus::EngineUnavailable`], not an error.
    pub fn attach(&mut self, engine: Option<&E>) -> Result<AttachStatus> {
        if self.table.is_some() {
            debug!(table = %self.config.table.name, "sink already attached");
            return Ok(AttachStatus::AlreadyAttached);
        }

        let Some(engine) = engine else {
            warn!(
                table = %self.config.table.name,
                "aggregation engine unavailable, sink stays unattached"
            );
            return Ok(AttachStatus::EngineUnavailable);
        };

        self.config.table.validate()?;
        self.config.view.validate(&self.config.schema)?;

        let table = engine.create_table(&self.config.table.name, &self.config.schema)?;
        if let Err(err) = self.bind(&table) {
            self.surface.unload();
            if let Err(drop_err) = table.drop_table() {
                warn!(error = %drop_err, "failed to drop table after bind failure");
            }
            return Err(err);
        }

        self.cursor.reset();
        self.table = Some(table);
        info!(table = %self.config.table.name, "sink attached");

        let flushed = self.flush_pending();
        Ok(AttachStatus::Attached { flushed })
    }

    fn bind(&mut self, table: &E::Table) -> Result<()> {
        self.surface.apply_view(&self.config.view)?;
        self.surface.load(table)
    }

    /// Commit the buffered batch, if any.
    fn flush_pending(&mut self) -> usize {
        let Some(batch) = self.pending.take() else {
            return 0;
        };
        match self.commit(&batch) {
            Ok(outcome) => outcome.inserted(),
            Err(err) => {
                warn!(
                    error = %err,
                    records = batch.len(),
                    "failed to flush buffered batch, waiting for next delivery"
                );
                0
            }
        }
    }

    /// Deliver the cumulative history known to the producer.
    ///
    /// `batch` must extend every batch delivered before it. A shorter batch or
    /// one whose committed prefix changed is rejected without touching the
    /// table or the cursor.
    pub fn deliver(&mut self, batch: &[QuoteRecord]) -> Result<DeliveryOutcome> {
        if self.table.is_none() {
            return Ok(self.hold(batch));
        }
        self.commit(batch)
    }

    fn hold(&mut self, batch: &[QuoteRecord]) -> DeliveryOutcome {
        let records = batch.len();
        if !self.config.ingestion.buffer_before_attach {
            warn!(records, "sink not attached, batch dropped");
            return DeliveryOutcome::Dropped { records };
        }

        let kept = records.min(self.config.ingestion.max_pending_records);
        if kept < records {
            warn!(records, kept, "sink not attached, buffered batch truncated");
        }
        self.pending = Some(batch[..kept].to_vec());
        DeliveryOutcome::Buffered { records: kept }
    }

    fn commit(&mut self, batch: &[QuoteRecord]) -> Result<DeliveryOutcome> {
        let Some(table) = self.table.as_mut() else {
            return Ok(DeliveryOutcome::Dropped {
                records: batch.len(),
            });
        };

        if let Err(err) = self.cursor.check(batch, self.config.ingestion.prefix_check) {
            error!(
                table = table.name(),
                cursor = self.cursor.position(),
                received = batch.len(),
                error = %err,
                "rejected delivery"
            );
            return Err(err);
        }

        let delta = self.cursor.delta(batch);
        if delta.is_empty() {
            debug!(table = table.name(), cursor = self.cursor.position(), "no new records");
            return Ok(DeliveryOutcome::Unchanged {
                cursor: self.cursor.position(),
            });
        }

        let rows = normalize_batch(delta);
        if let Err(err) = table.insert(&rows) {
            error!(
                table = table.name(),
                cursor = self.cursor.position(),
                rows = rows.len(),
                error = %err,
                "insert failed"
            );
            return Err(err);
        }

        self.cursor.advance(delta);
        self.surface.rows_inserted(rows.len());
        debug!(
            table = table.name(),
            inserted = rows.len(),
            cursor = self.cursor.position(),
            "committed delta"
        );

        Ok(DeliveryOutcome::Committed {
            inserted: rows.len(),
            cursor: self.cursor.position(),
        })
    }

    /// Tear down the table and reset all state. Calling it again is a no-op.
    ///
    /// State is reset even if the engine fails to drop the table.
    pub fn detach(&mut self) -> Result<()> {
        self.pending = None;
        self.cursor.reset();

        let Some(table) = self.table.take() else {
            return Ok(());
        };
        self.surface.unload();
        let name = table.name().to_string();
        let result = table.drop_table();
        info!(table = %name, "sink detached");
        result
    }

    /// Whether a table is attached.
    pub fn is_attached(&self) -> bool {
        self.table.is_some()
    }

    /// Number of records committed to the current table.
    pub fn cursor(&self) -> usize {
        self.cursor.position()
    }

    /// Records waiting for attach.
    pub fn pending_records(&self) -> usize {
        self.pending.as_ref().map_or(0, Vec::len)
    }

    /// The attached table.
    pub fn table(&self) -> Option<&E::Table> {
        self.table.as_ref()
    }

    /// The rendering surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutable access to the rendering surface.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// The sink configuration.
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }
}

impl<E, S> Drop for StreamingSink<E, S>
where
    E: AggregationEngine,
    S: RenderSurface<E::Table>,
{
    fn drop(&mut self) {
        if let Err(err) = self.detach() {
            warn!(error = %err, "failed to drop table on sink teardown");
        }
    }
}
