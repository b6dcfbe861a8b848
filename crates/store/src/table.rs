//! DuckDB aggregation engine.
//!
//! Each table gets its own handle on the engine's database, so the sink can
//! own the table while the chart surface reads from it.

use crate::query::{bind_value, create_table_sql, insert_sql, quote_ident};
use duckdb::{params_from_iter, Connection};
use quote_core::{AggregationRow, Error, Result, TableSchema};
use quote_ingestion::{AggregationEngine, AggregationTable};
use std::path::Path;
use tracing::debug;

/// Convert a DuckDB error.
pub(crate) fn db_err(err: duckdb::Error) -> Error {
    Error::engine(err.to_string())
}

/// Aggregation engine backed by a DuckDB database.
pub struct DuckDbEngine {
    conn: Connection,
}

impl DuckDbEngine {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Drop a table left behind by a sink that never detached.
    ///
    /// A file database keeps its tables across processes, and `create_table`
    /// refuses an existing name.
    pub fn drop_stale_table(&self, name: &str) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))
            .map_err(db_err)?;
        debug!(table = name, "cleared stale table");
        Ok(())
    }
}

impl AggregationEngine for DuckDbEngine {
    type Table = DuckDbTable;

    fn create_table(&self, name: &str, schema: &TableSchema) -> Result<DuckDbTable> {
        let conn = self.conn.try_clone().map_err(db_err)?;
        conn.execute_batch(&create_table_sql(name, schema))
            .map_err(db_err)?;
        debug!(table = name, columns = schema.len(), "created table");

        Ok(DuckDbTable {
            conn,
            name: name.to_string(),
            schema: schema.clone(),
            insert_sql: insert_sql(name, schema),
        })
    }
}

/// Append-only table in a DuckDB database.
pub struct DuckDbTable {
    conn: Connection,
    name: String,
    schema: TableSchema,
    insert_sql: String,
}

impl DuckDbTable {
    /// Connection the table lives on.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl AggregationTable for DuckDbTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &TableSchema {
        &self.schema
    }

    fn insert(&mut self, rows: &[AggregationRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction().map_err(db_err)?;
        {
            let mut stmt = tx.prepare(&self.insert_sql).map_err(db_err)?;
            for row in rows {
                let values = self
                    .schema
                    .columns()
                    .iter()
                    .map(|(column, _)| bind_value(row.value(*column)));
                stmt.execute(params_from_iter(values)).map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    fn size(&self) -> Result<usize> {
        let sql = format!("SELECT count(*) FROM {}", quote_ident(&self.name));
        let count: i64 = self
            .conn
            .query_row(&sql, [], |row| row.get(0))
            .map_err(db_err)?;
        usize::try_from(count).map_err(|_| Error::engine(format!("negative row count {count}")))
    }

    fn drop_table(self) -> Result<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(&self.name)))
            .map_err(db_err)?;
        debug!(table = %self.name, "dropped table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};

    fn row(stock: &str, ms: i64, bid: f64, ask: f64) -> AggregationRow {
        AggregationRow {
            stock: stock.to_string(),
            top_bid_price: bid,
            top_ask_price: ask,
            timestamp: Utc.timestamp_millis_opt(ms).unwrap(),
        }
    }

    #[test]
    fn test_create_insert_size() {
        let engine = DuckDbEngine::open_in_memory().unwrap();
        let mut table = engine.create_table("quotes", &TableSchema::quotes()).unwrap();

        assert_eq!(table.size().unwrap(), 0);
        table
            .insert(&[row("ABC", 1_000, 99.0, 100.0), row("DEF", 1_000, 119.0, 120.0)])
            .unwrap();
        table.insert(&[]).unwrap();
        assert_eq!(table.size().unwrap(), 2);
    }

    #[test]
    fn test_values_round_trip_through_engine() {
        let engine = DuckDbEngine::open_in_memory().unwrap();
        let mut table = engine.create_table("quotes", &TableSchema::quotes()).unwrap();
        table.insert(&[row("ABC", 1_549_029_469_998, 99.5, 100.25)]).unwrap();

        let (stock, ask, bid, ms): (String, f64, f64, i64) = engine
            .connection()
            .query_row(
                r#"SELECT "stock", "top_ask_price", "top_bid_price", epoch_ms("timestamp") FROM "quotes""#,
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();

        assert_eq!(stock, "ABC");
        assert_relative_eq!(ask, 100.25);
        assert_relative_eq!(bid, 99.5);
        assert_eq!(ms, 1_549_029_469_998);
    }

    #[test]
    fn test_duplicate_create_fails() {
        let engine = DuckDbEngine::open_in_memory().unwrap();
        let _table = engine.create_table("quotes", &TableSchema::quotes()).unwrap();

        let err = engine
            .create_table("quotes", &TableSchema::quotes())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Engine(_)));
    }

    #[test]
    fn test_drop_allows_recreate() {
        let engine = DuckDbEngine::open_in_memory().unwrap();
        let mut table = engine.create_table("quotes", &TableSchema::quotes()).unwrap();
        table.insert(&[row("ABC", 0, 1.0, 2.0)]).unwrap();
        table.drop_table().unwrap();

        let table = engine.create_table("quotes", &TableSchema::quotes()).unwrap();
        assert_eq!(table.size().unwrap(), 0);
    }

    #[test]
    fn test_stale_table_cleared_before_attach() {
        let engine = DuckDbEngine::open_in_memory().unwrap();
        let mut table = engine.create_table("quotes", &TableSchema::quotes()).unwrap();
        table.insert(&[row("ABC", 0, 1.0, 2.0)]).unwrap();
        // Never detached, so the table outlives its handle.
        std::mem::forget(table);

        assert!(engine.create_table("quotes", &TableSchema::quotes()).is_err());
        engine.drop_stale_table("quotes").unwrap();
        engine.drop_stale_table("quotes").unwrap();

        let table = engine.create_table("quotes", &TableSchema::quotes()).unwrap();
        assert_eq!(table.size().unwrap(), 0);
    }
}
