//! Configuration structures for the quote-graph system.

use crate::error::{Error, Result};
use crate::types::{Column, ColumnType, TableSchema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Aggregation table configuration.
    pub table: TableConfig,
    /// Chart view configuration.
    pub view: ViewConfig,
    /// Ingestion behaviour.
    pub ingestion: IngestionConfig,
}

impl Config {
    /// Parse a configuration from JSON. Missing sections take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

/// Aggregation table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Table name inside the aggregation engine.
    pub name: String,
}

impl TableConfig {
    /// Check that the name is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn validate(&self) -> Result<()> {
        let mut chars = self.name.chars();
        let valid = match chars.next() {
            Some(first) => {
                (first.is_ascii_alphabetic() || first == '_')
                    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            None => false,
        };
        if valid {
            Ok(())
        } else {
            Err(Error::config(format!("invalid table name {:?}", self.name)))
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "quotes".to_string(),
        }
    }
}

/// How deliveries are checked against the committed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixCheck {
    /// Fingerprint the whole committed prefix on every delivery.
    #[default]
    Full,
    /// Compare only the last committed record.
    Tail,
    /// Only reject batches shorter than the cursor.
    LengthOnly,
}

/// Ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Prefix validation mode.
    pub prefix_check: PrefixCheck,
    /// Keep the latest batch delivered before attach and flush it on attach.
    pub buffer_before_attach: bool,
    /// Maximum leading records kept from a pre-attach batch.
    pub max_pending_records: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            prefix_check: PrefixCheck::Full,
            buffer_before_attach: true,
            max_pending_records: 100_000,
        }
    }
}

/// Chart rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlotKind {
    /// Continuous line.
    #[default]
    YLine,
    XBar,
    YBar,
    YScatter,
    Datagrid,
}

impl PlotKind {
    /// Plugin name understood by attribute-configured widgets.
    pub fn name(self) -> &'static str {
        match self {
            PlotKind::YLine => "y_line",
            PlotKind::XBar => "x_bar",
            PlotKind::YBar => "y_bar",
            PlotKind::YScatter => "y_scatter",
            PlotKind::Datagrid => "datagrid",
        }
    }
}

/// Aggregate function applied to a column within a pivot bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregate {
    #[serde(rename = "avg")]
    Avg,
    #[serde(rename = "sum")]
    Sum,
    #[serde(rename = "count")]
    Count,
    #[serde(rename = "distinct count")]
    DistinctCount,
    #[serde(rename = "min")]
    Min,
    #[serde(rename = "max")]
    Max,
    #[serde(rename = "last")]
    Last,
}

impl Aggregate {
    /// Function name as written in encoded view attributes.
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Avg => "avg",
            Aggregate::Sum => "sum",
            Aggregate::Count => "count",
            Aggregate::DistinctCount => "distinct count",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::Last => "last",
        }
    }

    /// Whether the function only makes sense on numeric columns.
    pub fn requires_numeric(self) -> bool {
        matches!(
            self,
            Aggregate::Avg | Aggregate::Sum | Aggregate::Min | Aggregate::Max
        )
    }

    /// Default aggregate for a column type.
    pub fn default_for(column_type: ColumnType) -> Self {
        if column_type.is_numeric() {
            Aggregate::Avg
        } else {
            Aggregate::DistinctCount
        }
    }
}

/// Declarative pivot/aggregate configuration of the chart.
///
/// Set once when the table is attached; never recomputed per batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Rendering mode.
    pub plot: PlotKind,
    /// Columns pivoted into separate series.
    pub column_pivots: Vec<Column>,
    /// Columns bucketing rows along the x-axis.
    pub row_pivots: Vec<Column>,
    /// Displayed measures.
    pub columns: Vec<Column>,
    /// Aggregate function per column.
    pub aggregates: BTreeMap<Column, Aggregate>,
}

impl Default for ViewConfig {
    fn default() -> Self {
        let aggregates = BTreeMap::from([
            (Column::Stock, Aggregate::DistinctCount),
            (Column::TopAskPrice, Aggregate::Avg),
            (Column::TopBidPrice, Aggregate::Avg),
            (Column::Timestamp, Aggregate::DistinctCount),
        ]);
        Self {
            plot: PlotKind::YLine,
            column_pivots: vec![Column::Stock],
            row_pivots: vec![Column::Timestamp],
            columns: vec![Column::TopAskPrice],
            aggregates,
        }
    }
}

impl ViewConfig {
    /// Validate the view against a table schema.
    pub fn validate(&self, schema: &TableSchema) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::config("view must display at least one column"));
        }

        let referenced = self
            .column_pivots
            .iter()
            .chain(&self.row_pivots)
            .chain(&self.columns)
            .chain(self.aggregates.keys());
        for column in referenced {
            if !schema.contains(*column) {
                return Err(Error::config(format!("column {column} is not in the schema")));
            }
        }

        let mut pivots = BTreeSet::new();
        for (list, label) in [
            (&self.column_pivots, "column pivots"),
            (&self.row_pivots, "row pivots"),
        ] {
            for column in list {
                if !pivots.insert(*column) {
                    return Err(Error::config(format!("column {column} repeated in {label}")));
                }
            }
        }

        let mut shown = BTreeSet::new();
        for column in &self.columns {
            if !shown.insert(*column) {
                return Err(Error::config(format!("column {column} displayed twice")));
            }
            if pivots.contains(column) {
                return Err(Error::config(format!(
                    "column {column} cannot be both pivoted and displayed"
                )));
            }
        }

        for (column, aggregate) in &self.aggregates {
            let is_numeric = schema
                .column_type(*column)
                .is_some_and(ColumnType::is_numeric);
            if aggregate.requires_numeric() && !is_numeric {
                return Err(Error::config(format!(
                    "aggregate {} needs a numeric column, {column} is not",
                    aggregate.name()
                )));
            }
        }

        Ok(())
    }

    /// Aggregate applied to a column, falling back to the type default.
    pub fn aggregate_for(&self, column: Column, schema: &TableSchema) -> Aggregate {
        self.aggregates.get(&column).copied().unwrap_or_else(|| {
            schema
                .column_type(column)
                .map(Aggregate::default_for)
                .unwrap_or(Aggregate::Count)
        })
    }

    /// Encode the view as string attributes for attribute-configured widgets.
    ///
    /// Keys: `view`, `column-pivots`, `row-pivots`, `columns`, `aggregates`.
    pub fn to_attributes(&self) -> Result<Vec<(&'static str, String)>> {
        let names = |columns: &[Column]| -> Vec<&'static str> {
            columns.iter().map(|c| c.name()).collect()
        };

        Ok(vec![
            ("view", self.plot.name().to_string()),
            ("column-pivots", serde_json::to_string(&names(&self.column_pivots))?),
            ("row-pivots", serde_json::to_string(&names(&self.row_pivots))?),
            ("columns", serde_json::to_string(&names(&self.columns))?),
            ("aggregates", serde_json::to_string(&self.aggregates)?),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.table.name, "quotes");
        assert_eq!(config.view.plot, PlotKind::YLine);
        assert_eq!(config.view.column_pivots, vec![Column::Stock]);
        assert_eq!(config.view.row_pivots, vec![Column::Timestamp]);
        assert_eq!(config.ingestion.prefix_check, PrefixCheck::Full);
        assert!(config.ingestion.buffer_before_attach);
    }

    #[test]
    fn test_default_view_is_valid() {
        assert!(ViewConfig::default().validate(&TableSchema::quotes()).is_ok());
    }

    #[test]
    fn test_default_attributes() {
        let attrs = ViewConfig::default().to_attributes().unwrap();
        let get = |key: &str| attrs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str());

        assert_eq!(get("view"), Some("y_line"));
        assert_eq!(get("column-pivots"), Some(r#"["stock"]"#));
        assert_eq!(get("row-pivots"), Some(r#"["timestamp"]"#));
        assert_eq!(get("columns"), Some(r#"["top_ask_price"]"#));
        assert_eq!(
            get("aggregates"),
            Some(
                r#"{"stock":"distinct count","top_ask_price":"avg","top_bid_price":"avg","timestamp":"distinct count"}"#
            )
        );
    }

    #[test]
    fn test_rejects_numeric_aggregate_on_string() {
        let mut view = ViewConfig::default();
        view.aggregates.insert(Column::Stock, Aggregate::Avg);
        assert!(matches!(
            view.validate(&TableSchema::quotes()),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_pivoted_measure() {
        let mut view = ViewConfig::default();
        view.columns.push(Column::Stock);
        assert!(view.validate(&TableSchema::quotes()).is_err());
    }

    #[test]
    fn test_rejects_column_in_both_pivots() {
        let mut view = ViewConfig::default();
        view.row_pivots.push(Column::Stock);
        assert!(view.validate(&TableSchema::quotes()).is_err());
    }

    #[test]
    fn test_rejects_empty_columns() {
        let mut view = ViewConfig::default();
        view.columns.clear();
        assert!(view.validate(&TableSchema::quotes()).is_err());
    }

    #[test]
    fn test_rejects_column_outside_schema() {
        let schema = TableSchema::new(vec![
            (Column::Stock, ColumnType::String),
            (Column::TopAskPrice, ColumnType::Float),
        ]);
        let view = ViewConfig {
            row_pivots: vec![Column::Timestamp],
            aggregates: BTreeMap::new(),
            ..ViewConfig::default()
        };
        assert!(view.validate(&schema).is_err());
    }

    #[test]
    fn test_aggregate_fallback() {
        let view = ViewConfig {
            aggregates: BTreeMap::new(),
            ..ViewConfig::default()
        };
        let schema = TableSchema::quotes();
        assert_eq!(view.aggregate_for(Column::TopBidPrice, &schema), Aggregate::Avg);
        assert_eq!(view.aggregate_for(Column::Stock, &schema), Aggregate::DistinctCount);
    }

    #[test]
    fn test_config_from_partial_json() {
        let json = r#"{
            "table": {"name": "bbo"},
            "view": {"plot": "y_scatter", "aggregates": {"top_ask_price": "max"}},
            "ingestion": {"prefix_check": "tail"}
        }"#;
        let config = Config::from_json_str(json).unwrap();
        assert_eq!(config.table.name, "bbo");
        assert_eq!(config.view.plot, PlotKind::YScatter);
        assert_eq!(config.view.aggregates.get(&Column::TopAskPrice), Some(&Aggregate::Max));
        assert_eq!(config.view.columns, vec![Column::TopAskPrice]);
        assert_eq!(config.ingestion.prefix_check, PrefixCheck::Tail);
        assert_eq!(config.ingestion.max_pending_records, 100_000);
    }

    #[test]
    fn test_config_rejects_bad_json() {
        assert!(matches!(Config::from_json_str("{"), Err(Error::Json(_))));
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::from_json_file("/nonexistent/quote-graph.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(TableConfig::default().validate().is_ok());
        for bad in ["", "1quotes", "quotes; DROP", "a-b"] {
            let config = TableConfig { name: bad.to_string() };
            assert!(config.validate().is_err(), "accepted {bad:?}");
        }
    }
}
