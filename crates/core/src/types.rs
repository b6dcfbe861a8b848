//! Core data types for the quote-graph system.

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// One side of the top of book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Best price on this side. `None` counts as an absent side.
    #[serde(default)]
    pub price: Option<f64>,
    /// Size available at the best price.
    #[serde(default)]
    pub size: Option<f64>,
}

impl PriceLevel {
    /// Create a level with both price and size.
    pub fn new(price: f64, size: f64) -> Self {
        Self {
            price: Some(price),
            size: Some(size),
        }
    }

    /// Create a level carrying only a price.
    pub fn at(price: f64) -> Self {
        Self {
            price: Some(price),
            size: None,
        }
    }
}

impl Hash for PriceLevel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.price.map(OrderedFloat).hash(state);
        self.size.map(OrderedFloat).hash(state);
    }
}

/// A best bid/ask snapshot for one stock, as delivered by the upstream feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    /// Stock symbol (e.g., "ABC").
    pub stock: String,
    /// Best bid.
    #[serde(default)]
    pub top_bid: Option<PriceLevel>,
    /// Best ask.
    #[serde(default)]
    pub top_ask: Option<PriceLevel>,
    /// Snapshot time.
    pub timestamp: DateTime<Utc>,
}

impl QuoteRecord {
    /// Create a record with no book sides.
    pub fn new(stock: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            stock: stock.into(),
            top_bid: None,
            top_ask: None,
            timestamp,
        }
    }

    /// Set the best bid.
    pub fn with_bid(mut self, level: PriceLevel) -> Self {
        self.top_bid = Some(level);
        self
    }

    /// Set the best ask.
    pub fn with_ask(mut self, level: PriceLevel) -> Self {
        self.top_ask = Some(level);
        self
    }
}

impl Hash for QuoteRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stock.hash(state);
        self.top_bid.hash(state);
        self.top_ask.hash(state);
        self.timestamp.hash(state);
    }
}

/// Flat, schema-conformant row derived from a [`QuoteRecord`].
///
/// Both prices are always finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationRow {
    pub stock: String,
    pub top_bid_price: f64,
    pub top_ask_price: f64,
    pub timestamp: DateTime<Utc>,
}

impl AggregationRow {
    /// Get the value stored under a column.
    pub fn value(&self, column: Column) -> CellValue {
        match column {
            Column::Stock => CellValue::Text(self.stock.clone()),
            Column::TopAskPrice => CellValue::Float(self.top_ask_price),
            Column::TopBidPrice => CellValue::Float(self.top_bid_price),
            Column::Timestamp => CellValue::Timestamp(self.timestamp),
        }
    }
}

/// A single cell of an aggregation row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Float(f64),
    Timestamp(DateTime<Utc>),
}

/// Columns of the quote aggregation table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Stock,
    TopAskPrice,
    TopBidPrice,
    Timestamp,
}

impl Column {
    /// All columns in schema order.
    pub const ALL: [Column; 4] = [
        Column::Stock,
        Column::TopAskPrice,
        Column::TopBidPrice,
        Column::Timestamp,
    ];

    /// Column name as used by the aggregation engine.
    pub fn name(self) -> &'static str {
        match self {
            Column::Stock => "stock",
            Column::TopAskPrice => "top_ask_price",
            Column::TopBidPrice => "top_bid_price",
            Column::Timestamp => "timestamp",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Storage type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Float,
    Date,
}

impl ColumnType {
    /// Type name as used in schema declarations.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Float => "float",
            ColumnType::Date => "date",
        }
    }

    /// Whether numeric aggregates apply to this type.
    #[inline]
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Float)
    }
}

/// Ordered column declarations of an aggregation table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    columns: Vec<(Column, ColumnType)>,
}

impl TableSchema {
    /// Create a schema from column declarations.
    pub fn new(columns: Vec<(Column, ColumnType)>) -> Self {
        Self { columns }
    }

    /// The fixed quote schema:
    /// `{stock: string, top_ask_price: float, top_bid_price: float, timestamp: date}`.
    pub fn quotes() -> Self {
        Self::new(vec![
            (Column::Stock, ColumnType::String),
            (Column::TopAskPrice, ColumnType::Float),
            (Column::TopBidPrice, ColumnType::Float),
            (Column::Timestamp, ColumnType::Date),
        ])
    }

    /// Column declarations in order.
    pub fn columns(&self) -> &[(Column, ColumnType)] {
        &self.columns
    }

    /// Look up the type of a column.
    pub fn column_type(&self, column: Column) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, t)| *t)
    }

    /// Whether the schema declares the column.
    pub fn contains(&self, column: Column) -> bool {
        self.column_type(column).is_some()
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Default for TableSchema {
    fn default() -> Self {
        Self::quotes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::hash_map::DefaultHasher;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_quote_schema_order() {
        let schema = TableSchema::quotes();
        let names: Vec<&str> = schema.columns().iter().map(|(c, _)| c.name()).collect();
        assert_eq!(names, vec!["stock", "top_ask_price", "top_bid_price", "timestamp"]);
        assert_eq!(schema.column_type(Column::Timestamp), Some(ColumnType::Date));
        assert!(!schema.column_type(Column::Stock).unwrap().is_numeric());
    }

    #[test]
    fn test_record_hash_is_stable_for_nan() {
        let a = QuoteRecord::new("ABC", ts(1)).with_ask(PriceLevel::at(f64::NAN));
        let b = a.clone();
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_record_hash_distinguishes_prices() {
        let a = QuoteRecord::new("ABC", ts(1)).with_bid(PriceLevel::new(100.0, 5.0));
        let b = QuoteRecord::new("ABC", ts(1)).with_bid(PriceLevel::new(100.5, 5.0));
        assert_ne!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_deserialize_missing_sides() {
        let json = r#"{"stock":"DEF","top_ask":{"price":101.5},"timestamp":"2019-02-01T13:57:49.998Z"}"#;
        let record: QuoteRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.stock, "DEF");
        assert!(record.top_bid.is_none());
        assert_eq!(record.top_ask.as_ref().and_then(|l| l.price), Some(101.5));
        assert!(record.top_ask.unwrap().size.is_none());
    }

    #[test]
    fn test_row_value_by_column() {
        let row = AggregationRow {
            stock: "ABC".to_string(),
            top_bid_price: 99.5,
            top_ask_price: 100.5,
            timestamp: ts(60),
        };
        assert_eq!(row.value(Column::Stock), CellValue::Text("ABC".to_string()));
        assert_eq!(row.value(Column::TopAskPrice), CellValue::Float(100.5));
        assert_eq!(row.value(Column::Timestamp), CellValue::Timestamp(ts(60)));
    }
}
