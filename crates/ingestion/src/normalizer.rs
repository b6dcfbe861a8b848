//! Quote normalization.
//!
//! Flattens quote records into the row shape of the aggregation schema.

use quote_core::{AggregationRow, PriceLevel, QuoteRecord};

/// Price of a book side, or `0.0` when the side is absent, priceless or non-finite.
#[inline]
fn side_price(level: Option<&PriceLevel>) -> f64 {
    level
        .and_then(|l| l.price)
        .filter(|p| p.is_finite())
        .unwrap_or(0.0)
}

/// Normalize a single quote record.
///
/// Never fails and never filters: a record with neither side still produces
/// a row (with both prices at zero) so the stock stays visible to distinct counts.
pub fn normalize(record: &QuoteRecord) -> AggregationRow {
    AggregationRow {
        stock: record.stock.clone(),
        top_bid_price: side_price(record.top_bid.as_ref()),
        top_ask_price: side_price(record.top_ask.as_ref()),
        timestamp: record.timestamp,
    }
}

/// Normalize records in order.
pub fn normalize_batch(records: &[QuoteRecord]) -> Vec<AggregationRow> {
    records.iter().map(normalize).collect()
}
