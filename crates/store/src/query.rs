//! SQL generation for table definitions, inserts and pivoted views.

use quote_core::{Aggregate, CellValue, Column, ColumnType, TableSchema, ViewConfig};

/// Quote an identifier for DuckDB.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// DuckDB storage type of a schema column.
pub fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::String => "VARCHAR",
        ColumnType::Float => "DOUBLE",
        ColumnType::Date => "TIMESTAMP",
    }
}

/// `CREATE TABLE` statement for a schema.
pub fn create_table_sql(table: &str, schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .columns()
        .iter()
        .map(|(c, t)| format!("{} {} NOT NULL", quote_ident(c.name()), sql_type(*t)))
        .collect();
    format!("CREATE TABLE {} ({})", quote_ident(table), columns.join(", "))
}

/// Parameterized `INSERT` for one row in schema order.
///
/// Dates are bound as epoch milliseconds.
pub fn insert_sql(table: &str, schema: &TableSchema) -> String {
    let names: Vec<String> = schema
        .columns()
        .iter()
        .map(|(c, _)| quote_ident(c.name()))
        .collect();
    let placeholders: Vec<&str> = schema
        .columns()
        .iter()
        .map(|(_, t)| match t {
            ColumnType::Date => "epoch_ms(CAST(? AS BIGINT))",
            _ => "?",
        })
        .collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        placeholders.join(", ")
    )
}

/// Bind value for a cell, matching the placeholders of [`insert_sql`].
pub fn bind_value(cell: CellValue) -> duckdb::types::Value {
    use duckdb::types::Value;
    match cell {
        CellValue::Text(s) => Value::Text(s),
        CellValue::Float(f) => Value::Double(f),
        CellValue::Timestamp(ts) => Value::BigInt(ts.timestamp_millis()),
    }
}

fn aggregate_sql(aggregate: Aggregate, column: Column) -> String {
    let c = quote_ident(column.name());
    match aggregate {
        Aggregate::Avg => format!("avg({c})"),
        Aggregate::Sum => format!("sum({c})"),
        Aggregate::Count => format!("count({c})"),
        Aggregate::DistinctCount => format!("count(DISTINCT {c})"),
        Aggregate::Min => format!("min({c})"),
        Aggregate::Max => format!("max({c})"),
        Aggregate::Last => format!("arg_max({c}, rowid)"),
    }
}

/// Grouping query for a view.
///
/// Output columns: one `VARCHAR` per row pivot, one `VARCHAR` per column
/// pivot, then one `DOUBLE` per displayed column (`NULL` when the aggregate
/// is not numeric).
pub fn pivot_query(table: &str, schema: &TableSchema, view: &ViewConfig) -> String {
    let pivots: Vec<String> = view
        .row_pivots
        .iter()
        .chain(&view.column_pivots)
        .map(|c| quote_ident(c.name()))
        .collect();

    let mut select: Vec<String> = pivots
        .iter()
        .map(|p| format!("CAST({p} AS VARCHAR)"))
        .collect();
    select.extend(view.columns.iter().map(|c| {
        format!(
            "TRY_CAST({} AS DOUBLE)",
            aggregate_sql(view.aggregate_for(*c, schema), *c)
        )
    }));

    let mut sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(table));
    if !pivots.is_empty() {
        let keys = pivots.join(", ");
        sql.push_str(&format!(" GROUP BY {keys} ORDER BY {keys}"));
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_create_table_sql() {
        assert_eq!(
            create_table_sql("quotes", &TableSchema::quotes()),
            r#"CREATE TABLE "quotes" ("stock" VARCHAR NOT NULL, "top_ask_price" DOUBLE NOT NULL, "top_bid_price" DOUBLE NOT NULL, "timestamp" TIMESTAMP NOT NULL)"#
        );
    }

    #[test]
    fn test_insert_sql() {
        assert_eq!(
            insert_sql("quotes", &TableSchema::quotes()),
            r#"INSERT INTO "quotes" ("stock", "top_ask_price", "top_bid_price", "timestamp") VALUES (?, ?, ?, epoch_ms(CAST(? AS BIGINT)))"#
        );
    }

    #[test]
    fn test_default_pivot_query() {
        let sql = pivot_query("quotes", &TableSchema::quotes(), &ViewConfig::default());
        assert_eq!(
            sql,
            r#"SELECT CAST("timestamp" AS VARCHAR), CAST("stock" AS VARCHAR), TRY_CAST(avg("top_ask_price") AS DOUBLE) FROM "quotes" GROUP BY "timestamp", "stock" ORDER BY "timestamp", "stock""#
        );
    }

    #[test]
    fn test_unpivoted_query() {
        let view = ViewConfig {
            column_pivots: Vec::new(),
            row_pivots: Vec::new(),
            columns: vec![Column::Stock, Column::TopBidPrice],
            aggregates: BTreeMap::new(),
            ..ViewConfig::default()
        };
        let sql = pivot_query("quotes", &TableSchema::quotes(), &view);
        assert_eq!(
            sql,
            r#"SELECT TRY_CAST(count(DISTINCT "stock") AS DOUBLE), TRY_CAST(avg("top_bid_price") AS DOUBLE) FROM "quotes""#
        );
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident(r#"a"b"#), r#""a""b""#);
    }
}
