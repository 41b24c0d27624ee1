//! SQL text rendering for appends.
//!
//! Values are rendered as literals rather than bound parameters so the
//! warehouse coerces them to whatever the target column type is, the same
//! way a hand-written `INSERT ... VALUES` would.

use batchline_common::RowSet;
use serde_json::Value;

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `"schema"."table"`, or just `"table"` for an empty schema.
pub fn qualified_table(table: &str, schema: &str) -> String {
    if schema.is_empty() {
        quote_ident(table)
    } else {
        format!("{}.{}", quote_ident(schema), quote_ident(table))
    }
}

/// How string literals are escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    /// Standard-conforming strings: only `'` is special.
    #[default]
    Standard,
    /// `\` is an escape character inside literals too (Redshift).
    BackslashEscapes,
}

impl Dialect {
    pub fn for_engine(engine: &str) -> Self {
        if engine.eq_ignore_ascii_case("redshift") {
            Dialect::BackslashEscapes
        } else {
            Dialect::Standard
        }
    }
}

fn quote_text(text: &str, dialect: Dialect) -> String {
    let text = match dialect {
        Dialect::Standard => text.replace('\'', "''"),
        Dialect::BackslashEscapes => text.replace('\\', "\\\\").replace('\'', "''"),
    };
    format!("'{text}'")
}

pub fn quote_literal(value: &Value, dialect: Dialect) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_text(s, dialect),
        // Nested values land as their JSON text.
        nested => quote_text(&nested.to_string(), dialect),
    }
}

/// Multi-row `INSERT` statements, `batch_size` rows each, covering every
/// column of the row set. Empty row sets render nothing.
pub fn insert_statements(table: &str, schema: &str, rows: &RowSet, batch_size: usize, dialect: Dialect) -> Vec<String> {
    if rows.is_empty() || rows.columns().is_empty() {
        return Vec::new();
    }

    let target = qualified_table(table, schema);
    let columns = rows.columns().iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");

    rows.records()
        .chunks(batch_size.max(1))
        .map(|chunk| {
            let values = chunk
                .iter()
                .map(|record| {
                    let literals: Vec<String> = rows.row_values(record).into_iter().map(|v| quote_literal(v, dialect)).collect();
                    format!("({})", literals.join(", "))
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("INSERT INTO {target} ({columns}) VALUES {values}")
        })
        .collect()
}
