//! CSV rendering of a normalized forecast table.
//!
//! Header row, then one line per record, columns in table order. Fields
//! are quoted only when they contain a delimiter, quote, or line break.
//! Output is a pure function of the table, so reprocessing the same
//! staged object produces byte-identical files.
//!
//! A column holding only numbers and nulls is written as floating point
//! throughout once it has a null or a fractional value in any row, so a
//! temperature column with a gap reads `41.0,,39.0` rather than `41,,39`.

use serde_json::Value;

use super::normalize::ForecastTable;

const DELIMITER: char = ',';
const DELIMITER_STR: &str = ",";
const LINE_END: &str = "\n";

/// Renders the table as CSV text.
pub fn to_csv(table: &ForecastTable) -> String {
    let mut out = String::new();

    let header: Vec<String> = table.columns.iter().map(|c| quote_field(c)).collect();
    out.push_str(&header.join(DELIMITER_STR));
    out.push_str(LINE_END);

    let float_columns: Vec<bool> = table
        .columns
        .iter()
        .map(|column| is_float_column(table, column))
        .collect();

    for row in &table.rows {
        let fields: Vec<String> = table
            .columns
            .iter()
            .zip(&float_columns)
            .map(|(column, &as_float)| {
                let value = row.get(column).unwrap_or(&Value::Null);
                let text = match value {
                    Value::Number(n) if as_float => {
                        n.as_f64().map(render_float).unwrap_or_else(|| n.to_string())
                    }
                    other => render_value(other),
                };
                quote_field(&text)
            })
            .collect();
        out.push_str(&fields.join(DELIMITER_STR));
        out.push_str(LINE_END);
    }

    out
}

/// Text form of a single cell.
///
/// - null → empty
/// - booleans → `True` / `False`
/// - integers → as written
/// - floats → shortest round-trip form, always with a fractional part
/// - strings → verbatim
/// - arrays and objects → compact JSON
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if n.is_f64() {
                n.as_f64().map(render_float).unwrap_or_else(|| n.to_string())
            } else {
                n.to_string()
            }
        }
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Numbers-and-nulls column with a gap or a fractional value.
fn is_float_column(table: &ForecastTable, column: &str) -> bool {
    let mut numbers = 0;
    let mut widened = false;
    for row in &table.rows {
        match row.get(column).unwrap_or(&Value::Null) {
            Value::Null => widened = true,
            Value::Number(n) => {
                numbers += 1;
                widened |= n.is_f64();
            }
            _ => return false,
        }
    }
    numbers > 0 && widened
}

fn render_float(f: f64) -> String {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e16 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

fn quote_field(field: &str) -> String {
    let needs_quotes = field.contains(DELIMITER)
        || field.contains('"')
        || field.contains('\n')
        || field.contains('\r');
    if needs_quotes {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
