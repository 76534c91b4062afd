//! Forecast period normalization.
//!
//! Turns the nested `properties.periods` list of an hourly forecast into a
//! flat table: nested objects are flattened into `parent_child` columns,
//! `temperature` becomes `temperature_F`, a Celsius column is derived,
//! the unit tag is dropped, and every row is stamped with the extract time.

use chrono::NaiveDateTime;
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Number, Value};

use crate::model::TransformError;

pub const COL_TEMPERATURE: &str = "temperature";
pub const COL_TEMPERATURE_F: &str = "temperature_F";
pub const COL_TEMPERATURE_C: &str = "temperature_C";
pub const COL_TEMPERATURE_UNIT: &str = "temperatureUnit";
pub const COL_EXTRACT_TIME: &str = "extract_time";

/// Nesting separator used while flattening, replaced afterwards.
const NEST_SEPARATOR: char = '.';
const COLUMN_SEPARATOR: &str = "_";

/// Display format of the `extract_time` column.
pub const EXTRACT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One normalized forecast period, keyed by column name.
pub type ForecastRow = IndexMap<String, Value>;

/// Normalized rows plus their column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastTable {
    pub columns: Vec<String>,
    pub rows: Vec<ForecastRow>,
}

impl ForecastTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Normalizes a list of forecast periods into a [`ForecastTable`].
///
/// Within a period, top-level scalar fields come first in source order,
/// followed by the flattened fields of nested objects. Empty nested
/// objects contribute no column. Across periods, columns keep the order in
/// which they first appear, with `temperature_C` and `extract_time`
/// appended. A period missing a field gets `null` in that column.
pub fn normalize_periods(
    periods: &[Value],
    extract_time: NaiveDateTime,
) -> Result<ForecastTable, TransformError> {
    let mut flat_rows = Vec::with_capacity(periods.len());
    // column -> source path that produced it
    let mut sources: IndexMap<String, Vec<String>> = IndexMap::new();

    for (index, period) in periods.iter().enumerate() {
        let object = period
            .as_object()
            .ok_or(TransformError::InvalidPeriod { index })?;
        let mut row = IndexMap::new();
        for field in flatten_period(object) {
            let column = field.column();
            match sources.get(&column) {
                Some(path) if *path != field.path => {
                    return Err(TransformError::ColumnCollision(column));
                }
                Some(_) => {}
                None => {
                    sources.insert(column.clone(), field.path);
                }
            }
            row.insert(column, field.value);
        }
        flat_rows.push(row);
    }
    let columns: IndexSet<String> = sources.into_keys().collect();

    if !columns.contains(COL_TEMPERATURE) {
        return Err(TransformError::MissingColumn(COL_TEMPERATURE));
    }
    if !columns.contains(COL_TEMPERATURE_UNIT) {
        return Err(TransformError::MissingColumn(COL_TEMPERATURE_UNIT));
    }

    if columns.contains(COL_TEMPERATURE_F) {
        return Err(TransformError::ColumnCollision(COL_TEMPERATURE_F.to_string()));
    }

    let mut out_columns: Vec<String> = columns
        .iter()
        .filter(|c| c.as_str() != COL_TEMPERATURE_UNIT)
        .map(|c| {
            if c == COL_TEMPERATURE {
                COL_TEMPERATURE_F.to_string()
            } else {
                c.clone()
            }
        })
        .collect();
    for derived in [COL_TEMPERATURE_C, COL_EXTRACT_TIME] {
        if out_columns.iter().any(|c| c == derived) {
            return Err(TransformError::ColumnCollision(derived.to_string()));
        }
        out_columns.push(derived.to_string());
    }
    let extract_value = Value::String(extract_time.format(EXTRACT_TIME_FORMAT).to_string());

    let mut rows = Vec::with_capacity(flat_rows.len());
    for (index, mut flat) in flat_rows.into_iter().enumerate() {
        let fahrenheit = flat.get(COL_TEMPERATURE).cloned().unwrap_or(Value::Null);
        let celsius = fahrenheit_to_celsius_value(index, &fahrenheit)?;

        let mut row = ForecastRow::with_capacity(out_columns.len());
        for column in columns.iter() {
            if column == COL_TEMPERATURE_UNIT {
                continue;
            }
            let value = flat.swap_remove(column).unwrap_or(Value::Null);
            if column == COL_TEMPERATURE {
                row.insert(COL_TEMPERATURE_F.to_string(), value);
            } else {
                row.insert(column.clone(), value);
            }
        }
        row.insert(COL_TEMPERATURE_C.to_string(), celsius);
        row.insert(COL_EXTRACT_TIME.to_string(), extract_value.clone());
        rows.push(row);
    }

    Ok(ForecastTable {
        columns: out_columns,
        rows,
    })
}

/// `(f - 32) * 5 / 9`, evaluated left to right with no rounding.
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

fn fahrenheit_to_celsius_value(index: usize, value: &Value) -> Result<Value, TransformError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Number(n) => {
            let f = n.as_f64().ok_or_else(|| TransformError::InvalidTemperature {
                index,
                value: n.to_string(),
            })?;
            // NaN/inf -> null
            Ok(Number::from_f64(fahrenheit_to_celsius(f))
                .map(Value::Number)
                .unwrap_or(Value::Null))
        }
        other => Err(TransformError::InvalidTemperature {
            index,
            value: other.to_string(),
        }),
    }
}

/// A leaf value and the chain of keys leading to it.
struct FlatField {
    path: Vec<String>,
    value: Value,
}

impl FlatField {
    /// Path joined with dots, then every dot (including any already present
    /// in source keys) swapped for an underscore.
    fn column(&self) -> String {
        let separator = NEST_SEPARATOR.to_string();
        self.path
            .join(separator.as_str())
            .replace(NEST_SEPARATOR, COLUMN_SEPARATOR)
    }
}

/// Top-level scalars first, then nested objects flattened depth first.
fn flatten_period(period: &Map<String, Value>) -> Vec<FlatField> {
    let mut fields: Vec<FlatField> = period
        .iter()
        .filter(|(_, value)| !value.is_object())
        .map(|(key, value)| FlatField {
            path: vec![key.clone()],
            value: value.clone(),
        })
        .collect();

    for (key, value) in period {
        if let Value::Object(inner) = value {
            flatten_into(&mut fields, vec![key.clone()], inner);
        }
    }
    fields
}

fn flatten_into(out: &mut Vec<FlatField>, prefix: Vec<String>, object: &Map<String, Value>) {
    for (key, value) in object {
        let mut path = prefix.clone();
        path.push(key.clone());
        match value {
            Value::Object(inner) => flatten_into(out, path, inner),
            other => out.push(FlatField {
                path,
                value: other.clone(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn extract_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(5, 0, 0)
            .unwrap()
    }

    fn period(number: u64, temperature: Value) -> Value {
        json!({
            "number": number,
            "startTime": "2024-03-01T01:00:00-05:00",
            "isDaytime": false,
            "temperature": temperature,
            "temperatureUnit": "F",
            "probabilityOfPrecipitation": {"unitCode": "wmoUnit:percent", "value": 20},
            "windSpeed": "5 mph",
            "shortForecast": "Mostly Cloudy"
        })
    }

    #[test]
    fn test_one_row_per_period() {
        let periods: Vec<Value> = (1..=5).map(|n| period(n, json!(40 + n))).collect();
        let table = normalize_periods(&periods, extract_time()).unwrap();
        assert_eq!(table.len(), 5);
    }

    #[test]
    fn test_celsius_matches_formula_for_every_row() {
        let temps = [-40.0, 0.0, 32.0, 50.5, 98.6, 212.0];
        let periods: Vec<Value> = temps
            .iter()
            .enumerate()
            .map(|(i, t)| period(i as u64, json!(t)))
            .collect();
        let table = normalize_periods(&periods, extract_time()).unwrap();
        for row in &table.rows {
            let f = row[COL_TEMPERATURE_F].as_f64().unwrap();
            let c = row[COL_TEMPERATURE_C].as_f64().unwrap();
            assert_eq!(c, (f - 32.0) * 5.0 / 9.0);
        }
    }

    #[test]
    fn test_freezing_point_is_zero_celsius() {
        assert_eq!(fahrenheit_to_celsius(32.0), 0.0);
        assert_eq!(fahrenheit_to_celsius(-40.0), -40.0);
        assert_eq!(fahrenheit_to_celsius(212.0), 100.0);
    }

    #[test]
    fn test_column_layout() {
        let table = normalize_periods(&[period(1, json!(32))], extract_time()).unwrap();
        assert_eq!(
            table.columns,
            vec![
                "number",
                "startTime",
                "isDaytime",
                "temperature_F",
                "windSpeed",
                "shortForecast",
                "probabilityOfPrecipitation_unitCode",
                "probabilityOfPrecipitation_value",
                "temperature_C",
                "extract_time",
            ]
        );
        assert!(!table.has_column(COL_TEMPERATURE_UNIT));
        assert!(!table.has_column(COL_TEMPERATURE));
    }

    #[test]
    fn test_row_keys_follow_column_order() {
        let table = normalize_periods(&[period(1, json!(32))], extract_time()).unwrap();
        let keys: Vec<&String> = table.rows[0].keys().collect();
        let columns: Vec<&String> = table.columns.iter().collect();
        assert_eq!(keys, columns);
    }

    #[test]
    fn test_extract_time_stamped_on_every_row() {
        let periods = vec![period(1, json!(30)), period(2, json!(31))];
        let table = normalize_periods(&periods, extract_time()).unwrap();
        for row in &table.rows {
            assert_eq!(row[COL_EXTRACT_TIME], json!("2024-03-01 05:00:00"));
        }
    }

    #[test]
    fn test_fields_missing_from_some_periods_become_null() {
        let mut second = period(2, json!(31));
        second.as_object_mut().unwrap().insert("dewpoint".into(), json!({"value": -1.5}));
        let table = normalize_periods(&[period(1, json!(30)), second], extract_time()).unwrap();
        assert!(table.has_column("dewpoint_value"));
        assert_eq!(table.rows[0]["dewpoint_value"], Value::Null);
        assert_eq!(table.rows[1]["dewpoint_value"], json!(-1.5));
    }

    #[test]
    fn test_null_temperature_gives_null_celsius() {
        let table = normalize_periods(&[period(1, Value::Null)], extract_time()).unwrap();
        assert_eq!(table.rows[0][COL_TEMPERATURE_C], Value::Null);
    }

    #[test]
    fn test_string_temperature_is_rejected() {
        let err = normalize_periods(&[period(1, json!("warm"))], extract_time()).unwrap_err();
        assert!(matches!(err, TransformError::InvalidTemperature { index: 0, .. }));
    }

    #[test]
    fn test_missing_unit_column_is_rejected() {
        let periods = vec![json!({"temperature": 50})];
        let err = normalize_periods(&periods, extract_time()).unwrap_err();
        assert_eq!(err, TransformError::MissingColumn(COL_TEMPERATURE_UNIT));
    }

    #[test]
    fn test_non_object_period_is_rejected() {
        let periods = vec![period(1, json!(30)), json!(42)];
        let err = normalize_periods(&periods, extract_time()).unwrap_err();
        assert_eq!(err, TransformError::InvalidPeriod { index: 1 });
    }

    #[test]
    fn test_dotted_source_keys_are_sanitized() {
        let mut p = period(1, json!(30));
        p.as_object_mut().unwrap().insert("wind.gust".into(), json!("10 mph"));
        let table = normalize_periods(&[p], extract_time()).unwrap();
        assert!(table.has_column("wind_gust"));
    }

    #[test]
    fn test_separator_collision_is_rejected() {
        let mut p = period(1, json!(30));
        let obj = p.as_object_mut().unwrap();
        obj.insert("wind_gust".into(), json!("10 mph"));
        obj.insert("wind".into(), json!({"gust": "12 mph"}));
        let err = normalize_periods(&[p], extract_time()).unwrap_err();
        assert_eq!(err, TransformError::ColumnCollision("wind_gust".to_string()));
    }

    #[test]
    fn test_empty_nested_object_adds_no_column() {
        let mut p = period(1, json!(30));
        let obj = p.as_object_mut().unwrap();
        obj.insert("dewpoint".into(), json!({}));
        obj.insert("relativeHumidity".into(), json!({"unitCode": "wmoUnit:percent", "extra": {}}));
        let table = normalize_periods(&[p], extract_time()).unwrap();
        assert!(!table.has_column("dewpoint"));
        assert!(!table.has_column("relativeHumidity_extra"));
        assert!(table.has_column("relativeHumidity_unitCode"));
    }

    #[test]
    fn test_scalars_precede_nested_fields() {
        let p = json!({
            "number": 1,
            "temperature": 41,
            "temperatureUnit": "F",
            "probabilityOfPrecipitation": {"unitCode": "wmoUnit:percent", "value": 20},
            "windSpeed": "5 mph",
            "empty": {}
        });
        let table = normalize_periods(&[p], extract_time()).unwrap();
        assert_eq!(
            table.columns,
            vec![
                "number",
                "temperature_F",
                "windSpeed",
                "probabilityOfPrecipitation_unitCode",
                "probabilityOfPrecipitation_value",
                "temperature_C",
                "extract_time",
            ]
        );
    }

    #[test]
    fn test_collision_across_periods_is_rejected() {
        let mut first = period(1, json!(30));
        first.as_object_mut().unwrap().insert("wind_gust".into(), json!("10 mph"));
        let mut second = period(2, json!(31));
        second.as_object_mut().unwrap().insert("wind".into(), json!({"gust": "12 mph"}));
        let err = normalize_periods(&[first, second], extract_time()).unwrap_err();
        assert_eq!(err, TransformError::ColumnCollision("wind_gust".to_string()));
    }

    #[test]
    fn test_dotted_key_and_nested_object_collide() {
        let mut first = period(1, json!(30));
        first.as_object_mut().unwrap().insert("wind.gust".into(), json!("10 mph"));
        let mut second = period(2, json!(31));
        second.as_object_mut().unwrap().insert("wind".into(), json!({"gust": "12 mph"}));
        let err = normalize_periods(&[first, second], extract_time()).unwrap_err();
        assert_eq!(err, TransformError::ColumnCollision("wind_gust".to_string()));
    }
}
