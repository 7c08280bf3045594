use anyhow::{Result, anyhow};
use indexmap::IndexMap;
use polars::prelude::*;
use serde_json::Value;
use tracing::{debug, warn};

/// Turns provider records into a DataFrame of string columns. Typing happens
/// later in the normalizer, so every cell is kept as text (or null).
pub struct JsonFlattener;

impl JsonFlattener {
    pub fn new() -> Self {
        JsonFlattener
    }

    /// Object records. Columns are the union of keys in first-seen order;
    /// non-object entries are skipped.
    pub fn flatten_to_dataframe(&self, json_data: &[Value]) -> Result<DataFrame> {
        let mut columns: IndexMap<String, Vec<Option<String>>> = IndexMap::new();
        let mut row_count = 0;
        let mut skipped = 0;

        for item in json_data {
            let Some(object) = item.as_object() else {
                skipped += 1;
                continue;
            };

            for (key, value) in object {
                let cells = columns
                    .entry(key.clone())
                    .or_insert_with(|| vec![None; row_count]);
                cells.push(Self::cell_text(value));
            }

            row_count += 1;
            for cells in columns.values_mut() {
                if cells.len() < row_count {
                    cells.push(None);
                }
            }
        }

        if skipped > 0 {
            warn!("Skipped {} non-object records", skipped);
        }
        debug!("Flattened {} records into {} columns", row_count, columns.len());

        Self::columns_to_dataframe(columns)
    }

    /// Positional rows (`data` + `fields` exports). Rows longer than the
    /// header get positional column names; shorter rows are padded with nulls.
    pub fn rows_to_dataframe(&self, field_ids: &[String], rows: &[Value]) -> Result<DataFrame> {
        let width = rows
            .iter()
            .filter_map(|r| r.as_array().map(|a| a.len()))
            .max()
            .unwrap_or(0)
            .max(field_ids.len());

        let names: Vec<String> = (0..width)
            .map(|i| {
                field_ids
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| i.to_string())
            })
            .collect();

        let mut columns: IndexMap<String, Vec<Option<String>>> = names
            .iter()
            .map(|n| (n.clone(), Vec::with_capacity(rows.len())))
            .collect();

        if columns.len() != names.len() {
            return Err(anyhow!("Duplicate field ids in header: {:?}", field_ids));
        }

        for row in rows {
            let cells = row.as_array().map(|a| a.as_slice()).unwrap_or(&[]);
            for (i, column) in columns.values_mut().enumerate() {
                column.push(cells.get(i).and_then(Self::cell_text));
            }
        }

        Self::columns_to_dataframe(columns)
    }

    fn columns_to_dataframe(columns: IndexMap<String, Vec<Option<String>>>) -> Result<DataFrame> {
        if columns.is_empty() {
            return Ok(DataFrame::empty());
        }

        let series: Vec<Column> = columns
            .into_iter()
            .map(|(name, values)| Series::new(name.into(), values).into())
            .collect();

        DataFrame::new(series).map_err(|e| anyhow!("Failed to build DataFrame: {}", e))
    }

    /// Whole numbers are rendered without a fractional part so that a year
    /// stored as `2019.0` still reads `2019`.
    pub fn cell_text(value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Some((f as i64).to_string())
                }
                Some(f) => Some(f.to_string()),
                None => Some(n.to_string()),
            },
            Value::Bool(b) => Some(b.to_string()),
            other => Some(other.to_string()),
        }
    }
}

impl Default for JsonFlattener {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_union_of_keys_in_first_seen_order() {
        let records = vec![
            json!({"State": "Kerala", "Avg_rainfall": "10.5"}),
            json!({"State": "Goa", "District": "North Goa"}),
        ];
        let df = JsonFlattener::new().flatten_to_dataframe(&records).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["State", "Avg_rainfall", "District"]);
        assert_eq!(df.height(), 2);

        let district = df.column("District").unwrap().str().unwrap();
        assert_eq!(district.get(0), None);
        assert_eq!(district.get(1), Some("North Goa"));
        let rainfall = df.column("Avg_rainfall").unwrap().str().unwrap();
        assert_eq!(rainfall.get(1), None);
    }

    #[test]
    fn test_parsed_payload_keeps_provider_key_order() {
        let payload: Value = serde_json::from_str(
            r#"{"records": [{"Year": "2018", "State": "Goa", "District": "North Goa", "Avg_rainfall": "3000"}]}"#,
        )
        .unwrap();
        let records = payload["records"].as_array().unwrap();
        let df = JsonFlattener::new().flatten_to_dataframe(records).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["Year", "State", "District", "Avg_rainfall"]);
    }

    #[test]
    fn test_numbers_are_stringified() {
        let records = vec![json!({"Year": 2019.0, "Rainfall_mm": 12.25, "flag": true, "x": null})];
        let df = JsonFlattener::new().flatten_to_dataframe(&records).unwrap();

        assert_eq!(df.column("Year").unwrap().str().unwrap().get(0), Some("2019"));
        assert_eq!(df.column("Rainfall_mm").unwrap().str().unwrap().get(0), Some("12.25"));
        assert_eq!(df.column("flag").unwrap().str().unwrap().get(0), Some("true"));
        assert_eq!(df.column("x").unwrap().str().unwrap().get(0), None);
    }

    #[test]
    fn test_rows_with_short_header_get_positional_names() {
        let fields = vec!["a".to_string(), "b".to_string()];
        let rows = vec![json!(["1", "Pune", 5]), json!(["2"])];
        let df = JsonFlattener::new().rows_to_dataframe(&fields, &rows).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "2"]);
        assert_eq!(df.column("b").unwrap().str().unwrap().get(0), Some("Pune"));
        assert_eq!(df.column("b").unwrap().str().unwrap().get(1), None);
        assert_eq!(df.column("2").unwrap().str().unwrap().get(0), Some("5"));
    }

    #[test]
    fn test_empty_input_gives_empty_frame() {
        let df = JsonFlattener::new().flatten_to_dataframe(&[]).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 0);
    }
}
