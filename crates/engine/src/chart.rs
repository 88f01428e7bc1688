//! Heuristics for turning raw result rows into chart-friendly data.

use serde_json::Value;

use op_domain::state::{ChartContext, Row};

/// Column-name hints for the numeric "value" axis, in priority order.
const NUMERIC_HINTS: [&str; 8] = [
    "latency_ms",
    "latency",
    "duration",
    "count",
    "total",
    "value",
    "score",
    "avg",
];

/// Column-name hints for the categorical "label" axis, in priority order.
const LABEL_HINTS: [&str; 7] = [
    "tool_name",
    "tool",
    "name",
    "run_id",
    "category",
    "type",
    "status",
];

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn is_label(value: &Value) -> bool {
    matches!(value, Value::String(s) if !s.trim().is_empty())
}

/// Select a column by hint-name priority first, then by the first column
/// whose value in the first row satisfies the predicate.
fn select_column(rows: &[Row], hints: &[&str], predicate: impl Fn(&Value) -> bool) -> Option<String> {
    let first = rows.first()?;
    for hint in hints {
        if let Some((name, _)) = first.iter().find(|(k, _)| k.eq_ignore_ascii_case(hint)) {
            return Some(name.clone());
        }
    }
    first
        .iter()
        .find(|(_, v)| predicate(v))
        .map(|(k, _)| k.clone())
}

/// Normalize rows into `{label, value}` pairs: pick a numeric value
/// column and a label column, sort descending by value, and cap the row
/// count. When no numeric column can be identified the original rows are
/// returned with a `table` suggestion instead of a chart type.
pub fn prepare_chart_data(rows: &[Row], max_rows: usize) -> ChartContext {
    let mut metadata = serde_json::Map::new();
    metadata.insert("label_field".into(), "label".into());
    metadata.insert("value_field".into(), "value".into());
    metadata.insert("rows_considered".into(), rows.len().into());
    metadata.insert("suggested_chart".into(), "bar".into());

    if rows.is_empty() {
        metadata.insert("rows_returned".into(), 0.into());
        return ChartContext {
            rows: Vec::new(),
            metadata,
        };
    }

    let value_key = select_column(rows, &NUMERIC_HINTS, |v| as_number(v).is_some());
    let label_key = select_column(rows, &LABEL_HINTS, is_label);
    metadata.insert(
        "value_source_column".into(),
        value_key.clone().map(Value::from).unwrap_or(Value::Null),
    );
    metadata.insert(
        "label_source_column".into(),
        label_key.clone().map(Value::from).unwrap_or(Value::Null),
    );

    let mut sorted: Vec<&Row> = rows.iter().collect();
    if let Some(key) = &value_key {
        sorted.sort_by(|a, b| {
            let av = a.get(key).and_then(as_number).unwrap_or(0.0);
            let bv = b.get(key).and_then(as_number).unwrap_or(0.0);
            bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    let mut cleaned: Vec<Row> = Vec::new();
    for (idx, row) in sorted.iter().take(max_rows).enumerate() {
        let Some(value) = value_key.as_ref().and_then(|k| row.get(k)).and_then(as_number) else {
            continue;
        };
        let label = label_key
            .as_ref()
            .and_then(|k| row.get(k))
            .filter(|v| is_label(v))
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| format!("Row {}", idx + 1));

        let mut pair = Row::new();
        pair.insert("label".into(), label.into());
        pair.insert("value".into(), value.into());
        cleaned.push(pair);
    }

    // No chartable rows: hand the originals back and suggest a table.
    if cleaned.is_empty() {
        cleaned = rows.iter().take(max_rows).cloned().collect();
        metadata.insert(
            "label_field".into(),
            label_key.map(Value::from).unwrap_or_else(|| "label".into()),
        );
        metadata.insert(
            "value_field".into(),
            value_key.map(Value::from).unwrap_or_else(|| "value".into()),
        );
        metadata.insert("suggested_chart".into(), "table".into());
    }

    metadata.insert("rows_returned".into(), cleaned.len().into());
    ChartContext {
        rows: cleaned,
        metadata,
    }
}
