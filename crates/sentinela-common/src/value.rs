use serde_json::{Map, Value};

/// Issue payloads are JSON objects keyed by strings.
pub type IssueData = Map<String, Value>;

/// String form of a scalar used as a model id. Containers and null do
/// not identify an issue.
pub fn model_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Extract the model id of an issue payload under `model_id_key`.
pub fn extract_model_id(data: &IssueData, model_id_key: &str) -> Option<String> {
    data.get(model_id_key).and_then(model_id_string)
}

/// Numeric view of a JSON value, accepting numbers and numeric strings.
/// Value rules read issue fields through this.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
