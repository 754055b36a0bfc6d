//! Scalar encoding and record construction.
//!
//! Config and history values travel as JSON literal strings. Numbers and booleans
//! keep their literal form, strings are wrapped in double quotes verbatim.

use serde_json::{Map, Value};
use wandb_proto::{ConfigItem, ConfigRecord, HistoryItem, HistoryRecord};

use crate::error::{RunError, RunResult};

/// Reserved history key carrying the step index.
pub const STEP_KEY: &str = "_step";

/// Encode one scalar as its wire literal.
///
/// Embedded quotes and control characters are not escaped; the backend expects the
/// raw text between the quotes.
pub fn encode_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}

/// Build the config batch sent with the initial run update.
pub fn build_config_batch(mapping: &Value) -> RunResult<ConfigRecord> {
    let update = as_object(mapping)?
        .iter()
        .map(|(key, value)| ConfigItem {
            key: key.clone(),
            value_json: encode_scalar(value),
        })
        .collect();
    Ok(ConfigRecord { update })
}

/// Build one history row. The caller is expected to have injected `_step`.
pub fn build_log_batch(mapping: &Value) -> RunResult<HistoryRecord> {
    let item = as_object(mapping)?
        .iter()
        .map(|(key, value)| HistoryItem {
            key: key.clone(),
            value_json: encode_scalar(value),
        })
        .collect();
    Ok(HistoryRecord { item })
}

/// Copy `entry` and set `_step` on the copy.
pub fn with_step(entry: &Value, step: u64) -> RunResult<Value> {
    let mut map: Map<String, Value> = as_object(entry)?.clone();
    map.insert(STEP_KEY.to_string(), Value::from(step));
    Ok(Value::Object(map))
}

fn as_object(mapping: &Value) -> RunResult<&Map<String, Value>> {
    mapping.as_object().ok_or_else(|| {
        RunError::DataFormat(format!(
            "expected a JSON object of key/value pairs, got {}",
            kind_of(mapping)
        ))
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strings_are_quoted_verbatim() {
        assert_eq!(encode_scalar(&json!("run1")), "\"run1\"");
        assert_eq!(encode_scalar(&json!("")), "\"\"");
        assert_eq!(encode_scalar(&json!("say \"hi\"")), "\"say \"hi\"\"");
    }

    #[test]
    fn test_numbers_and_booleans_are_literal() {
        assert_eq!(encode_scalar(&json!(0.01)), "0.01");
        assert_eq!(encode_scalar(&json!(2.5)), "2.5");
        assert_eq!(encode_scalar(&json!(42)), "42");
        assert_eq!(encode_scalar(&json!(-7)), "-7");
        assert_eq!(encode_scalar(&json!(true)), "true");
        assert_eq!(encode_scalar(&json!(false)), "false");
    }

    #[test]
    fn test_other_values_fall_back_to_json_text() {
        assert_eq!(encode_scalar(&Value::Null), "null");
        assert_eq!(encode_scalar(&json!([1, 2])), "[1,2]");
    }

    #[test]
    fn test_config_batch_has_one_item_per_key() {
        let batch = build_config_batch(&json!({"lr": 0.01, "name": "run1"})).unwrap();

        assert_eq!(batch.update.len(), 2);
        let lr = batch.update.iter().find(|i| i.key == "lr").unwrap();
        let name = batch.update.iter().find(|i| i.key == "name").unwrap();
        assert_eq!(lr.value_json, "0.01");
        assert_eq!(name.value_json, "\"run1\"");
    }

    #[test]
    fn test_batch_order_is_stable() {
        let mapping = json!({"b": 1, "a": 2, "c": 3});
        let first = build_log_batch(&mapping).unwrap();
        let second = build_log_batch(&mapping).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_non_object_mapping_is_a_data_format_error() {
        let err = build_log_batch(&json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, RunError::DataFormat(_)));
        assert!(err.to_string().contains("an array"));

        assert!(matches!(
            build_config_batch(&json!("lr=0.1")),
            Err(RunError::DataFormat(_))
        ));
    }

    #[test]
    fn test_with_step_injects_step_and_leaves_input_alone() {
        let entry = json!({"accuracy": 0.9});
        let stepped = with_step(&entry, 4).unwrap();

        assert_eq!(stepped[STEP_KEY], json!(4));
        assert_eq!(stepped["accuracy"], json!(0.9));
        assert!(entry.get(STEP_KEY).is_none());

        let batch = build_log_batch(&stepped).unwrap();
        let step = batch.item.iter().find(|i| i.key == STEP_KEY).unwrap();
        assert_eq!(step.value_json, "4");
    }

    #[test]
    fn test_with_step_overrides_caller_step() {
        let stepped = with_step(&json!({"_step": 99, "loss": 1}), 2).unwrap();
        assert_eq!(stepped[STEP_KEY], json!(2));
    }
}
