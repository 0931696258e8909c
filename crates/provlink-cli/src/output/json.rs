//! JSON-formatted output for CLI.

use serde::Serialize;
use serde_json::json;

use provlink_core::discovery::DeviceRecord;

use super::OutputFormatter;

pub struct JsonOutput;

impl JsonOutput {
    pub fn new() -> Self {
        Self
    }

    fn to_json<T: Serialize>(value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for JsonOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for JsonOutput {
    fn format_records(&self, records: &[DeviceRecord]) -> String {
        let output = json!({
            "nodes": records,
            "count": records.len()
        });
        Self::to_json(&output)
    }

    fn format_value(&self, value: &serde_json::Value) -> String {
        Self::to_json(value)
    }

    fn format_message(&self, message: &str) -> String {
        Self::to_json(&json!({ "message": message }))
    }
}
