//! Output formatting for CLI results.

pub mod json;
pub mod table;

pub use json::JsonOutput;
pub use table::TableOutput;

use provlink_core::discovery::DeviceRecord;

/// Output formatter trait
pub trait OutputFormatter {
    /// Format the discovered node list
    fn format_records(&self, records: &[DeviceRecord]) -> String;

    /// Format an arbitrary JSON document (params, config, reports)
    fn format_value(&self, value: &serde_json::Value) -> String;

    /// Format a generic message
    fn format_message(&self, message: &str) -> String;
}

/// Get the appropriate formatter based on JSON flag
pub fn get_formatter(json: bool) -> Box<dyn OutputFormatter> {
    if json {
        Box::new(JsonOutput::new())
    } else {
        Box::new(TableOutput::new())
    }
}
