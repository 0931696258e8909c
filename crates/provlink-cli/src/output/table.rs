//! Table-formatted output for CLI.

use comfy_table::{Cell, ContentArrangement, Table};

use provlink_core::discovery::DeviceRecord;

use super::OutputFormatter;

pub struct TableOutput;

impl TableOutput {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TableOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputFormatter for TableOutput {
    fn format_records(&self, records: &[DeviceRecord]) -> String {
        if records.is_empty() {
            return "No nodes found.".to_string();
        }

        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Name", "Node ID", "Address", "Sec", "PoP"]);

        for record in records {
            table.add_row(vec![
                Cell::new(&record.instance_name),
                Cell::new(&record.node_id),
                Cell::new(format!("{}:{}", record.ip, record.port)),
                Cell::new(record.sec_version.to_string()),
                Cell::new(if record.pop_required { "required" } else { "no" }),
            ]);
        }

        format!("{}\n\nFound {} node(s)", table, records.len())
    }

    fn format_value(&self, value: &serde_json::Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}
