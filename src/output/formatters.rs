use chrono::Utc;
use serde_json::Value;

use crate::devices::WindDirection;
use crate::slave::register_map::{RecordLayout, RecordSnapshot};
use crate::utils::error::ModbusError;

pub trait DataFormatter: Send + Sync {
    fn format_record(&self, record: &RecordSnapshot) -> String;
    fn format_layout(&self, layout: &[RecordLayout]) -> String;
    fn format_header(&self) -> String;

    fn format_snapshot(&self, records: &[RecordSnapshot]) -> String {
        let mut output = self.format_header();
        for record in records {
            output.push_str(&self.format_record(record));
        }
        output
    }
}

/// Picks a formatter by its command line name.
pub fn create_formatter(name: &str) -> Result<Box<dyn DataFormatter>, ModbusError> {
    match name {
        "console" => Ok(Box::new(ConsoleFormatter)),
        "json" => Ok(Box::new(JsonFormatter)),
        "csv" => Ok(Box::new(CsvFormatter)),
        other => Err(ModbusError::ConfigError(format!("Unknown output format '{}'", other))),
    }
}

fn display_value(unit: &str, raw: u16, value: f32) -> String {
    match unit {
        "sector" => {
            let direction = WindDirection::from_sector(raw);
            match direction.degrees() {
                Some(degrees) => format!("{} ({}, {:.1}°)", raw, direction, degrees),
                None => format!("{} ({})", raw, direction),
            }
        }
        "" | "tips" => format!("{}", raw),
        _ => format!("{:.2} {}", value, unit),
    }
}

pub struct ConsoleFormatter;

impl DataFormatter for ConsoleFormatter {
    fn format_record(&self, record: &RecordSnapshot) -> String {
        let updated = record
            .updated_at
            .map(|t| t.format("%H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());

        let mut output = format!(
            "🔹 {} @{} [{}] updated {}\n",
            record.name, record.start_address, record.status, updated
        );
        for field in &record.fields {
            output.push_str(&format!(
                "   {:<22} {}\n",
                field.name,
                display_value(field.unit, field.raw, field.value)
            ));
        }
        output
    }

    fn format_layout(&self, layout: &[RecordLayout]) -> String {
        let mut output = String::from("🗂️  Register map\n");
        output.push_str(&"═".repeat(60));
        output.push('\n');

        for record in layout {
            output.push_str(&format!("{:>5}  {} status\n", record.start, record.name));
            for (offset, field) in record.fields.iter().enumerate() {
                output.push_str(&format!(
                    "{:>5}    {} ({}{}, x{})\n",
                    record.start as usize + 1 + offset,
                    field.name,
                    if field.signed { "i16" } else { "u16" },
                    if field.unit.is_empty() { String::new() } else { format!(" {}", field.unit) },
                    field.scale
                ));
            }
        }
        output
    }

    fn format_header(&self) -> String {
        format!("🌦️  Station data - {}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub struct JsonFormatter;

impl DataFormatter for JsonFormatter {
    fn format_record(&self, record: &RecordSnapshot) -> String {
        serde_json::to_string_pretty(record).unwrap_or_default()
    }

    fn format_layout(&self, layout: &[RecordLayout]) -> String {
        let records: Vec<Value> = layout
            .iter()
            .map(|record| {
                let fields: Vec<Value> = record
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(offset, field)| {
                        serde_json::json!({
                            "address": record.start as usize + 1 + offset,
                            "name": field.name,
                            "unit": field.unit,
                            "scale": field.scale,
                            "signed": field.signed,
                        })
                    })
                    .collect();

                serde_json::json!({
                    "name": record.name,
                    "status_address": record.start,
                    "fields": fields,
                })
            })
            .collect();

        serde_json::to_string_pretty(&records).unwrap_or_default()
    }

    fn format_header(&self) -> String {
        String::new()
    }

    fn format_snapshot(&self, records: &[RecordSnapshot]) -> String {
        let result = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "records": records,
        });

        serde_json::to_string_pretty(&result).unwrap_or_default()
    }
}

pub struct CsvFormatter;

impl DataFormatter for CsvFormatter {
    fn format_record(&self, record: &RecordSnapshot) -> String {
        let timestamp = record.updated_at.map(|t| t.to_rfc3339()).unwrap_or_default();
        record
            .fields
            .iter()
            .map(|field| {
                format!(
                    "{},{},{},{},{},{}\n",
                    record.name, field.name, field.value, field.unit, record.status_word, timestamp
                )
            })
            .collect()
    }

    fn format_layout(&self, layout: &[RecordLayout]) -> String {
        let mut csv = String::from("address,record,field,unit,scale,signed\n");
        for record in layout {
            csv.push_str(&format!("{},{},status,,1,false\n", record.start, record.name));
            for (offset, field) in record.fields.iter().enumerate() {
                csv.push_str(&format!(
                    "{},{},{},{},{},{}\n",
                    record.start as usize + 1 + offset,
                    record.name,
                    field.name,
                    field.unit,
                    field.scale,
                    field.signed
                ));
            }
        }
        csv
    }

    fn format_header(&self) -> String {
        "record,field,value,unit,status,updated_at\n".to_string()
    }
}
