use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mbgate_envelope::{Envelope, Field, Status, Value};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FieldOutput {
    tag: String,
    #[serde(rename = "type")]
    data_type: &'static str,
    value: serde_json::Value,
}

#[derive(Serialize)]
struct ResponseOutput {
    schema_id: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    fields: Vec<FieldOutput>,
}

fn field_output(field: &Field) -> FieldOutput {
    let value = match &field.value {
        Value::UInt(value) => serde_json::Value::from(*value),
        Value::String(text) => serde_json::Value::from(text.as_str()),
        Value::Raw(_) => serde_json::Value::from(field.value.to_string()),
    };
    FieldOutput {
        tag: field.tag.to_string(),
        data_type: field.value.data_type().as_str(),
        value,
    }
}

fn status_text(response: &Envelope) -> &'static str {
    match response.status() {
        Some(Status::Ok) => "ok",
        Some(Status::Error) => "error",
        None => "unknown",
    }
}

/// Print every field of a response in order, repeated tags included.
pub fn print_response(response: &Envelope, fields: &[Field], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ResponseOutput {
                schema_id: "https://schemas.3leaps.dev/mbgate/cli/v1/response.schema.json",
                status: status_text(response),
                error: response.error_message().map(str::to_string),
                fields: fields.iter().map(field_output).collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TAG", "TYPE", "VALUE"]);
            for field in fields {
                table.add_row(vec![
                    field.tag.to_string(),
                    field.value.data_type().as_str().to_string(),
                    field.value.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("status={}", status_text(response));
            for field in fields {
                println!("  {} = {}", field.tag, field.value);
            }
        }
        OutputFormat::Raw => {
            print_raw(response.as_bytes());
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use mbgate_envelope::tags::{MB_IPV4_ADDR, MB_IPV4_NB};

    use super::*;

    #[test]
    fn json_fields_keep_types() {
        let uint = field_output(&Field::uint(MB_IPV4_NB, 2));
        assert_eq!(uint.tag, "MB_IPV4_NB");
        assert_eq!(uint.value, serde_json::json!(2));

        let text = field_output(&Field::string(MB_IPV4_ADDR, "10.0.0.2/30"));
        let json = serde_json::to_string(&text).expect("field should serialize");
        assert!(json.contains("\"value\":\"10.0.0.2/30\""));
    }

    #[test]
    fn status_of_error_response() {
        let response = Envelope::error_response("boom").expect("response should encode");
        assert_eq!(status_text(&response), "error");
        assert_eq!(status_text(&Envelope::new()), "unknown");
    }
}
