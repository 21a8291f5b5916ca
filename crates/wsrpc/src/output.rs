use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use serde_json::Value;

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
struct CallOutput<'a> {
    schema_id: &'a str,
    method: &'a str,
    result: &'a Value,
    timestamp: String,
}

pub fn print_result(method: &str, result: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = CallOutput {
                schema_id: "https://schemas.wsrpc.dev/cli/v1/call-result.schema.json",
                method,
                result,
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["METHOD", "RESULT"])
                .add_row(vec![method.to_string(), render_value(result)]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{method} = {}",
                serde_json::to_string_pretty(result).unwrap_or_else(|_| "null".to_string())
            );
        }
        OutputFormat::Raw => {
            println!("{}", render_value(result));
        }
    }
}

#[derive(Serialize)]
struct ComponentsOutput<'a> {
    schema_id: &'a str,
    components: &'a BTreeMap<String, Vec<String>>,
    timestamp: String,
}

pub fn print_components(components: &BTreeMap<String, Vec<String>>, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ComponentsOutput {
                schema_id: "https://schemas.wsrpc.dev/cli/v1/components.schema.json",
                components,
                timestamp: now_unix_seconds(),
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
                .set_header(vec!["COMPONENT", "METHODS"]);
            for (name, methods) in components {
                table.add_row(vec![name.to_string(), methods.join(", ")]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (name, methods) in components {
                println!("{name}: {}", methods.join(", "));
            }
        }
        OutputFormat::Raw => {
            for (name, methods) in components {
                for method in methods {
                    println!("{name}.{method}");
                }
            }
        }
    }
}

/// Strings print without JSON quoting; everything else as compact JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_render_unquoted() {
        assert_eq!(render_value(&json!("hello")), "hello");
        assert_eq!(render_value(&json!(8.0)), "8.0");
        assert_eq!(render_value(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
