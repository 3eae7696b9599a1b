//! Render bound output arguments to CSV, JSON or XML bytes (spec §4.G
//! "Rendering").

use crate::descriptor::model::Action;
use crate::error::QueryError;
use crate::escape::escape_xml;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
    Xml,
}

pub fn render(action: &Action, bound: &HashMap<String, String>, format: OutputFormat) -> Result<Vec<u8>, QueryError> {
    match format {
        OutputFormat::Csv => render_csv(action, bound),
        OutputFormat::Json => render_json(action, bound),
        OutputFormat::Xml => render_xml(action, bound),
    }
}

/// Two records: the quoted names of every `out` argument that actually
/// received a value, then their values. Arguments the response never set
/// are omitted entirely.
fn render_csv(action: &Action, bound: &HashMap<String, String>) -> Result<Vec<u8>, QueryError> {
    let present: Vec<(&str, &str)> = action
        .output_arguments()
        .filter_map(|a| bound.get(&a.name).map(|v| (a.name.as_str(), v.as_str())))
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(Vec::new());

    writer
        .write_record(present.iter().map(|(name, _)| *name))
        .map_err(|e| QueryError::RenderFailure(e.to_string()))?;
    writer
        .write_record(present.iter().map(|(_, value)| *value))
        .map_err(|e| QueryError::RenderFailure(e.to_string()))?;

    writer
        .into_inner()
        .map_err(|e| QueryError::RenderFailure(e.to_string()))
}

/// `{ "<Action>": { <var>: <value>, … } }`, one binding per `out` argument
/// including those never set (as JSON `null`).
fn render_json(action: &Action, bound: &HashMap<String, String>) -> Result<Vec<u8>, QueryError> {
    let mut fields = Map::new();
    for arg in action.output_arguments() {
        let value = match bound.get(&arg.name) {
            None => Value::Null,
            Some(raw) => json_value_for(&arg.data_type, raw),
        };
        fields.insert(arg.name.clone(), value);
    }

    let mut root = Map::new();
    root.insert(action.name.clone(), Value::Object(fields));

    serde_json::to_vec(&Value::Object(root)).map_err(|e| QueryError::RenderFailure(e.to_string()))
}

fn json_value_for(data_type: &str, raw: &str) -> Value {
    match data_type {
        "boolean" => match raw {
            "0" => Value::Bool(false),
            "1" => Value::Bool(true),
            _ => Value::String(raw.to_string()),
        },
        "i1" | "i2" | "i4" | "i8" | "ui1" | "ui2" | "ui4" | "ui8" => {
            raw.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        _ => Value::String(raw.to_string()),
    }
}

/// `<Action><var>value</var>…</Action>`; a never-set argument becomes an
/// empty element.
fn render_xml(action: &Action, bound: &HashMap<String, String>) -> Result<Vec<u8>, QueryError> {
    let mut out = String::new();
    write!(out, "<{}>", action.name).map_err(|e| QueryError::RenderFailure(e.to_string()))?;
    for arg in action.output_arguments() {
        let value = bound.get(&arg.name).map(|v| escape_xml(v)).unwrap_or_default();
        write!(out, "<{name}>{value}</{name}>", name = arg.name, value = value)
            .map_err(|e| QueryError::RenderFailure(e.to_string()))?;
    }
    write!(out, "</{}>", action.name).map_err(|e| QueryError::RenderFailure(e.to_string()))?;
    Ok(out.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::model::{Argument, Direction};

    fn action() -> Action {
        Action {
            name: "Foo".into(),
            arguments: vec![
                Argument {
                    name: "NewX".into(),
                    related_state_variable: "X".into(),
                    direction: Direction::Out,
                    data_type: "string".into(),
                    value: None,
                },
                Argument {
                    name: "NewY".into(),
                    related_state_variable: "Y".into(),
                    direction: Direction::Out,
                    data_type: "string".into(),
                    value: None,
                },
            ],
        }
    }

    #[test]
    fn csv_matches_literal_scenario_from_spec() {
        let mut bound = HashMap::new();
        bound.insert("NewX".to_string(), "a".to_string());
        bound.insert("NewY".to_string(), "b\"c".to_string());
        let out = render(&action(), &bound, OutputFormat::Csv).unwrap();
        assert_eq!(out, b"\"NewX\",\"NewY\"\n\"a\",\"b\"\"c\"\n");
    }

    #[test]
    fn csv_omits_arguments_never_bound() {
        let mut bound = HashMap::new();
        bound.insert("NewX".to_string(), "a".to_string());
        let out = render(&action(), &bound, OutputFormat::Csv).unwrap();
        assert_eq!(out, b"\"NewX\"\n\"a\"\n");
    }

    #[test]
    fn json_includes_nulls_for_unbound_arguments() {
        let mut bound = HashMap::new();
        bound.insert("NewX".to_string(), "a".to_string());
        let out = render(&action(), &bound, OutputFormat::Json).unwrap();
        let v: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(v["Foo"]["NewX"], Value::String("a".into()));
        assert_eq!(v["Foo"]["NewY"], Value::Null);
    }

    #[test]
    fn json_boolean_mapping_follows_exact_zero_one_rule() {
        assert_eq!(json_value_for("boolean", "1"), Value::Bool(true));
        assert_eq!(json_value_for("boolean", "0"), Value::Bool(false));
        assert_eq!(json_value_for("boolean", "abc"), Value::String("abc".into()));
    }

    #[test]
    fn json_numeric_types_map_to_numbers() {
        assert_eq!(json_value_for("i4", "42"), Value::from(42));
        assert_eq!(json_value_for("ui8", "7"), Value::from(7));
    }

    #[test]
    fn xml_escapes_values_and_empties_unbound_arguments() {
        let mut bound = HashMap::new();
        bound.insert("NewX".to_string(), "<a&b>".to_string());
        let out = render(&action(), &bound, OutputFormat::Xml).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "<Foo><NewX>&lt;a&amp;b&gt;</NewX><NewY></NewY></Foo>");
    }
}
