use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Types usable as an OpenAI strict `json_schema` response format.
///
/// Blanket-implemented for anything that is `JsonSchema + DeserializeOwned`.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    /// Schema in the shape strict mode accepts: every object closed with
    /// `additionalProperties: false`, every property listed in `required`,
    /// and no `$ref` left behind.
    fn openai_schema() -> Value {
        let mut root = serde_json::to_value(schema_for!(Self)).unwrap_or_default();

        let definitions = match &mut root {
            Value::Object(map) => {
                map.remove("$schema");
                map.remove("definitions").unwrap_or(Value::Null)
            }
            _ => Value::Null,
        };

        strictify(&mut root, &definitions);
        root
    }

    fn type_name() -> String {
        <Self as JsonSchema>::schema_name()
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

fn strictify(value: &mut Value, definitions: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(resolved) = resolve(map, definitions) {
                *value = resolved;
                strictify(value, definitions);
                return;
            }

            if map.get("type").and_then(Value::as_str) == Some("object") {
                close_object(map);
            }

            for child in map.values_mut() {
                strictify(child, definitions);
            }
        }
        Value::Array(items) => {
            for item in items.iter_mut() {
                strictify(item, definitions);
            }
        }
        _ => {}
    }
}

/// Replacement for a `$ref` node or a single-element `allOf` wrapper.
fn resolve(map: &Map<String, Value>, definitions: &Value) -> Option<Value> {
    if let Some(name) = map
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix("#/definitions/"))
    {
        return definitions.get(name).cloned();
    }

    match map.get("allOf") {
        Some(Value::Array(all_of)) if all_of.len() == 1 => all_of.first().cloned(),
        _ => None,
    }
}

fn close_object(map: &mut Map<String, Value>) {
    map.insert("additionalProperties".to_string(), Value::Bool(false));

    let Some(Value::Object(props)) = map.get_mut("properties") else {
        return;
    };

    // Strict mode rejects `default` and numeric `format` hints.
    for prop in props.values_mut() {
        if let Value::Object(prop) = prop {
            prop.remove("default");
            if prop.get("format").is_some() && prop.get("type") != Some(&Value::from("string")) {
                prop.remove("format");
            }
        }
    }

    let required: Vec<Value> = props.keys().cloned().map(Value::String).collect();
    map.insert("required".to_string(), Value::Array(required));
}
