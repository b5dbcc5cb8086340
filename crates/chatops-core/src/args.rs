//! Handler arguments: declaration, free-text extraction and conversion.

use crate::schema::Schema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

const SMART_DOUBLE_QUOTES: [char; 2] = ['\u{201c}', '\u{201d}'];
const SMART_SINGLE_QUOTES: [char; 2] = ['\u{2018}', '\u{2019}'];

/// Keyword arguments handed to a handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(Map<String, Value>);

impl Args {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.0.get(key).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Deserialize the arguments into a typed struct.
    pub fn parse<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }
}

impl From<Map<String, Value>> for Args {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Args {
    type Error = String;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            Value::Null => Ok(Self::new()),
            other => Err(format!("expected a mapping of arguments, got {}", other)),
        }
    }
}

/// Per-argument value converter.
pub type Converter = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Stock converters.
pub mod converters {
    use super::Converter;
    use serde_json::Value;
    use std::sync::Arc;

    /// Convert to an integer.
    pub fn integer() -> Converter {
        Arc::new(|value| match value {
            Value::Number(n) if n.is_i64() => Ok(Value::Number(n)),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("invalid literal for int: '{}'", s)),
            other => Err(format!("can not convert {} to an int", other)),
        })
    }

    /// Convert common truthy/falsy spellings to a boolean.
    pub fn boolean() -> Converter {
        Arc::new(|value| match value {
            Value::Bool(b) => Ok(Value::Bool(b)),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "1" | "t" | "true" | "on" | "y" | "yes" => Ok(Value::Bool(true)),
                "0" | "f" | "false" | "off" | "n" | "no" => Ok(Value::Bool(false)),
                _ => Err(format!("unrecognized boolean value: '{}'", s)),
            },
            other => Err(format!("can not convert {} to a bool", other)),
        })
    }

    /// Split a comma separated string into a list of trimmed strings.
    pub fn comma_list() -> Converter {
        Arc::new(|value| match value {
            Value::String(s) => Ok(Value::Array(
                s.split(',')
                    .map(str::trim)
                    .filter(|piece| !piece.is_empty())
                    .map(|piece| Value::String(piece.to_string()))
                    .collect(),
            )),
            Value::Array(items) => Ok(Value::Array(items)),
            other => Err(format!("can not convert {} to a list", other)),
        })
    }
}

/// Declared arguments of a handler.
#[derive(Clone, Default)]
pub struct ArgsSpec {
    pub order: Vec<String>,
    pub defaults: Map<String, Value>,
    pub converters: HashMap<String, Converter>,
    pub accumulate: HashSet<String>,
    pub allow_extras: bool,
    pub schema: Option<Schema>,
    pub help: HashMap<String, String>,
}

impl ArgsSpec {
    pub fn new<I, S>(order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            order: order.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn default_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.defaults.insert(name.to_string(), value.into());
        self
    }

    pub fn convert(mut self, name: &str, converter: Converter) -> Self {
        self.converters.insert(name.to_string(), converter);
        self
    }

    pub fn accumulate(mut self, name: &str) -> Self {
        self.accumulate.insert(name.to_string());
        self
    }

    pub fn allow_extras(mut self) -> Self {
        self.allow_extras = true;
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn help(mut self, name: &str, text: &str) -> Self {
        self.help.insert(name.to_string(), text.to_string());
        self
    }

    /// Fill in defaults for missing declared arguments (explicit matches).
    pub fn apply_defaults(&self, args: &mut Args) {
        for (name, value) in &self.defaults {
            if !args.contains_key(name) {
                args.insert(name.clone(), value.clone());
            }
        }
    }

    /// Parse free text into arguments.
    pub fn extract(&self, raw: &str) -> Result<Args, String> {
        let pieces = tokenize(raw)?;
        self.extract_pieces(&pieces)
    }

    fn extract_pieces(&self, pieces: &[String]) -> Result<Args, String> {
        let mut positional = Vec::new();
        let mut keyword = Vec::new();
        for (i, piece) in pieces.iter().enumerate() {
            if is_likely_kwarg(piece) {
                keyword.push(i);
            } else {
                positional.push(i);
            }
        }

        if let (Some(&min_kw), Some(&min_pos), Some(&max_pos)) =
            (keyword.first(), positional.first(), positional.last())
        {
            if min_kw < min_pos || max_pos > min_kw {
                return Err("Keyword arguments must always follow positional \
                            arguments (and not be intermixed)"
                    .into());
            }
        }

        if positional.len() > self.order.len() && !self.allow_extras {
            return Err(format!(
                "{} extra (and unexpected) positional arguments were provided",
                positional.len() - self.order.len()
            ));
        }

        let mut out = Map::new();
        for (name, &i) in self.order.iter().zip(positional.iter()) {
            let value = Value::String(pieces[i].clone());
            if self.accumulate.contains(name) {
                out.insert(name.clone(), Value::Array(vec![value]));
            } else {
                out.insert(name.clone(), value);
            }
        }

        for &i in &keyword {
            let (name, value) = pieces[i].split_once('=').unwrap_or((pieces[i].as_str(), ""));
            if !self.allow_extras && !self.order.iter().any(|o| o == name) {
                return Err(format!("Unknown keyword argument '{}' provided", name));
            }
            let value = Value::String(value.to_string());
            if self.accumulate.contains(name) {
                match out.get_mut(name) {
                    Some(Value::Array(existing)) => existing.push(value),
                    _ => {
                        out.insert(name.to_string(), Value::Array(vec![value]));
                    }
                }
            } else {
                out.insert(name.to_string(), value);
            }
        }

        for name in &self.order {
            if out.contains_key(name) {
                continue;
            }
            if let Some(default) = self.defaults.get(name) {
                if self.accumulate.contains(name) {
                    out.insert(name.clone(), Value::Array(vec![default.clone()]));
                } else {
                    out.insert(name.clone(), default.clone());
                }
            }
        }

        for (name, value) in out.iter_mut() {
            let Some(converter) = self.converters.get(name) else {
                continue;
            };
            if self.accumulate.contains(name) {
                if let Value::Array(items) = value {
                    for item in items.iter_mut() {
                        *item = converter(item.take()).map_err(|e| arg_error(name, e))?;
                    }
                    continue;
                }
            }
            *value = converter(value.take()).map_err(|e| arg_error(name, e))?;
        }

        Ok(Args(out))
    }
}

fn arg_error(name: &str, reason: String) -> String {
    format!("Argument '{}' is invalid: {}", name, reason)
}

impl fmt::Debug for ArgsSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgsSpec")
            .field("order", &self.order)
            .field("defaults", &self.defaults)
            .field("converters", &self.converters.keys().collect::<Vec<_>>())
            .field("accumulate", &self.accumulate)
            .field("allow_extras", &self.allow_extras)
            .field("schema", &self.schema)
            .finish()
    }
}

/// Shell-style split after normalizing typographic quotes.
fn tokenize(raw: &str) -> Result<Vec<String>, String> {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if SMART_DOUBLE_QUOTES.contains(&c) {
                '"'
            } else if SMART_SINGLE_QUOTES.contains(&c) {
                '\''
            } else {
                c
            }
        })
        .collect();
    shell_words::split(&cleaned).map_err(|_| "No closing quotation found in arguments".to_string())
}

fn is_likely_kwarg(piece: &str) -> bool {
    let Some((name, _)) = piece.split_once('=') else {
        return false;
    };
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
