//! JSON Schema validation of parsed handler arguments.

use crate::args::Args;
use jsonschema::validator_for;
use serde_json::Value;

/// JSON Schema describing a handler's argument mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema(Value);

impl Schema {
    pub fn new(definition: Value) -> Self {
        Self(definition)
    }

    pub fn definition(&self) -> &Value {
        &self.0
    }

    /// Validate, returning every problem as one line of a human readable block.
    ///
    /// Missing and unexpected keys are reported against `data`; a bad value
    /// is reported against `data['<key>']` together with what was given.
    pub fn validate(&self, args: &Args) -> Result<(), String> {
        let mut problems = Vec::new();

        let instance = args.clone().into_value();
        let structure = validator_for(&self.structure())
            .map_err(|e| format!("invalid argument schema: {}", e))?;
        for error in structure.iter_errors(&instance) {
            problems.push(format!("{} @ data", error));
        }

        if let Some(properties) = self.0.get("properties").and_then(Value::as_object) {
            for (key, value) in args.iter() {
                let Some(property) = properties.get(key) else {
                    continue;
                };
                let validator = validator_for(property)
                    .map_err(|e| format!("invalid argument schema for '{}': {}", key, e))?;
                for error in validator.iter_errors(value) {
                    problems.push(format!("{} @ data['{}']. Got {}", error, key, value));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems.join("\n"))
        }
    }

    /// The schema with every declared property accepting any value, so only
    /// required and additional keys are checked at the top level.
    fn structure(&self) -> Value {
        let mut structure = self.0.clone();
        if let Some(properties) = structure
            .get_mut("properties")
            .and_then(Value::as_object_mut)
        {
            for property in properties.values_mut() {
                *property = Value::Bool(true);
            }
        }
        structure
    }
}
