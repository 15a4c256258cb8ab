/*
 * Licensed to the Apache Software Foundation (ASF) under one or more
 * contributor license agreements.  See the NOTICE file distributed with
 * this work for additional information regarding copyright ownership.
 * The ASF licenses this file to You under the Apache License, Version 2.0
 * (the "License"); you may not use this file except in compliance with
 * the License.  You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::validator::format::FormatRegistry;
use anyhow::{anyhow, Result};
use jsonschema::error::{TypeKind, ValidationErrorKind};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A failure reported by the evaluator, before any OpenAPI-specific rework.
#[derive(Debug, Clone, PartialEq)]
pub struct RawError {
    /// Instance path segments below the validated root.
    pub path: Vec<String>,
    pub failure: Failure,
    /// The offending instance.
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    Required { property: String },
    Type { expected: String, used: String },
    Enum { options: Vec<Value> },
    Format { format: String },
    AdditionalProperties { unexpected: Vec<String> },
    /// The instance hit a `false` schema.
    FalseSchema,
    Keyword { keyword: String, limit: Option<Value> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ErrorTree {
    Leaf(RawError),
    Node(Vec<ErrorTree>),
}

impl ErrorTree {
    pub fn from_errors(mut errors: Vec<RawError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop().map(ErrorTree::Leaf),
            _ => Some(ErrorTree::Node(
                errors.into_iter().map(ErrorTree::Leaf).collect(),
            )),
        }
    }
}

/// Structural JSON Schema evaluation.
///
/// `Ok(None)` means the value conforms. `Err` is reserved for evaluator
/// failures such as a schema that does not compile.
pub trait SchemaEvaluator: Send + Sync {
    fn evaluate(
        &self,
        value: &Value,
        schema: &Value,
        formats: &FormatRegistry,
    ) -> Result<Option<ErrorTree>>;
}

/// [`SchemaEvaluator`] backed by the `jsonschema` crate (draft 2020-12).
///
/// Compiled validators are kept per schema and rebuilt once the format
/// registry changes.
#[derive(Default)]
pub struct JsonSchemaEvaluator {
    compiled: RwLock<HashMap<String, (u64, Arc<jsonschema::Validator>)>>,
}

impl JsonSchemaEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled schemas held.
    pub fn cached(&self) -> usize {
        match self.compiled.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn compile(
        &self,
        schema: &Value,
        formats: &FormatRegistry,
    ) -> Result<Arc<jsonschema::Validator>> {
        let key = schema.to_string();
        let generation = formats.generation();
        {
            let compiled = match self.compiled.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some((seen, validator)) = compiled.get(&key) {
                if *seen == generation {
                    return Ok(Arc::clone(validator));
                }
            }
        }

        let mut opts = jsonschema::options();
        opts.with_draft(jsonschema::Draft::Draft202012);
        opts.should_validate_formats(true);
        for (name, checker) in formats.string_formats() {
            opts.with_format(name, move |v: &str| checker(v));
        }
        let validator = Arc::new(
            opts.build(schema)
                .map_err(|e| anyhow!("invalid schema: {e}"))?,
        );

        let mut compiled = match self.compiled.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        compiled.insert(key, (generation, Arc::clone(&validator)));
        Ok(validator)
    }
}

impl SchemaEvaluator for JsonSchemaEvaluator {
    fn evaluate(
        &self,
        value: &Value,
        schema: &Value,
        formats: &FormatRegistry,
    ) -> Result<Option<ErrorTree>> {
        let validator = self.compile(schema, formats)?;
        let errors = validator
            .iter_errors(value)
            .map(|e| {
                let schema_path = e.schema_path.to_string();
                let failure = failure(&e.kind, &schema_path, schema, &e.instance);
                RawError {
                    path: pointer_segments(&e.instance_path.to_string()),
                    failure,
                    value: e.instance.clone().into_owned(),
                }
            })
            .collect();
        Ok(ErrorTree::from_errors(errors))
    }
}

fn failure(
    kind: &ValidationErrorKind,
    schema_path: &str,
    schema: &Value,
    instance: &Value,
) -> Failure {
    match kind {
        ValidationErrorKind::Required { property } => Failure::Required {
            property: property
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| property.to_string()),
        },
        ValidationErrorKind::Type { kind } => {
            let expected = match kind {
                TypeKind::Single(single) => single.to_string(),
                TypeKind::Multiple(_) => schema
                    .pointer(schema_path)
                    .and_then(Value::as_array)
                    .map(|types| {
                        types
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("|")
                    })
                    .unwrap_or_default(),
            };
            Failure::Type {
                expected,
                used: json_type(instance).to_string(),
            }
        }
        ValidationErrorKind::Enum { options } => Failure::Enum {
            options: options.as_array().cloned().unwrap_or_default(),
        },
        ValidationErrorKind::Format { format } => Failure::Format {
            format: format.to_string(),
        },
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            Failure::AdditionalProperties {
                unexpected: unexpected.clone(),
            }
        }
        ValidationErrorKind::FalseSchema { .. } => Failure::FalseSchema,
        _ => Failure::Keyword {
            keyword: pointer_segments(schema_path)
                .pop()
                .unwrap_or_else(|| "schema".to_string()),
            limit: schema.pointer(schema_path).cloned(),
        },
    }
}

/// JSON Schema type name of `value`; integral numbers report `integer`.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(n) if n.as_f64().is_some_and(|f| f.fract() == 0.0) => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|segment| segment.replace("~1", "/").replace("~0", "~"))
        .collect()
}
