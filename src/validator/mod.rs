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

pub mod errors;
pub mod evaluator;
pub mod format;
pub mod json;
pub mod normalize;
pub mod property;
pub mod schema;

mod pattern_test;

use crate::error::Error;
use crate::options::Options;
use errors::{ErrorKind, ValidationError};
use evaluator::{JsonSchemaEvaluator, SchemaEvaluator};
use format::{FormatChecker, FormatRegistry};
use normalize::ErrorNormalizer;
use property::{Location, Property};
use serde_json::Value;
use std::sync::Arc;

/// Validates properties and values against OpenAPI schemas and reports
/// flat [`ValidationError`] lists.
pub struct Validator {
    formats: FormatRegistry,
    evaluator: Box<dyn SchemaEvaluator>,
    missing_format_exception: bool,
    strict_empty_array: bool,
}

impl Validator {
    pub fn new(options: &Options) -> Self {
        Self {
            formats: FormatRegistry::new(),
            evaluator: Box::new(JsonSchemaEvaluator::new()),
            missing_format_exception: options.missing_format_exception,
            strict_empty_array: options.strict_empty_array_validation,
        }
    }

    pub fn with_evaluator(mut self, evaluator: impl SchemaEvaluator + 'static) -> Self {
        self.evaluator = Box::new(evaluator);
        self
    }

    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    pub fn add_format(&self, type_: &str, name: &str, checker: FormatChecker) {
        self.formats.register(type_, name, checker);
    }

    /// Makes sure a checker exists for `(type_, name)`.
    ///
    /// Unknown formats fail with [`Error::MissingFormat`], or get a permissive
    /// checker when missing formats are tolerated.
    pub fn ensure_format(&self, type_: &str, name: &str) -> Result<(), Error> {
        if self.formats.resolve(type_, name) {
            return Ok(());
        }
        if self.missing_format_exception {
            return Err(Error::MissingFormat {
                type_: type_.to_string(),
                format: name.to_string(),
            });
        }
        log::debug!("accepting unknown format type={type_} format={name}");
        self.formats.register(type_, name, Arc::new(|_: &str| true));
        Ok(())
    }

    /// Resolves every format used by `schemas` up front and returns the
    /// `(type, format)` pairs nothing is known for. Those are left to
    /// [`Validator::ensure_format`] when a request first uses them.
    pub fn warm_up<'a>(
        &self,
        schemas: impl IntoIterator<Item = &'a Value>,
    ) -> Vec<(String, String)> {
        let mut unresolved = Vec::new();
        for schema in schemas {
            for pair in schema::formats(schema) {
                if !self.formats.resolve(&pair.0, &pair.1) && !unresolved.contains(&pair) {
                    log::debug!("no checker for type={} format={}", pair.0, pair.1);
                    unresolved.push(pair);
                }
            }
        }
        unresolved
    }

    pub fn validate_properties(
        &self,
        properties: &[Property],
    ) -> Result<Vec<ValidationError>, Error> {
        let mut errors = Vec::new();
        for property in properties {
            let Some(value) = property.value() else {
                if property.required() {
                    errors.push(ValidationError::required(
                        property.name(),
                        Some(property.location()),
                    ));
                }
                continue;
            };

            let found = self.validate_value(
                property.name(),
                Some(property.location()),
                value,
                property.schema(),
            )?;
            if property.location() == Location::Query {
                errors.extend(
                    found
                        .into_iter()
                        .filter(|error| !query_tolerates(property, error)),
                );
            } else {
                errors.extend(found);
            }
        }
        Ok(errors)
    }

    /// Validates one value rooted at `name`.
    ///
    /// Evaluator failures come back as a single `error_server` entry.
    pub fn validate_value(
        &self,
        name: &str,
        location: Option<Location>,
        value: &Value,
        schema: &Value,
    ) -> Result<Vec<ValidationError>, Error> {
        for (type_, format) in schema::formats(schema) {
            self.ensure_format(&type_, &format)?;
        }
        let normalized = schema::normalize(schema);

        match self.evaluator.evaluate(value, &normalized, &self.formats) {
            Ok(None) => Ok(Vec::new()),
            Ok(Some(tree)) => {
                let normalizer = ErrorNormalizer {
                    name,
                    location,
                    schema: &normalized,
                    strict_empty_array: self.strict_empty_array,
                };
                Ok(normalizer.flatten(tree))
            }
            Err(e) => {
                log::error!("schema evaluation failed for {name}: {e}");
                Ok(vec![ValidationError::server(e.to_string())])
            }
        }
    }
}

/// Query values always arrive as strings. A single digit passes for a plain
/// integer, and `0`, `1`, `true`, `false` (any case) pass for a boolean.
fn query_tolerates(property: &Property, error: &ValidationError) -> bool {
    let ErrorKind::Type {
        expected,
        used,
        value: Value::String(raw),
    } = &error.kind
    else {
        return false;
    };
    if used != "string" {
        return false;
    }
    match expected.as_str() {
        "integer" => {
            property.format().is_none() && raw.len() == 1 && raw.as_bytes()[0].is_ascii_digit()
        }
        "boolean" => matches!(
            raw.to_lowercase().as_str(),
            "0" | "1" | "true" | "false"
        ),
        _ => false,
    }
}
