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

//! Turns evaluator error trees into flat [`ValidationError`] lists.

use crate::validator::errors::{ErrorKind, ValidationError};
use crate::validator::evaluator::{ErrorTree, Failure, RawError};
use crate::validator::property::Location;
use serde_json::Value;

pub struct ErrorNormalizer<'a> {
    /// Name of the validated root; empty for an unnamed body.
    pub name: &'a str,
    pub location: Option<Location>,
    /// Schema of the validated root, used for enum enrichment.
    pub schema: &'a Value,
    pub strict_empty_array: bool,
}

impl ErrorNormalizer<'_> {
    /// Walks the tree depth first, keeping evaluator order.
    ///
    /// Only the first missing member of an object is reported.
    pub fn flatten(&self, tree: ErrorTree) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut required_at: Vec<Vec<String>> = Vec::new();
        let mut pending = vec![tree];
        while let Some(node) = pending.pop() {
            match node {
                ErrorTree::Leaf(raw) => {
                    if matches!(raw.failure, Failure::Required { .. }) {
                        if required_at.contains(&raw.path) {
                            continue;
                        }
                        required_at.push(raw.path.clone());
                    }
                    errors.extend(self.leaf(raw));
                }
                ErrorTree::Node(children) => pending.extend(children.into_iter().rev()),
            }
        }
        errors
    }

    fn leaf(&self, raw: RawError) -> Option<ValidationError> {
        let RawError {
            path,
            failure,
            value,
        } = raw;
        let root_level = path.is_empty();
        let name = format!("{}.{}", self.name, path.join("."))
            .trim_matches('.')
            .to_string();

        let (name, kind) = match failure {
            Failure::Required { property } if name.is_empty() => (property, ErrorKind::Required),
            Failure::Required { property } => (format!("{name}.{property}"), ErrorKind::Required),
            Failure::Type { expected, used } => {
                let empty_array = value.as_array().is_some_and(Vec::is_empty);
                if expected.split('|').any(|t| t == "object")
                    && used == "array"
                    && empty_array
                    && !self.strict_empty_array
                {
                    return None;
                }
                (
                    name,
                    ErrorKind::Type {
                        expected,
                        used,
                        value,
                    },
                )
            }
            Failure::Enum { options } => {
                let declared = self
                    .schema
                    .get("enum")
                    .and_then(Value::as_array)
                    .filter(|_| root_level);
                let expected = declared.cloned().unwrap_or(options);
                (name, ErrorKind::Enum { expected, value })
            }
            Failure::Format { format } => (name, ErrorKind::Format { format, value }),
            Failure::AdditionalProperties { unexpected } => (
                name,
                ErrorKind::AdditionalProperties {
                    properties: unexpected,
                    value,
                },
            ),
            Failure::FalseSchema => (name, ErrorKind::Additional { value: Some(value) }),
            Failure::Keyword { keyword, limit } => (
                name,
                ErrorKind::Constraint {
                    keyword,
                    limit,
                    value,
                },
            ),
        };
        Some(ValidationError::new(name, self.location, kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(path: &[&str], failure: Failure, value: Value) -> ErrorTree {
        ErrorTree::Leaf(RawError {
            path: path.iter().map(|s| s.to_string()).collect(),
            failure,
            value,
        })
    }

    fn type_failure(expected: &str, used: &str) -> Failure {
        Failure::Type {
            expected: expected.to_string(),
            used: used.to_string(),
        }
    }

    #[test]
    fn test_nested_names() {
        let schema = json!({});
        let normalizer = ErrorNormalizer {
            name: "filter",
            location: Some(Location::Query),
            schema: &schema,
            strict_empty_array: false,
        };
        let tree = ErrorTree::Node(vec![
            raw(&["ids", "1"], type_failure("integer", "string"), json!("aaa")),
            ErrorTree::Node(vec![raw(&[], type_failure("object", "string"), json!("x"))]),
        ]);
        let errors = normalizer.flatten(tree);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].name, "filter.ids.1");
        assert_eq!(errors[0].location, Some(Location::Query));
        assert_eq!(errors[1].name, "filter");
    }

    #[test]
    fn test_unnamed_root_trims_dots() {
        let schema = json!({});
        let normalizer = ErrorNormalizer {
            name: "",
            location: Some(Location::Body),
            schema: &schema,
            strict_empty_array: false,
        };
        let errors = normalizer.flatten(ErrorTree::Node(vec![
            raw(&["bar"], type_failure("integer", "string"), json!("x")),
            raw(
                &[],
                Failure::Required {
                    property: "foo".to_string(),
                },
                json!({}),
            ),
            raw(
                &["person"],
                Failure::Required {
                    property: "name".to_string(),
                },
                json!({}),
            ),
        ]));
        let names: Vec<_> = errors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["bar", "foo", "person.name"]);
        assert_eq!(errors[1].kind, ErrorKind::Required);
    }

    #[test]
    fn test_enum_uses_declared_values_at_root() {
        let schema = json!({"type": "string", "enum": ["aaa", "bbb"]});
        let normalizer = ErrorNormalizer {
            name: "foo",
            location: Some(Location::Query),
            schema: &schema,
            strict_empty_array: false,
        };
        let errors = normalizer.flatten(raw(
            &[],
            Failure::Enum {
                options: vec![json!("internal")],
            },
            json!("ccc"),
        ));
        assert_eq!(
            errors[0].kind,
            ErrorKind::Enum {
                expected: vec![json!("aaa"), json!("bbb")],
                value: json!("ccc")
            }
        );
    }

    #[test]
    fn test_false_schema_is_additional() {
        let schema = json!({});
        let normalizer = ErrorNormalizer {
            name: "",
            location: None,
            schema: &schema,
            strict_empty_array: false,
        };
        let errors = normalizer.flatten(raw(&["extra"], Failure::FalseSchema, json!("x")));
        assert_eq!(errors[0].code(), "error_additional");
        assert_eq!(errors[0].name, "extra");
    }

    #[test]
    fn test_empty_array_tolerance() {
        let schema = json!({});
        let tolerant = ErrorNormalizer {
            name: "",
            location: Some(Location::Body),
            schema: &schema,
            strict_empty_array: false,
        };
        let tree = raw(&["person"], type_failure("object", "array"), json!([]));
        assert!(tolerant.flatten(tree.clone()).is_empty());

        let strict = ErrorNormalizer {
            strict_empty_array: true,
            ..tolerant
        };
        let errors = strict.flatten(tree);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, "person");
        assert_eq!(errors[0].code(), "error_type");

        let non_empty = raw(&["person"], type_failure("object", "array"), json!([1]));
        assert_eq!(tolerant.flatten(non_empty).len(), 1);

        let nullable = raw(&["person"], type_failure("object|null", "array"), json!([]));
        assert!(tolerant.flatten(nullable).is_empty());
    }

    #[test]
    fn test_first_missing_member_only() {
        let schema = json!({});
        let normalizer = ErrorNormalizer {
            name: "",
            location: Some(Location::Body),
            schema: &schema,
            strict_empty_array: false,
        };
        let missing = |path: &[&str], property: &str| {
            raw(
                path,
                Failure::Required {
                    property: property.to_string(),
                },
                json!({}),
            )
        };
        let errors = normalizer.flatten(ErrorTree::Node(vec![
            missing(&[], "foo"),
            missing(&[], "bar"),
            missing(&["person"], "name"),
            missing(&["person"], "email"),
            missing(&[], "person"),
        ]));
        let names: Vec<_> = errors.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["foo", "person.name"]);
    }
}
