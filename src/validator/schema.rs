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

//! OpenAPI schema fragments rewritten into plain JSON Schema.

use serde_json::{json, Map, Value};

const SCHEMA_MAPS: [&str; 4] = ["properties", "patternProperties", "$defs", "definitions"];
const SCHEMA_LISTS: [&str; 4] = ["allOf", "anyOf", "oneOf", "prefixItems"];
const SCHEMA_SINGLES: [&str; 4] = ["additionalProperties", "items", "not", "contains"];

/// The declared type, skipping `null` in type unions.
pub fn schema_type(schema: &Value) -> Option<&str> {
    match schema.get("type")? {
        Value::String(name) => Some(name.as_str()),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .find(|name| *name != "null"),
        _ => None,
    }
}

fn has_type(schema: &Map<String, Value>, name: &str) -> bool {
    match schema.get("type") {
        Some(Value::String(t)) => t == name,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(name)),
        _ => false,
    }
}

fn for_each_subschema(schema: &mut Map<String, Value>, mut f: impl FnMut(&str, &mut Value)) {
    for key in SCHEMA_MAPS {
        if let Some(Value::Object(children)) = schema.get_mut(key) {
            children.values_mut().for_each(|child| f(key, child));
        }
    }
    for key in SCHEMA_LISTS {
        if let Some(Value::Array(children)) = schema.get_mut(key) {
            children.iter_mut().for_each(|child| f(key, child));
        }
    }
    for key in SCHEMA_SINGLES {
        match schema.get_mut(key) {
            Some(Value::Array(children)) if key == "items" => {
                children.iter_mut().for_each(|child| f(key, child))
            }
            Some(child @ Value::Object(_)) => f(key, child),
            _ => {}
        }
    }
}

fn subschemas(schema: &Map<String, Value>) -> Vec<&Value> {
    let mut found = Vec::new();
    for key in SCHEMA_MAPS {
        if let Some(Value::Object(children)) = schema.get(key) {
            found.extend(children.values());
        }
    }
    for key in SCHEMA_LISTS {
        if let Some(Value::Array(children)) = schema.get(key) {
            found.extend(children.iter());
        }
    }
    for key in SCHEMA_SINGLES {
        match schema.get(key) {
            Some(Value::Array(children)) if key == "items" => found.extend(children.iter()),
            Some(child @ Value::Object(_)) => found.push(child),
            _ => {}
        }
    }
    found
}

/// Rewrites OpenAPI-only constructs into their JSON Schema equivalents.
///
/// `normalize(normalize(s)) == normalize(s)` holds for every input.
pub fn normalize(schema: &Value) -> Value {
    let Value::Object(source) = schema else {
        return schema.clone();
    };
    let mut schema = source.clone();
    for_each_subschema(&mut schema, |_, child| *child = normalize(child));

    rewrite_exclusive(&mut schema, "exclusiveMinimum", "minimum");
    rewrite_exclusive(&mut schema, "exclusiveMaximum", "maximum");

    if schema.contains_key("$ref") && schema.len() > 1 {
        if let Some(reference) = schema.remove("$ref") {
            let mut branches = vec![json!({ "$ref": reference })];
            if let Some(Value::Array(existing)) = schema.remove("allOf") {
                branches.extend(existing);
            }
            schema.insert("allOf".to_string(), Value::Array(branches));
        }
    }

    match schema.remove("nullable") {
        Some(Value::Bool(true)) => nullable(schema),
        _ => Value::Object(schema),
    }
}

fn rewrite_exclusive(schema: &mut Map<String, Value>, keyword: &str, bound: &str) {
    match schema.get(keyword) {
        Some(Value::Bool(true)) => {
            if let Some(limit) = schema.remove(bound) {
                schema.insert(keyword.to_string(), limit);
            } else {
                schema.remove(keyword);
            }
        }
        Some(Value::Bool(false)) => {
            schema.remove(keyword);
        }
        _ => {}
    }
}

fn nullable(mut schema: Map<String, Value>) -> Value {
    let null_branch = json!({ "type": "null" });

    if let Some(declared) = schema.get_mut("type") {
        match declared {
            Value::String(name) if name.as_str() != "null" => {
                let name = name.clone();
                *declared = json!([name, "null"]);
            }
            Value::Array(names) if !names.iter().any(|n| n == "null") => {
                names.push(Value::from("null"));
            }
            _ => {}
        }
        if let Some(Value::Array(options)) = schema.get_mut("enum") {
            if !options.contains(&Value::Null) {
                options.push(Value::Null);
            }
        }
        return Value::Object(schema);
    }

    for key in ["oneOf", "anyOf"] {
        if let Some(Value::Array(branches)) = schema.get_mut(key) {
            if !branches.contains(&null_branch) {
                branches.push(null_branch);
            }
            return Value::Object(schema);
        }
    }

    json!({ "anyOf": [Value::Object(schema), null_branch] })
}

/// Forbids undeclared members at every object level that does not say
/// otherwise. Branch roots of `allOf` are left open so the branches can
/// still be combined.
pub fn additional_properties(schema: &Value) -> Value {
    inject_additional(schema, false)
}

fn inject_additional(schema: &Value, all_of_branch: bool) -> Value {
    let Value::Object(source) = schema else {
        return schema.clone();
    };
    let mut schema = source.clone();
    for_each_subschema(&mut schema, |key, child| {
        *child = inject_additional(child, key == "allOf");
    });

    let is_object = has_type(&schema, "object") || schema.contains_key("properties");
    if is_object
        && !all_of_branch
        && !schema.contains_key("additionalProperties")
        && !schema.contains_key("allOf")
    {
        schema.insert("additionalProperties".to_string(), Value::Bool(false));
    }
    Value::Object(schema)
}

/// Every `(type, format)` pair declared anywhere in `schema`.
pub fn formats(schema: &Value) -> Vec<(String, String)> {
    let mut found = Vec::new();
    collect_formats(schema, &mut found);
    found
}

fn collect_formats(schema: &Value, found: &mut Vec<(String, String)>) {
    let Value::Object(map) = schema else {
        return;
    };
    if let (Some(kind), Some(format)) = (
        schema_type(schema),
        map.get("format").and_then(Value::as_str),
    ) {
        let pair = (kind.to_string(), format.to_string());
        if !found.contains(&pair) {
            found.push(pair);
        }
    }
    for child in subschemas(map) {
        collect_formats(child, found);
    }
}
