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

use crate::model::parse::{Header, In, Parameter, Style};
use crate::validator::errors::{ErrorKind, ValidationError};
use crate::validator::schema::schema_type;
use http::header::{HeaderMap, COOKIE};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Where a validated value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Location {
    Path,
    Query,
    Header,
    Cookie,
    Body,
    FormData,
}

impl From<In> for Location {
    fn from(value: In) -> Self {
        match value {
            In::Path => Location::Path,
            In::Query => Location::Query,
            In::Header => Location::Header,
            In::Cookie => Location::Cookie,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Location::Path => "path",
            Location::Query => "query",
            Location::Header => "header",
            Location::Cookie => "cookie",
            Location::Body => "body",
            Location::FormData => "form-data",
        })
    }
}

/// A named, located value together with the schema it must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    name: String,
    location: Location,
    required: bool,
    schema: Value,
    value: Option<Value>,
}

impl Property {
    pub fn new(
        name: impl Into<String>,
        location: Location,
        required: bool,
        schema: Value,
        value: Option<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            required,
            schema,
            value,
        }
    }

    pub fn from_parameter(parameter: &Parameter, value: Option<Value>) -> Self {
        Self::new(
            parameter.name.clone(),
            parameter.r#in.into(),
            parameter.required,
            parameter.schema.clone(),
            value,
        )
    }

    pub fn from_header(name: &str, header: &Header, value: Option<Value>) -> Self {
        Self::new(
            name,
            Location::Header,
            header.required,
            header.schema.clone(),
            value,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn required(&self) -> bool {
        self.required
    }

    pub fn schema(&self) -> &Value {
        &self.schema
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn schema_type(&self) -> Option<&str> {
        schema_type(&self.schema)
    }

    pub fn format(&self) -> Option<&str> {
        self.schema.get("format").and_then(Value::as_str)
    }

    pub fn enum_values(&self) -> Option<&[Value]> {
        self.schema
            .get("enum")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }
}

/// The query string as seen by validation.
///
/// Bracket keys nest (`filter[ids][0]=1`, `tags[]=a`), repeated plain keys
/// collect into an array, and every leaf stays a string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams(IndexMap<String, Value>);

impl QueryParams {
    pub fn parse(query: &str) -> Self {
        let mut params: IndexMap<String, Value> = IndexMap::new();

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let (base, segments) = split_key(&key);
            if segments.is_empty() {
                match params.get_mut(&base) {
                    Some(Value::Array(items)) => items.push(Value::String(value.into_owned())),
                    Some(existing) => {
                        let first = existing.take();
                        *existing = Value::Array(vec![first, Value::String(value.into_owned())]);
                    }
                    None => {
                        params.insert(base, Value::String(value.into_owned()));
                    }
                }
                continue;
            }
            let slot = params.entry(base).or_insert(Value::Null);
            assign(slot, &segments, value.into_owned());
        }

        for value in params.values_mut() {
            listify(value);
        }
        Self(params)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn into_map(self) -> IndexMap<String, Value> {
        self.0
    }

    /// Re-splits array and object query values according to the declared
    /// `style` and `explode`. Other values are left as sent.
    pub fn deserialize(&mut self, parameters: &[Parameter]) {
        for parameter in parameters.iter().filter(|p| p.r#in == In::Query) {
            if !matches!(
                schema_type(&parameter.schema),
                Some("array") | Some("object")
            ) {
                continue;
            }
            let Some(Value::String(raw)) = self.0.get(&parameter.name) else {
                continue;
            };

            let delimiter = match (parameter.style(), parameter.explode()) {
                (Style::Form, false) => ',',
                (Style::SpaceDelimited, _) => ' ',
                (Style::PipeDelimited, _) => '|',
                _ => continue,
            };
            let parts = raw
                .split(delimiter)
                .map(|part| Value::String(part.to_string()))
                .collect();
            self.0.insert(parameter.name.clone(), Value::Array(parts));
        }
    }

    /// Absent query parameters whose schema declares a `default`.
    pub fn missing_defaults(&self, parameters: &[Parameter]) -> Vec<(String, Value)> {
        parameters
            .iter()
            .filter(|p| p.r#in == In::Query && !self.contains(&p.name))
            .filter_map(|p| Some((p.name.clone(), p.schema.get("default")?.clone())))
            .collect()
    }
}

fn split_key(key: &str) -> (String, Vec<String>) {
    let Some(open) = key.find('[').filter(|&i| i > 0) else {
        return (key.to_string(), Vec::new());
    };

    let mut segments = Vec::new();
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            break;
        };
        segments.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }
    (key[..open].to_string(), segments)
}

fn assign(slot: &mut Value, segments: &[String], value: String) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = Value::String(value);
        return;
    };

    if head.is_empty() {
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            items.push(Value::Null);
            if let Some(last) = items.last_mut() {
                assign(last, rest, value);
            }
        }
    } else {
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            let next = map.entry(head.clone()).or_insert(Value::Null);
            assign(next, rest, value);
        }
    }
}

/// Turns objects keyed `0..n` into arrays.
fn listify(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.values_mut().for_each(listify);
            let sequential = !map.is_empty()
                && map
                    .keys()
                    .enumerate()
                    .all(|(index, key)| key.parse::<usize>() == Ok(index));
            if sequential {
                let items = std::mem::take(map).into_iter().map(|(_, v)| v).collect();
                *value = Value::Array(items);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(listify),
        _ => {}
    }
}

/// Cookie pairs from every `Cookie` header.
pub fn parse_cookies(headers: &HeaderMap) -> IndexMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Converts a simple-style string to the scalar type its schema declares.
///
/// Values that do not parse stay strings so the schema check reports them.
pub fn coerce_scalar(raw: &str, schema: &Value) -> Value {
    match schema_type(schema) {
        Some("integer") => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        Some("number") => raw
            .parse::<i64>()
            .map(Value::from)
            .ok()
            .or_else(|| {
                raw.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
            })
            .unwrap_or_else(|| Value::String(raw.to_string())),
        Some("boolean") => match raw.to_ascii_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        _ => Value::String(raw.to_string()),
    }
}

/// One property per declared path, query, header and cookie parameter.
pub fn request_properties(
    parameters: &[Parameter],
    path_values: &IndexMap<String, String>,
    query: &QueryParams,
    headers: &HeaderMap,
    cookies: &IndexMap<String, String>,
) -> Vec<Property> {
    parameters
        .iter()
        .map(|parameter| {
            let value = match parameter.r#in {
                In::Path => path_values
                    .get(&parameter.name)
                    .map(|raw| coerce_scalar(raw, &parameter.schema)),
                In::Query => query.get(&parameter.name).cloned(),
                In::Header => headers
                    .get(parameter.name.as_str())
                    .and_then(|value| value.to_str().ok())
                    .map(|raw| coerce_scalar(raw, &parameter.schema)),
                In::Cookie => cookies
                    .get(&parameter.name)
                    .map(|raw| coerce_scalar(raw, &parameter.schema)),
            };
            Property::from_parameter(parameter, value)
        })
        .collect()
}

/// Path and query values that no parameter declares.
pub fn undeclared_parameters(
    parameters: &[Parameter],
    path_values: &IndexMap<String, String>,
    query: &QueryParams,
) -> Vec<ValidationError> {
    let declared = |name: &str, location: In| {
        parameters
            .iter()
            .any(|p| p.r#in == location && p.name == name)
    };

    let path = path_values
        .keys()
        .map(String::as_str)
        .filter(|name| !declared(name, In::Path))
        .map(|name| (name, Location::Path));
    let query = query
        .names()
        .filter(|name| !declared(name, In::Query))
        .map(|name| (name, Location::Query));

    path.chain(query)
        .map(|(name, location)| {
            ValidationError::new(name, Some(location), ErrorKind::Additional { value: None })
        })
        .collect()
}
