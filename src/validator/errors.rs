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

use crate::validator::property::Location;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// One flat validation failure.
///
/// `name` is the dot-joined path from the property (or body) root, for
/// example `filter.ids.1`. It is empty when the failure is on an unnamed root.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub name: String,
    pub location: Option<Location>,
    pub kind: ErrorKind,
}

/// Kind-specific attributes of a [`ValidationError`].
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    Required,
    Type {
        expected: String,
        used: String,
        value: Value,
    },
    Enum {
        expected: Vec<Value>,
        value: Value,
    },
    Format {
        format: String,
        value: Value,
    },
    /// Content that no schema allows: an undeclared parameter, or a value
    /// rejected by a `false` schema.
    Additional {
        value: Option<Value>,
    },
    AdditionalProperties {
        properties: Vec<String>,
        value: Value,
    },
    ContentType {
        expected: Vec<String>,
        used: String,
    },
    Server {
        message: String,
    },
    InvalidJson {
        message: String,
    },
    /// Any other keyword failure (`pattern`, `minimum`, `maxItems`, ...).
    Constraint {
        keyword: String,
        limit: Option<Value>,
        value: Value,
    },
}

impl ValidationError {
    pub fn new(name: impl Into<String>, location: Option<Location>, kind: ErrorKind) -> Self {
        Self {
            name: name.into(),
            location,
            kind,
        }
    }

    pub fn required(name: impl Into<String>, location: Option<Location>) -> Self {
        Self::new(name, location, ErrorKind::Required)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(
            "server",
            None,
            ErrorKind::Server {
                message: message.into(),
            },
        )
    }

    pub fn code(&self) -> String {
        match &self.kind {
            ErrorKind::Required => "error_required".to_string(),
            ErrorKind::Type { .. } => "error_type".to_string(),
            ErrorKind::Enum { .. } => "error_enum".to_string(),
            ErrorKind::Format { .. } => "error_format".to_string(),
            ErrorKind::Additional { .. } => "error_additional".to_string(),
            ErrorKind::AdditionalProperties { .. } => "error_additionalProperties".to_string(),
            ErrorKind::ContentType { .. } => "error_content_type".to_string(),
            ErrorKind::Server { .. } => "error_server".to_string(),
            ErrorKind::InvalidJson { .. } => "error_json".to_string(),
            ErrorKind::Constraint { keyword, .. } => format!("error_{keyword}"),
        }
    }

    /// The offending value, when the kind carries one.
    pub fn value(&self) -> Option<&Value> {
        match &self.kind {
            ErrorKind::Type { value, .. }
            | ErrorKind::Enum { value, .. }
            | ErrorKind::Format { value, .. }
            | ErrorKind::AdditionalProperties { value, .. }
            | ErrorKind::Constraint { value, .. } => Some(value),
            ErrorKind::Additional { value } => value.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(location) => write!(f, "{} ({}): {}", self.name, location, self.code()),
            None => write!(f, "{}: {}", self.name, self.code()),
        }
    }
}

impl Serialize for ValidationError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &self.name)?;
        map.serialize_entry("code", &self.code())?;
        if let Some(location) = &self.location {
            map.serialize_entry("in", location)?;
        }

        match &self.kind {
            ErrorKind::Required => {}
            ErrorKind::Type {
                expected,
                used,
                value,
            } => {
                map.serialize_entry("expected", expected)?;
                map.serialize_entry("used", used)?;
                map.serialize_entry("type", used)?;
                map.serialize_entry("value", value)?;
            }
            ErrorKind::Enum { expected, value } => {
                map.serialize_entry("expected", expected)?;
                map.serialize_entry("value", value)?;
            }
            ErrorKind::Format { format, value } => {
                map.serialize_entry("format", format)?;
                map.serialize_entry("value", value)?;
            }
            ErrorKind::Additional { value } => {
                if let Some(value) = value {
                    map.serialize_entry("value", value)?;
                }
            }
            ErrorKind::AdditionalProperties { properties, value } => {
                map.serialize_entry("properties", properties)?;
                map.serialize_entry("value", value)?;
            }
            ErrorKind::ContentType { expected, used } => {
                match expected.as_slice() {
                    [single] => map.serialize_entry("expected", single)?,
                    _ => map.serialize_entry("expected", expected)?,
                }
                map.serialize_entry("used", used)?;
            }
            ErrorKind::Server { message } | ErrorKind::InvalidJson { message } => {
                map.serialize_entry("message", message)?;
            }
            ErrorKind::Constraint { limit, value, .. } => {
                if let Some(limit) = limit {
                    map.serialize_entry("expected", limit)?;
                }
                map.serialize_entry("value", value)?;
            }
        }
        map.end()
    }
}
