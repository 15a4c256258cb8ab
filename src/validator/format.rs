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

use base64::{engine::general_purpose, Engine};
use chrono::{DateTime, NaiveDate, NaiveTime};
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use validator::ValidateEmail;

pub type FormatChecker = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Format checkers keyed by `(type, name)`.
///
/// Registration is idempotent: registering a key again replaces the checker.
/// Readers never observe a partially written entry.
pub struct FormatRegistry {
    formats: RwLock<HashMap<(String, String), FormatChecker>>,
    generation: AtomicU64,
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FormatRegistry {
    pub fn new() -> Self {
        let registry = Self {
            formats: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        };
        registry.register("string", "password", Arc::new(|_: &str| true));
        registry
    }

    pub fn register(&self, type_: &str, name: &str, checker: FormatChecker) {
        let mut formats = match self.formats.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        formats.insert((type_.to_string(), name.to_string()), checker);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Changes on every registration.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get(&self, type_: &str, name: &str) -> Option<FormatChecker> {
        let formats = match self.formats.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        formats
            .get(&(type_.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, type_: &str, name: &str) -> bool {
        self.get(type_, name).is_some()
    }

    /// Looks the format up, registering a well-known checker on a miss.
    /// Returns `false` when nothing is known for `(type_, name)`.
    pub fn resolve(&self, type_: &str, name: &str) -> bool {
        if self.contains(type_, name) {
            return true;
        }
        match well_known(type_, name) {
            Some(checker) => {
                log::debug!("registering format type={type_} format={name}");
                self.register(type_, name, checker);
                true
            }
            None => false,
        }
    }

    /// Checkers that apply to string values, by format name.
    pub fn string_formats(&self) -> Vec<(String, FormatChecker)> {
        let formats = match self.formats.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        formats
            .iter()
            .filter(|((type_, _), _)| type_ == "string")
            .map(|((_, name), checker)| (name.clone(), checker.clone()))
            .collect()
    }
}

pub fn well_known(type_: &str, name: &str) -> Option<FormatChecker> {
    let checker: FormatChecker = match (type_, name) {
        ("string", "email") => Arc::new(|v: &str| v.validate_email()),
        ("string", "date") => Arc::new(|v: &str| NaiveDate::parse_from_str(v, "%Y-%m-%d").is_ok()),
        ("string", "date-time") => Arc::new(|v: &str| DateTime::parse_from_rfc3339(v).is_ok()),
        ("string", "time") => Arc::new(is_time),
        ("string", "uuid") => Arc::new(|v: &str| uuid::Uuid::parse_str(v).is_ok()),
        ("string", "ipv4") => Arc::new(|v: &str| v.parse::<Ipv4Addr>().is_ok()),
        ("string", "ipv6") => Arc::new(|v: &str| v.parse::<Ipv6Addr>().is_ok()),
        ("string", "hostname") => Arc::new(is_hostname),
        ("string", "uri") => Arc::new(|v: &str| url::Url::parse(v).is_ok()),
        ("string", "uri-reference") => Arc::new(is_uri_reference),
        ("string", "regex") => Arc::new(|v: &str| regex::Regex::new(v).is_ok()),
        ("string", "json-pointer") => Arc::new(is_json_pointer),
        ("string", "byte") | ("string", "base64") => {
            Arc::new(|v: &str| general_purpose::STANDARD.decode(v).is_ok())
        }
        ("string", "binary") => Arc::new(|_: &str| true),
        ("integer", "int32" | "int64") | ("number", "int32" | "int64" | "float" | "double") => {
            Arc::new(|_: &str| true)
        }
        _ => return None,
    };
    Some(checker)
}

fn is_time(value: &str) -> bool {
    NaiveTime::parse_from_str(value, "%H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(&format!("1970-01-01T{value}")).is_ok()
}

fn is_hostname(value: &str) -> bool {
    let value = value.strip_suffix('.').unwrap_or(value);
    !value.is_empty()
        && value.len() <= 253
        && value.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

fn is_uri_reference(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    url::Url::parse(value).is_ok()
        || url::Url::parse("http://localhost/")
            .and_then(|base| base.join(value))
            .is_ok()
}

fn is_json_pointer(value: &str) -> bool {
    if value.is_empty() {
        return true;
    }
    value.starts_with('/')
        && value
            .split('~')
            .skip(1)
            .all(|rest| rest.starts_with('0') || rest.starts_with('1'))
}
