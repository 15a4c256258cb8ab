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

use crate::error::Error;
use crate::request::security::SecurityKind;
use crate::request::{HttpRequest, HttpResponse};
use crate::validator::errors::ValidationError;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Receives the original request and the request errors; `None` is a contract violation.
pub type BeforeHandler =
    Arc<dyn Fn(HttpRequest, &[ValidationError]) -> Option<HttpRequest> + Send + Sync>;

/// Builds a custom error response; `None` falls back to the default JSON body.
pub type ErrorHandler =
    Arc<dyn Fn(StatusCode, &str, &[ValidationError]) -> Option<HttpResponse> + Send + Sync>;

/// Authorization callback: `(request, scheme kind, credential, scopes)`.
/// A returned response ends the pipeline.
pub type SecurityHandler =
    Arc<dyn Fn(&HttpRequest, SecurityKind, &str, &[String]) -> Option<HttpResponse> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "camelCase")]
pub struct Options {
    pub additional_parameters: bool,
    pub example_response: bool,
    pub missing_format_exception: bool,
    pub path_not_found_exception: bool,
    pub set_default_parameters: bool,
    pub strip_response: bool,
    pub strip_response_headers: bool,
    pub validate_error: bool,
    pub validate_request: bool,
    pub validate_response: bool,
    pub validate_response_headers: bool,
    pub strict_empty_array_validation: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            additional_parameters: false,
            example_response: false,
            missing_format_exception: true,
            path_not_found_exception: true,
            set_default_parameters: false,
            strip_response: false,
            strip_response_headers: false,
            validate_error: false,
            validate_request: true,
            validate_response: true,
            validate_response_headers: false,
            strict_empty_array_validation: false,
        }
    }
}

const KNOWN_OPTIONS: [&str; 12] = [
    "additionalParameters",
    "exampleResponse",
    "missingFormatException",
    "pathNotFoundException",
    "setDefaultParameters",
    "stripResponse",
    "stripResponseHeaders",
    "validateError",
    "validateRequest",
    "validateResponse",
    "validateResponseHeaders",
    "strictEmptyArrayValidation",
];

impl Options {
    /// Reads options from a YAML (or JSON) mapping; unknown keys are rejected.
    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        let mapping: serde_yaml::Mapping = serde_yaml::from_str(contents)
            .map_err(|e| Error::InvalidOption(e.to_string()))?;

        for key in mapping.keys() {
            let name = key.as_str().unwrap_or_default();
            if !KNOWN_OPTIONS.contains(&name) {
                return Err(Error::InvalidOption(name.to_string()));
            }
        }

        serde_yaml::from_value(serde_yaml::Value::Mapping(mapping))
            .map_err(|e| Error::InvalidOption(e.to_string()))
    }
}

/// Caller-supplied hooks; none of them can be expressed in an options file.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before_handler: Option<BeforeHandler>,
    pub error_handler: Option<ErrorHandler>,
    pub security: Option<SecurityHandler>,
}
