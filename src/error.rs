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

use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop the pipeline.
///
/// Request and response validation problems are never reported through this
/// type; they are collected as [`crate::ValidationError`] values instead.
#[derive(Error, Debug)]
pub enum Error {
    #[error("OpenAPI document not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid OpenAPI document: {0}")]
    Document(String),

    #[error("invalid option '{0}'")]
    InvalidOption(String),

    #[error("no operation matches {method} {path}")]
    PathNotFound { method: String, path: String },

    #[error("Missing validator for type={type_}, format={format}")]
    MissingFormat { type_: String, format: String },

    #[error("before handler did not return a request")]
    BeforeHandler,
}

impl Error {
    /// HTTP status used by the framework adapters when the pipeline fails.
    pub fn status_code(&self) -> http::StatusCode {
        match self {
            Error::PathNotFound { .. } => http::StatusCode::NOT_FOUND,
            _ => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
