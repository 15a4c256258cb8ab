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

use crate::model::parse::{In, Method, OpenAPI, SecurityScheme, SecuritySchemeType};
use crate::options::SecurityHandler;
use crate::request::{HttpRequest, HttpResponse};
use crate::validator::property::{parse_cookies, QueryParams};
use http::header::AUTHORIZATION;
use serde_json::Value;
use std::fmt;

/// The kind of credential handed to the security callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityKind {
    Http,
    ApiKey,
    /// No requirement produced a credential.
    Error,
}

impl SecurityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityKind::Http => "http",
            SecurityKind::ApiKey => "apiKey",
            SecurityKind::Error => "error",
        }
    }
}

impl fmt::Display for SecurityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Looks for a credential for the operation's security requirements and
/// hands the first one found to `handler`.
///
/// Without requirements nothing happens. When no credential is present the
/// handler is called with [`SecurityKind::Error`], also for operations with
/// an empty (anonymous) requirement, so the handler makes that call.
pub fn validate_security(
    openapi: &OpenAPI,
    template: &str,
    method: &Method,
    request: &HttpRequest,
    handler: &SecurityHandler,
) -> Option<HttpResponse> {
    let requirements = openapi.security(template, method);
    if requirements.is_empty() {
        return None;
    }

    for requirement in requirements {
        for (name, scopes) in requirement {
            let Some(scheme) = openapi.security_scheme(name) else {
                log::warn!("security scheme {name} is not declared");
                continue;
            };
            let credential = match scheme.r#type {
                SecuritySchemeType::Http => {
                    authorization(request, scheme).map(|token| (SecurityKind::Http, token))
                }
                SecuritySchemeType::ApiKey => {
                    api_key(request, scheme).map(|token| (SecurityKind::ApiKey, token))
                }
                _ => None,
            };
            if let Some((kind, credential)) = credential {
                log::debug!("{kind} credential found for scheme {name}");
                return handler(request, kind, &credential, scopes);
            }
        }
    }

    handler(request, SecurityKind::Error, "", &[])
}

/// The `Authorization` header without its `<scheme> ` prefix.
fn authorization(request: &HttpRequest, scheme: &SecurityScheme) -> Option<String> {
    let value = request.headers().get(AUTHORIZATION)?.to_str().ok()?.trim();
    let token = match (scheme.scheme.as_deref(), value.split_once(' ')) {
        (Some(expected), Some((prefix, rest))) if prefix.eq_ignore_ascii_case(expected) => {
            rest.trim()
        }
        _ => value,
    };
    (!token.is_empty()).then(|| token.to_string())
}

fn api_key(request: &HttpRequest, scheme: &SecurityScheme) -> Option<String> {
    let name = scheme.name.as_deref()?;
    let token = match scheme.r#in? {
        In::Query => {
            match QueryParams::parse(request.uri().query().unwrap_or_default()).get(name) {
                Some(Value::String(token)) => Some(token.clone()),
                _ => None,
            }
        }
        In::Header => request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        In::Cookie => parse_cookies(request.headers()).shift_remove(name),
        In::Path => None,
    }?;
    (!token.is_empty()).then_some(token)
}
