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

//! The request/response validation pipeline.
//!
//! [`OpenApiValidation`] is framework independent: it works on
//! `http::Request<Bytes>` and `http::Response<Bytes>`. The `axum` and
//! `actix-web` features add middleware that buffer bodies and drive
//! [`OpenApiValidation::process_request`] and
//! [`OpenApiValidation::process_response`] around the inner service.

pub mod example;
pub mod form;
pub mod security;

#[cfg(feature = "actix-web")]
pub mod actix_web;
#[cfg(feature = "axum")]
pub mod axum;


use crate::error::Error;
use crate::model::document::PathMatch;
use crate::model::parse::{MediaType, Method, OpenAPI};
use crate::observability::{RequestContext, ValidationMetrics};
use crate::options::{Hooks, Options};
use crate::validator::errors::{ErrorKind, ValidationError};
use crate::validator::json::{is_json_media_type, nested_empty_objects_as_arrays, remove_path};
use crate::validator::property::{self, Location, Property, QueryParams};
use crate::validator::{schema, Validator};
use bytes::Bytes;
use form::FormData;
use http::header::{
    HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_REQUEST_METHOD, CONTENT_LENGTH,
    CONTENT_TYPE,
};
use http::uri::{PathAndQuery, Uri};
use http::StatusCode;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

pub type HttpRequest = http::Request<Bytes>;
pub type HttpResponse = http::Response<Bytes>;

/// What to do with a request after [`OpenApiValidation::process_request`].
#[derive(Debug)]
pub enum RequestFlow {
    /// Not subject to validation. Call the service and return its response as is.
    Bypass(HttpRequest),
    /// Answer with this response; the service is not called.
    Respond(HttpResponse),
    /// Call the service, then hand its response to
    /// [`OpenApiValidation::process_response`].
    Forward {
        request: HttpRequest,
        exchange: Exchange,
    },
}

/// Request facts the response side needs.
#[derive(Debug, Clone)]
pub struct Exchange {
    template: String,
    method: Method,
    request_media_type: Option<String>,
    request_body: Option<Value>,
}

impl Exchange {
    fn new(template: String, method: Method, request: &HttpRequest) -> Self {
        let request_media_type = media_type(request.headers());
        let request_body = request_media_type
            .as_deref()
            .filter(|media| is_json_media_type(media))
            .and_then(|_| serde_json::from_slice(request.body()).ok());
        Self {
            template,
            method,
            request_media_type,
            request_body,
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn method(&self) -> &Method {
        &self.method
    }
}

/// OpenAPI validation of requests and responses.
///
/// Cloning is cheap: the document, options, hooks and format registry are
/// shared.
///
/// # example
///
/// ```rust
/// use bytes::Bytes;
/// use openapi_validation::OpenApiValidation;
///
/// let yaml = r#"
/// openapi: 3.0.3
/// info:
///   title: Users
///   version: '1.0.0'
/// paths:
///   /users/{id}:
///     get:
///       parameters:
///         - name: id
///           in: path
///           required: true
///           schema:
///             type: integer
///       responses:
///         '200':
///           description: ok
/// "#;
///
/// let validation = OpenApiValidation::from_yaml(yaml).unwrap();
/// let request = http::Request::get("/users/abc").body(Bytes::new()).unwrap();
/// let response = validation
///     .handle(request, |_| http::Response::new(Bytes::new()))
///     .unwrap();
/// assert_eq!(response.status(), 400);
/// ```
#[derive(Clone)]
pub struct OpenApiValidation {
    openapi: Arc<OpenAPI>,
    options: Arc<Options>,
    hooks: Hooks,
    validator: Arc<Validator>,
}

/// Collects options, hooks and custom formats before validation starts.
pub struct OpenApiValidationBuilder {
    openapi: OpenAPI,
    options: Options,
    hooks: Hooks,
    formats: Vec<(String, String, crate::validator::format::FormatChecker)>,
}

impl OpenApiValidationBuilder {
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Called with the request and its errors when request validation fails.
    /// The returned request is handed to the service.
    pub fn before_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(HttpRequest, &[ValidationError]) -> Option<HttpRequest> + Send + Sync + 'static,
    {
        self.hooks.before_handler = Some(Arc::new(handler));
        self
    }

    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(StatusCode, &str, &[ValidationError]) -> Option<HttpResponse> + Send + Sync + 'static,
    {
        self.hooks.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn security_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&HttpRequest, security::SecurityKind, &str, &[String]) -> Option<HttpResponse>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.security = Some(Arc::new(handler));
        self
    }

    pub fn format<F>(mut self, type_: &str, name: &str, checker: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.formats
            .push((type_.to_string(), name.to_string(), Arc::new(checker)));
        self
    }

    pub fn build(self) -> Result<OpenApiValidation, Error> {
        check_document(&self.openapi)?;

        let validator = Validator::new(&self.options);
        for (type_, name, checker) in self.formats {
            validator.add_format(&type_, &name, checker);
        }
        let unresolved = validator.warm_up(self.openapi.schemas());
        if !unresolved.is_empty() {
            log::debug!("formats without a checker: {unresolved:?}");
        }

        Ok(OpenApiValidation {
            openapi: Arc::new(self.openapi),
            options: Arc::new(self.options),
            hooks: self.hooks,
            validator: Arc::new(validator),
        })
    }
}

fn check_document(openapi: &OpenAPI) -> Result<(), Error> {
    if !openapi.openapi.starts_with("3.") {
        return Err(Error::Document(format!(
            "unsupported OpenAPI version '{}'",
            openapi.openapi
        )));
    }
    if openapi.info.title.is_empty() {
        return Err(Error::Document("Title is required".to_string()));
    }
    if openapi.info.version.is_empty() {
        return Err(Error::Document("Version is required".to_string()));
    }
    Ok(())
}

impl OpenApiValidation {
    pub fn builder(openapi: OpenAPI) -> OpenApiValidationBuilder {
        OpenApiValidationBuilder {
            openapi,
            options: Options::default(),
            hooks: Hooks::default(),
            formats: Vec::new(),
        }
    }

    pub fn new(openapi: OpenAPI, options: Options) -> Result<Self, Error> {
        Self::builder(openapi).options(options).build()
    }

    /// Loads the document from a `.json` file, or YAML for any other extension.
    pub fn from_file(path: impl AsRef<Path>, options: Options) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| Error::Document(e.to_string()))?;
        let openapi = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => OpenAPI::json(&contents).map_err(|e| Error::Document(e.to_string()))?,
            _ => OpenAPI::yaml(&contents).map_err(|e| Error::Document(e.to_string()))?,
        };
        Self::new(openapi, options)
    }

    pub fn from_yaml(yaml_content: &str) -> anyhow::Result<Self> {
        let openapi = OpenAPI::yaml(yaml_content)?;
        Ok(Self::new(openapi, Options::default())?)
    }

    pub fn openapi(&self) -> &OpenAPI {
        &self.openapi
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Registers or replaces a format checker.
    pub fn add_format<F>(&self, type_: &str, name: &str, checker: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validator.add_format(type_, name, Arc::new(checker));
    }

    /// Runs the whole pipeline around a synchronous `next`.
    pub fn handle<F>(&self, request: HttpRequest, next: F) -> Result<HttpResponse, Error>
    where
        F: FnOnce(HttpRequest) -> HttpResponse,
    {
        let metrics = ValidationMetrics::from_context(&RequestContext::from_request(&request));

        let result = self.process_request(request).and_then(|flow| match flow {
            RequestFlow::Bypass(request) => Ok(next(request)),
            RequestFlow::Respond(response) => Ok(response),
            RequestFlow::Forward { request, exchange } => {
                self.process_response(&exchange, next(request))
            }
        });

        metrics.record(&result);
        result
    }

    /// Everything up to calling the service: CORS bypass, operation lookup,
    /// the security hook and request validation.
    pub fn process_request(&self, mut request: HttpRequest) -> Result<RequestFlow, Error> {
        if is_cors_preflight(&request) {
            log::debug!("CORS preflight for {} bypasses validation", request.uri().path());
            return Ok(RequestFlow::Bypass(request));
        }

        let matched = Method::from_str(request.method().as_str())
            .ok()
            .and_then(|method| {
                let found = self.openapi.match_path(request.uri().path(), &method)?;
                Some((method, found))
            });
        let Some((method, found)) = matched else {
            if self.options.path_not_found_exception {
                return Err(Error::PathNotFound {
                    method: request.method().to_string(),
                    path: request.uri().path().to_string(),
                });
            }
            log::debug!(
                "no operation for {} {}, passing through",
                request.method(),
                request.uri().path()
            );
            return Ok(RequestFlow::Bypass(request));
        };

        if let Some(handler) = &self.hooks.security {
            if let Some(response) = security::validate_security(
                &self.openapi,
                &found.template,
                &method,
                &request,
                handler,
            ) {
                return Ok(RequestFlow::Respond(response));
            }
        }

        let errors = if self.options.validate_request {
            self.validate_request(&mut request, &method, &found)?
        } else {
            Vec::new()
        };
        let exchange = Exchange::new(found.template, method, &request);
        if errors.is_empty() {
            return Ok(RequestFlow::Forward { request, exchange });
        }

        log::warn!(
            "request validation failed for {} {}: {}",
            request.method(),
            request.uri().path(),
            join_errors(&errors)
        );
        if let Some(before_handler) = &self.hooks.before_handler {
            let request = before_handler(request, &errors).ok_or(Error::BeforeHandler)?;
            return Ok(RequestFlow::Forward { request, exchange });
        }

        let response =
            self.error_response(StatusCode::BAD_REQUEST, "Request validation failed", &errors);
        if self.options.validate_error {
            return self
                .process_response(&exchange, response)
                .map(RequestFlow::Respond);
        }
        Ok(RequestFlow::Respond(response))
    }

    /// Example synthesis, response body validation (with stripping) and
    /// response header validation.
    pub fn process_response(
        &self,
        exchange: &Exchange,
        mut response: HttpResponse,
    ) -> Result<HttpResponse, Error> {
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(response);
        }

        if self.options.example_response && response.body().is_empty() {
            if let Some(example) = example::example_response(
                &self.openapi,
                &exchange.template,
                &exchange.method,
                exchange.request_media_type.as_deref(),
                exchange.request_body.as_ref(),
            ) {
                response = example;
            }
        }

        if self.options.validate_response {
            let errors = self.validate_response_body(exchange, &mut response)?;
            if !errors.is_empty() {
                log::warn!(
                    "response validation failed for {} {}: {}",
                    exchange.method,
                    exchange.template,
                    join_errors(&errors)
                );
                return Ok(self.error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Response validation failed",
                    &errors,
                ));
            }
        }

        if self.options.validate_response_headers {
            let errors = self.validate_response_headers(exchange, &mut response)?;
            if !errors.is_empty() {
                log::warn!(
                    "response header validation failed for {} {}: {}",
                    exchange.method,
                    exchange.template,
                    join_errors(&errors)
                );
                return Ok(self.error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Response validation failed",
                    &errors,
                ));
            }
        }

        Ok(response)
    }

    /// Parameters, undeclared parameters, default injection and the body.
    ///
    /// With `set_default_parameters` the request URI is rewritten to carry the
    /// injected defaults.
    pub fn validate_request(
        &self,
        request: &mut HttpRequest,
        method: &Method,
        found: &PathMatch,
    ) -> Result<Vec<ValidationError>, Error> {
        let parameters = self.openapi.parameters(&found.template, method);
        let mut query = QueryParams::parse(request.uri().query().unwrap_or_default());
        query.deserialize(&parameters);

        let mut errors = Vec::new();
        if !self.options.additional_parameters {
            errors.extend(property::undeclared_parameters(
                &parameters,
                &found.values,
                &query,
            ));
        }

        if self.options.set_default_parameters {
            let defaults = query.missing_defaults(&parameters);
            if !defaults.is_empty() {
                if let Some(uri) = with_query_defaults(request.uri(), &defaults) {
                    *request.uri_mut() = uri;
                }
                for (name, value) in defaults {
                    query.insert(name, value);
                }
            }
        }

        let cookies = property::parse_cookies(request.headers());
        let properties = property::request_properties(
            &parameters,
            &found.values,
            &query,
            request.headers(),
            &cookies,
        );
        errors.extend(self.validator.validate_properties(&properties)?);
        errors.extend(self.validate_request_body(request, &found.template, method)?);
        Ok(errors)
    }

    pub fn validate_request_body(
        &self,
        request: &HttpRequest,
        template: &str,
        method: &Method,
    ) -> Result<Vec<ValidationError>, Error> {
        let Some(body) = self.openapi.request_body(template, method) else {
            return Ok(Vec::new());
        };
        let media_type = match media_type(request.headers()) {
            Some(media_type) => media_type,
            None => match body.content.keys().next() {
                Some(declared) => declared.to_lowercase(),
                None => return Ok(Vec::new()),
            },
        };
        let Some(content) = find_content(&body.content, &media_type) else {
            return Ok(Vec::new());
        };

        if request.body().is_empty() {
            if body.required {
                return Ok(vec![ValidationError::required("requestBody", None)]);
            }
            return Ok(Vec::new());
        }
        let Some(schema) = &content.schema else {
            return Ok(Vec::new());
        };

        if is_json_media_type(&media_type) {
            return match serde_json::from_slice::<Value>(request.body()) {
                Ok(mut value) => {
                    nested_empty_objects_as_arrays(&mut value);
                    self.validator
                        .validate_value("", Some(Location::Body), &value, schema)
                }
                Err(e) => Ok(vec![ValidationError::new(
                    "requestBody",
                    Some(Location::Body),
                    ErrorKind::InvalidJson {
                        message: e.to_string(),
                    },
                )]),
            };
        }

        if media_type == "multipart/form-data" || media_type == "application/x-www-form-urlencoded"
        {
            return self.validate_form_data(request, content, schema);
        }
        Ok(Vec::new())
    }

    fn validate_form_data(
        &self,
        request: &HttpRequest,
        content: &MediaType,
        schema: &Value,
    ) -> Result<Vec<ValidationError>, Error> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let form = FormData::parse(content_type, request.body());

        let (mut errors, properties) = form::form_properties(schema, &content.encoding, &form);
        errors.extend(self.validator.validate_properties(&properties)?);
        Ok(errors)
    }

    /// Validates a JSON response body. With `strip_response` undeclared
    /// members and disallowed nulls are removed from the body instead of
    /// being reported.
    pub fn validate_response_body(
        &self,
        exchange: &Exchange,
        response: &mut HttpResponse,
    ) -> Result<Vec<ValidationError>, Error> {
        let Some(found) = self.openapi.response(
            &exchange.template,
            &exchange.method,
            Some(response.status().as_u16()),
        ) else {
            return Ok(Vec::new());
        };

        let media_type = match media_type(response.headers()).filter(|media| {
            found
                .response
                .content
                .get(media)
                .is_some_and(|content| content.schema.is_some())
        }) {
            Some(media_type) => media_type,
            None => match found.response.default_media_type() {
                Some(media_type) => media_type.to_string(),
                None => return Ok(Vec::new()),
            },
        };
        let Some(schema) = found
            .response
            .content
            .get(&media_type)
            .and_then(|content| content.schema.as_ref())
        else {
            return Ok(Vec::new());
        };
        if !is_json_media_type(&media_type) {
            return Ok(Vec::new());
        }

        let body = serde_json::from_slice::<Value>(response.body())
            .ok()
            .filter(|body| !body.is_null());
        let Some(mut body) = body else {
            return Ok(vec![ValidationError::required("responseBody", None)]);
        };

        if !self.options.strip_response {
            return self
                .validator
                .validate_value("", Some(Location::Body), &body, schema);
        }

        let closed = schema::additional_properties(schema);
        let errors = self
            .validator
            .validate_value("", Some(Location::Body), &body, &closed)?;

        let mut removals = Vec::new();
        let mut remaining = Vec::new();
        for error in errors {
            let paths: Vec<String> = match &error.kind {
                ErrorKind::AdditionalProperties { properties, .. } => properties
                    .iter()
                    .map(|property| join_path(&error.name, property))
                    .collect(),
                ErrorKind::Additional { .. } => vec![error.name.clone()],
                ErrorKind::Type {
                    used,
                    value: Value::Null,
                    ..
                } if used == "null" => vec![error.name.clone()],
                _ => Vec::new(),
            };
            if paths.is_empty() {
                remaining.push(error);
            } else {
                removals.extend(paths);
            }
        }

        if !removals.is_empty() {
            for path in removals.iter().rev() {
                remove_path(&mut body, path);
            }
            match serde_json::to_vec(&body) {
                Ok(stripped) => {
                    if response.headers().contains_key(CONTENT_LENGTH) {
                        response
                            .headers_mut()
                            .insert(CONTENT_LENGTH, HeaderValue::from(stripped.len()));
                    }
                    *response.body_mut() = Bytes::from(stripped);
                }
                Err(e) => log::error!("failed to encode stripped response body: {e}"),
            }
        }
        Ok(remaining)
    }

    /// Validates declared response headers. With `strip_response_headers`
    /// every undeclared header except `Content-Type` is removed first.
    pub fn validate_response_headers(
        &self,
        exchange: &Exchange,
        response: &mut HttpResponse,
    ) -> Result<Vec<ValidationError>, Error> {
        let Some(found) = self.openapi.response(
            &exchange.template,
            &exchange.method,
            Some(response.status().as_u16()),
        ) else {
            return Ok(Vec::new());
        };

        if self.options.strip_response_headers {
            let declared: Vec<String> = found
                .response
                .headers
                .keys()
                .map(|name| name.to_ascii_lowercase())
                .collect();
            let undeclared: Vec<HeaderName> = response
                .headers()
                .keys()
                .filter(|name| {
                    **name != CONTENT_TYPE && !declared.iter().any(|d| d == name.as_str())
                })
                .cloned()
                .collect();
            for name in undeclared {
                response.headers_mut().remove(&name);
            }
        }

        let mut properties = Vec::new();
        for (name, header) in &found.response.headers {
            if name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()) {
                continue;
            }
            let Some(header) = self.openapi.header(header) else {
                continue;
            };
            let value = response
                .headers()
                .get(name.as_str())
                .and_then(|value| value.to_str().ok())
                .map(|raw| property::coerce_scalar(raw, &header.schema));
            properties.push(Property::from_header(name, &header, value));
        }
        self.validator.validate_properties(&properties)
    }

    /// JSON error body `{"message": .., "errors": [..]}`, unless the error
    /// handler hook supplies its own response.
    pub fn error_response(
        &self,
        status: StatusCode,
        message: &str,
        errors: &[ValidationError],
    ) -> HttpResponse {
        if let Some(handler) = &self.hooks.error_handler {
            if let Some(response) = handler(status, message, errors) {
                return response;
            }
        }

        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(message.to_string()));
        if !errors.is_empty() {
            match serde_json::to_value(errors) {
                Ok(errors) => {
                    body.insert("errors".to_string(), errors);
                }
                Err(e) => log::error!("failed to encode validation errors: {e}"),
            }
        }

        let mut response =
            HttpResponse::new(Bytes::from(serde_json::to_vec(&body).unwrap_or_default()));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

/// Lower-cased media type of a `Content-Type` header, parameters removed.
pub fn media_type(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let media_type = raw.split([';', ',']).next()?.trim();
    (!media_type.is_empty()).then(|| media_type.to_lowercase())
}

/// Declared content for a media type: exact, then `type/*`, then `*/*`.
fn find_content<'a>(
    content: &'a IndexMap<String, MediaType>,
    media_type: &str,
) -> Option<&'a MediaType> {
    let main = media_type.split('/').next().unwrap_or_default();
    let range = format!("{main}/*");
    content
        .iter()
        .find(|(declared, _)| declared.eq_ignore_ascii_case(media_type))
        .or_else(|| {
            content
                .iter()
                .find(|(declared, _)| declared.eq_ignore_ascii_case(&range))
        })
        .or_else(|| content.get_key_value("*/*"))
        .map(|(_, media)| media)
}

fn is_cors_preflight(request: &HttpRequest) -> bool {
    request.method() == http::Method::OPTIONS
        && request.headers().contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

fn with_query_defaults(uri: &Uri, defaults: &[(String, Value)]) -> Option<Uri> {
    let existing = uri.query().unwrap_or_default().to_string();
    let mut query = url::form_urlencoded::Serializer::for_suffix(existing, 0);
    for (name, value) in defaults {
        match value {
            Value::String(value) => query.append_pair(name, value),
            other => query.append_pair(name, &other.to_string()),
        };
    }
    let path_and_query = PathAndQuery::try_from(format!("{}?{}", uri.path(), query.finish()));

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.ok()?);
    match Uri::from_parts(parts) {
        Ok(uri) => Some(uri),
        Err(e) => {
            log::warn!("could not add default parameters to {uri}: {e}");
            None
        }
    }
}

fn join_path(base: &str, member: &str) -> String {
    if base.is_empty() {
        member.to_string()
    } else {
        format!("{base}.{member}")
    }
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
