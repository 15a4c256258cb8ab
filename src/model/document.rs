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

//! Operation lookups over a parsed [`OpenAPI`] document.
//!
//! Everything handed out here is already dereferenced: parameter, body,
//! response and header `$ref`s point at `components`, and schemas have their
//! local `#/components/...` references inlined.

use crate::model::parse::{
    ExampleObject, Header, In, MediaType, Method, OpenAPI, Operation, Parameter, RefOr,
    RequestBody, Response, SecurityRequirement, SecurityScheme,
};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};

/// A request path resolved to a path template of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    pub template: String,
    pub values: IndexMap<String, String>,
}

/// The response object selected for a status code.
#[derive(Debug, Clone)]
pub struct ResponseMatch {
    /// Key the response is declared under (`"201"`, `"2XX"`, `"default"`).
    pub status_code: String,
    pub response: Response,
}

impl OpenAPI {
    /// Finds the operation for `path` and `method`.
    ///
    /// Literal templates win over templated ones; among templated matches the
    /// one with more literal segments wins. Server URL path prefixes are
    /// stripped before matching.
    pub fn match_path(&self, path: &str, method: &Method) -> Option<PathMatch> {
        let mut best: Option<(usize, PathMatch)> = None;

        for candidate in self.candidate_paths(path) {
            for (template, item) in &self.paths {
                if item.operation(method).is_none() {
                    continue;
                }
                if let Some((score, values)) = match_template(template, &candidate) {
                    if best.as_ref().map_or(true, |(s, _)| score > *s) {
                        best = Some((
                            score,
                            PathMatch {
                                template: template.clone(),
                                values,
                            },
                        ));
                    }
                }
            }
        }

        best.map(|(_, m)| m)
    }

    pub fn operation(&self, template: &str, method: &Method) -> Option<&Operation> {
        self.paths.get(template)?.operation(method)
    }

    /// Path-level parameters merged with the operation's, the latter winning
    /// on the same `(name, in)` pair.
    pub fn parameters(&self, template: &str, method: &Method) -> Vec<Parameter> {
        let Some(item) = self.paths.get(template) else {
            return Vec::new();
        };
        let operation = item.operation(method);

        let mut merged: IndexMap<(String, In), Parameter> = IndexMap::new();
        let declared = item
            .parameters
            .iter()
            .chain(operation.into_iter().flat_map(|o| o.parameters.iter()));

        for parameter in declared {
            if let Some(mut parameter) = self.resolve_parameter(parameter) {
                parameter.schema = self.resolve_schema(&parameter.schema);
                merged.insert((parameter.name.clone(), parameter.r#in), parameter);
            }
        }

        merged.into_values().collect()
    }

    pub fn request_body(&self, template: &str, method: &Method) -> Option<RequestBody> {
        let body = self.operation(template, method)?.request_body.as_ref()?;
        let mut body = match body {
            RefOr::Item(body) => body.clone(),
            RefOr::Ref { reference } => self
                .components
                .as_ref()?
                .request_bodies
                .get(component_name(reference, "requestBodies")?)?
                .clone(),
        };
        for media in body.content.values_mut() {
            media.schema = media.schema.as_ref().map(|s| self.resolve_schema(s));
        }
        Some(body)
    }

    /// Response declared for `status`: exact code, then the `NXX` range, then
    /// `default`. Without a status the first declared response is returned.
    pub fn response(
        &self,
        template: &str,
        method: &Method,
        status: Option<u16>,
    ) -> Option<ResponseMatch> {
        let responses = &self.operation(template, method)?.responses;

        let (status_code, response) = match status {
            Some(status) => {
                let exact = status.to_string();
                let range = format!("{}XX", status / 100);
                responses
                    .get_key_value(&exact)
                    .or_else(|| {
                        responses
                            .iter()
                            .find(|(code, _)| code.eq_ignore_ascii_case(&range))
                    })
                    .or_else(|| responses.get_key_value("default"))?
            }
            None => responses.first()?,
        };

        let mut response = match response {
            RefOr::Item(response) => response.clone(),
            RefOr::Ref { reference } => self
                .components
                .as_ref()?
                .responses
                .get(component_name(reference, "responses")?)?
                .clone(),
        };
        for media in response.content.values_mut() {
            media.schema = media.schema.as_ref().map(|s| self.resolve_schema(s));
        }
        for header in response.headers.values_mut() {
            if let RefOr::Item(header) = header {
                header.schema = self.resolve_schema(&header.schema);
            }
        }

        Some(ResponseMatch {
            status_code: status_code.clone(),
            response,
        })
    }

    /// Dereferences a response header declaration.
    pub fn header(&self, header: &RefOr<Header>) -> Option<Header> {
        match header {
            RefOr::Item(header) => Some(header.clone()),
            RefOr::Ref { reference } => {
                let mut header = self
                    .components
                    .as_ref()?
                    .headers
                    .get(component_name(reference, "headers")?)?
                    .clone();
                header.schema = self.resolve_schema(&header.schema);
                Some(header)
            }
        }
    }

    /// Dereferences a named example of a media type.
    pub fn example(&self, example: &RefOr<ExampleObject>) -> Option<ExampleObject> {
        match example {
            RefOr::Item(example) => Some(example.clone()),
            RefOr::Ref { reference } => self
                .components
                .as_ref()?
                .examples
                .get(component_name(reference, "examples")?)
                .cloned(),
        }
    }

    /// Operation security requirements, falling back to the document's.
    pub fn security(&self, template: &str, method: &Method) -> &[SecurityRequirement] {
        match self.operation(template, method) {
            Some(Operation {
                security: Some(security),
                ..
            }) => security,
            Some(_) => &self.security,
            None => &[],
        }
    }

    pub fn security_scheme(&self, name: &str) -> Option<&SecurityScheme> {
        self.components.as_ref()?.security_schemes.get(name)
    }

    /// Every schema declared inline in the document or under `components`.
    pub fn schemas(&self) -> Vec<&Value> {
        fn media_schemas<'a>(
            content: impl IntoIterator<Item = &'a MediaType>,
        ) -> impl Iterator<Item = &'a Value> {
            content.into_iter().filter_map(|media| media.schema.as_ref())
        }

        let mut schemas = Vec::new();
        for item in self.paths.values() {
            let operations = [
                &item.get,
                &item.put,
                &item.post,
                &item.delete,
                &item.options,
                &item.head,
                &item.patch,
                &item.trace,
            ];
            let parameters = item.parameters.iter().chain(
                operations
                    .into_iter()
                    .flatten()
                    .flat_map(|o| o.parameters.iter()),
            );
            schemas.extend(parameters.filter_map(|p| match p {
                RefOr::Item(p) => Some(&p.schema),
                RefOr::Ref { .. } => None,
            }));

            for operation in operations.into_iter().flatten() {
                if let Some(RefOr::Item(body)) = &operation.request_body {
                    schemas.extend(media_schemas(body.content.values()));
                }
                for response in operation.responses.values() {
                    if let RefOr::Item(response) = response {
                        schemas.extend(media_schemas(response.content.values()));
                        schemas.extend(response.headers.values().filter_map(|h| match h {
                            RefOr::Item(h) => Some(&h.schema),
                            RefOr::Ref { .. } => None,
                        }));
                    }
                }
            }
        }

        if let Some(components) = &self.components {
            schemas.extend(components.schemas.values());
            schemas.extend(components.parameters.values().map(|p| &p.schema));
            schemas.extend(components.headers.values().map(|h| &h.schema));
            for body in components.request_bodies.values() {
                schemas.extend(media_schemas(body.content.values()));
            }
            for response in components.responses.values() {
                schemas.extend(media_schemas(response.content.values()));
            }
        }
        schemas
    }

    /// Inlines local `#/components/...` schema references.
    ///
    /// A reference met again while it is being expanded is replaced by the
    /// empty schema. References that cannot be resolved are left untouched.
    pub fn resolve_schema(&self, schema: &Value) -> Value {
        self.inline_refs(schema, &mut Vec::new())
    }

    fn inline_refs(&self, schema: &Value, stack: &mut Vec<String>) -> Value {
        match schema {
            Value::Object(map) => {
                if let Some(Value::String(reference)) = map.get("$ref") {
                    if stack.contains(reference) {
                        log::debug!("recursive schema reference {reference} left open");
                        return Value::Object(Map::new());
                    }
                    if let Some(target) = self.schema_target(reference) {
                        stack.push(reference.clone());
                        let resolved = self.inline_refs(target, stack);
                        stack.pop();

                        let siblings: Map<String, Value> = map
                            .iter()
                            .filter(|(key, _)| key.as_str() != "$ref")
                            .map(|(key, value)| (key.clone(), self.inline_refs(value, stack)))
                            .collect();
                        if siblings.is_empty() {
                            return resolved;
                        }
                        let mut wrapped = siblings;
                        wrapped.insert("allOf".to_string(), Value::Array(vec![resolved]));
                        return Value::Object(wrapped);
                    }
                }
                Value::Object(
                    map.iter()
                        .map(|(key, value)| (key.clone(), self.inline_refs(value, stack)))
                        .collect(),
                )
            }
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.inline_refs(item, stack))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn schema_target(&self, reference: &str) -> Option<&Value> {
        let rest = reference.strip_prefix("#/components/schemas/")?;
        let (name, pointer) = match rest.split_once('/') {
            Some((name, pointer)) => (name, format!("/{pointer}")),
            None => (rest, String::new()),
        };
        let schema = self
            .components
            .as_ref()?
            .schemas
            .get(&unescape_pointer(name))?;
        if pointer.is_empty() {
            Some(schema)
        } else {
            schema.pointer(&pointer)
        }
    }

    fn resolve_parameter(&self, parameter: &RefOr<Parameter>) -> Option<Parameter> {
        match parameter {
            RefOr::Item(parameter) => Some(parameter.clone()),
            RefOr::Ref { reference } => {
                let resolved = self
                    .components
                    .as_ref()
                    .and_then(|c| c.parameters.get(component_name(reference, "parameters")?))
                    .cloned();
                if resolved.is_none() {
                    log::warn!("unresolved parameter reference {reference}");
                }
                resolved
            }
        }
    }

    fn candidate_paths(&self, path: &str) -> Vec<String> {
        let mut candidates = vec![path.to_string()];
        for server in &self.servers {
            let base = server_base_path(&server.url);
            if base.is_empty() {
                continue;
            }
            if let Some(rest) = path.strip_prefix(base.as_str()) {
                if rest.is_empty() {
                    candidates.push("/".to_string());
                } else if rest.starts_with('/') {
                    candidates.push(rest.to_string());
                }
            }
        }
        candidates
    }
}

fn server_base_path(url: &str) -> String {
    let path = match url::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    path.trim_end_matches('/').to_string()
}

fn component_name<'a>(reference: &'a str, kind: &str) -> Option<&'a str> {
    reference
        .strip_prefix("#/components/")?
        .strip_prefix(kind)?
        .strip_prefix('/')
}

fn unescape_pointer(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Matches `path` against `template`, returning the number of literal
/// segments and the decoded template values.
fn match_template(template: &str, path: &str) -> Option<(usize, IndexMap<String, String>)> {
    let template_segments: Vec<&str> = split_path(template);
    let path_segments: Vec<&str> = split_path(path);
    if template_segments.len() != path_segments.len() {
        return None;
    }

    let mut literal = 0;
    let mut values = IndexMap::new();
    for (expected, actual) in template_segments.iter().zip(path_segments.iter()) {
        match (expected.find('{'), expected.rfind('}')) {
            (Some(open), Some(close)) if open < close => {
                let prefix = &expected[..open];
                let suffix = &expected[close + 1..];
                let name = &expected[open + 1..close];
                let value = actual.strip_prefix(prefix)?.strip_suffix(suffix)?;
                if value.is_empty() {
                    return None;
                }
                values.insert(
                    name.to_string(),
                    percent_decode_str(value).decode_utf8_lossy().into_owned(),
                );
            }
            _ => {
                if expected != actual {
                    return None;
                }
                literal += 1;
            }
        }
    }

    Some((literal, values))
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_end_matches('/');
    trimmed.split('/').skip(1).collect()
}
