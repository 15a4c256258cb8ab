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

use crate::model::parse::{MediaType, Method, OpenAPI};
use crate::request::HttpResponse;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde_json::{Map, Value};

/// Builds a response from the first response declared for the operation.
///
/// The media type is the request's when the response declares it, else the
/// response's first one. Object examples are overlaid with the members of an
/// object request body.
pub fn example_response(
    openapi: &OpenAPI,
    template: &str,
    method: &Method,
    request_media_type: Option<&str>,
    request_body: Option<&Value>,
) -> Option<HttpResponse> {
    let found = openapi.response(template, method, None)?;

    let media_type = request_media_type
        .filter(|media| found.response.content.contains_key(*media))
        .or_else(|| found.response.default_media_type())
        .unwrap_or("application/json")
        .to_string();

    let mut example = found
        .response
        .content
        .get(&media_type)
        .and_then(|media| media_example(openapi, media))
        .unwrap_or_else(|| Value::Object(Map::new()));
    if let (Value::Object(example), Some(Value::Object(body))) = (&mut example, request_body) {
        for (name, value) in body {
            example.insert(name.clone(), value.clone());
        }
    }

    let status = found
        .status_code
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);
    let content_type = HeaderValue::from_str(&format!("{media_type};charset=utf-8")).ok()?;
    let body = match serde_json::to_vec(&example) {
        Ok(body) => body,
        Err(e) => {
            log::error!("failed to encode example response: {e}");
            return None;
        }
    };

    let mut response = HttpResponse::new(Bytes::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    Some(response)
}

/// `example`, then the first of `examples`, then the schema's `example`.
fn media_example(openapi: &OpenAPI, media: &MediaType) -> Option<Value> {
    if let Some(example) = &media.example {
        return Some(example.clone());
    }
    if let Some((_, example)) = media.examples.first() {
        if let Some(value) = openapi.example(example).and_then(|e| e.value) {
            return Some(value);
        }
    }
    media.schema.as_ref()?.get("example").cloned()
}
