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

//! Form bodies: `application/x-www-form-urlencoded` and `multipart/form-data`.

use crate::model::parse::Encoding;
use crate::validator::errors::{ErrorKind, ValidationError};
use crate::validator::property::{coerce_scalar, Location, Property, QueryParams};
use crate::validator::schema;
use bytes::Bytes;
use futures_util::{future, stream, FutureExt};
use indexmap::IndexMap;
use serde_json::Value;
use std::convert::Infallible;

#[derive(Debug, Clone, PartialEq)]
pub struct UploadedFile {
    pub filename: Option<String>,
    /// Content type the client declared for the part.
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Decoded form fields and uploaded files.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    pub fields: IndexMap<String, Value>,
    pub files: IndexMap<String, UploadedFile>,
}

impl FormData {
    /// Decodes `body` according to a `Content-Type` header value. Unknown
    /// media types and malformed multipart bodies give an empty form.
    pub fn parse(content_type: &str, body: &[u8]) -> Self {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match media_type.as_str() {
            "application/x-www-form-urlencoded" => Self {
                fields: QueryParams::parse(&String::from_utf8_lossy(body)).into_map(),
                files: IndexMap::new(),
            },
            "multipart/form-data" => match multer::parse_boundary(content_type) {
                Ok(boundary) => Self::multipart(Bytes::copy_from_slice(body), boundary),
                Err(e) => {
                    log::debug!("multipart body without boundary: {e}");
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// The whole body is already buffered, so the parser never waits on the
    /// stream and a single poll drives it to completion.
    fn multipart(body: Bytes, boundary: String) -> Self {
        let stream = stream::once(future::ready(Ok::<_, Infallible>(body)));
        let multipart = multer::Multipart::new(stream, boundary);
        match Self::read_parts(multipart).now_or_never() {
            Some(Ok(form)) => form,
            Some(Err(e)) => {
                log::debug!("malformed multipart body: {e}");
                Self::default()
            }
            None => Self::default(),
        }
    }

    async fn read_parts(mut multipart: multer::Multipart<'_>) -> multer::Result<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|mime| mime.to_string());
            let data = field.bytes().await?;

            let Some(name) = name else {
                continue;
            };
            if filename.is_some() {
                form.files.insert(
                    name,
                    UploadedFile {
                        filename,
                        content_type,
                        data,
                    },
                );
                continue;
            }

            let value = Value::String(String::from_utf8_lossy(&data).into_owned());
            match form.fields.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None => {
                    form.fields.insert(name, value);
                }
            }
        }
        Ok(form)
    }
}

/// Splits a form schema into checks done here and properties for the
/// validator.
///
/// Properties with format `binary` or `base64` are file uploads: they are
/// checked for presence and against the declared encoding content types.
/// Every other property becomes a `form-data` [`Property`].
pub fn form_properties(
    schema: &Value,
    encoding: &IndexMap<String, Encoding>,
    form: &FormData,
) -> (Vec<ValidationError>, Vec<Property>) {
    let schema = schema::normalize(schema);
    let mut errors = Vec::new();
    let mut properties = Vec::new();

    let Some(declared) = schema.get("properties").and_then(Value::as_object) else {
        return (errors, properties);
    };
    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| names.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, property) in declared {
        let is_required = required.contains(&name.as_str());
        let format = property.get("format").and_then(Value::as_str);

        if matches!(format, Some("binary") | Some("base64")) {
            let Some(file) = form.files.get(name) else {
                if is_required {
                    errors.push(ValidationError::required(name.as_str(), None));
                }
                continue;
            };
            let Some(encoding) = encoding.get(name) else {
                continue;
            };
            let used = file.content_type.clone().unwrap_or_default();
            let expected = encoding.content_types();
            if !expected.is_empty() && !encoding.has_content_type(&used) {
                errors.push(ValidationError::new(
                    name.as_str(),
                    None,
                    ErrorKind::ContentType { expected, used },
                ));
            }
            continue;
        }

        let value = form.fields.get(name).map(|value| match value {
            Value::String(raw) => coerce_scalar(raw, property),
            other => other.clone(),
        });
        properties.push(Property::new(
            name.as_str(),
            Location::FormData,
            is_required,
            property.clone(),
            value,
        ));
    }
    (errors, properties)
}
