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
use crate::observability::{RequestContext, ValidationMetrics};
use crate::request::{HttpRequest, HttpResponse, OpenApiValidation, RequestFlow};
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// OpenAPI validation middleware for axum.
///
/// # example
///
/// ```rust,ignore
/// use axum::{middleware, routing::get, Router};
/// use openapi_validation::request::axum::validate;
/// use openapi_validation::OpenApiValidation;
///
/// let validation = OpenApiValidation::from_yaml(include_str!("api.yaml"))?;
/// let app: Router = Router::new()
///     .route("/api/users", get(list_users))
///     .layer(middleware::from_fn_with_state(validation, validate));
/// ```
pub async fn validate(
    State(validation): State<OpenApiValidation>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Error reading request body: {e}"),
            )
                .into_response()
        }
    };
    let request = HttpRequest::from_parts(parts, body);
    let metrics = ValidationMetrics::from_context(&RequestContext::from_request(&request));

    let result = match validation.process_request(request) {
        Ok(RequestFlow::Bypass(request)) => {
            let response = next.run(request.map(Body::from)).await;
            metrics.record_success();
            return response;
        }
        Ok(RequestFlow::Respond(response)) => Ok(response),
        Ok(RequestFlow::Forward { request, exchange }) => {
            match buffer(next.run(request.map(Body::from)).await).await {
                Ok(response) => validation.process_response(&exchange, response),
                Err(response) => return response,
            }
        }
        Err(e) => Err(e),
    };

    metrics.record(&result);
    match result {
        Ok(response) => response.map(Body::from),
        Err(e) => failure(&e),
    }
}

async fn buffer(response: Response) -> Result<HttpResponse, Response> {
    let (parts, body) = response.into_parts();
    match to_bytes(body, usize::MAX).await {
        Ok(body) => Ok(HttpResponse::from_parts(parts, body)),
        Err(e) => {
            log::error!("failed to read response body: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

fn failure(error: &Error) -> Response {
    log::error!("OpenAPI validation failed: {error}");
    (
        error.status_code(),
        axum::Json(json!({"message": error.to_string()})),
    )
        .into_response()
}
