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

use crate::observability::{RequestContext, ValidationMetrics};
use crate::request::{
    HttpRequest as ValidatedRequest, HttpResponse as ValidatedResponse, OpenApiValidation,
    RequestFlow,
};
use actix_web::{
    body::{BoxBody, MessageBody},
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, HeaderName, HeaderValue},
    http::{StatusCode, Uri},
    web::{Bytes, BytesMut},
    Error, HttpRequest, HttpResponse,
};
use futures_util::{future::LocalBoxFuture, StreamExt};
use serde_json::json;
use std::future::{ready, Ready};
use std::rc::Rc;

/// OpenAPI validation middleware for actix-web.
///
/// Request and response bodies are buffered so both sides can be validated.
/// actix-web still speaks `http` 0.2, so requests and responses are copied
/// into `http` 1 types around [`OpenApiValidation::process_request`] and
/// [`OpenApiValidation::process_response`].
///
/// # example
///
/// ```rust,ignore
/// use actix_web::{web, App, HttpServer, HttpResponse, Result};
/// use openapi_validation::OpenApiValidation;
///
/// async fn create_user() -> Result<HttpResponse> {
///     Ok(HttpResponse::Created().json(serde_json::json!({"status": "created"})))
/// }
///
/// #[actix_web::main]
/// async fn main() -> anyhow::Result<()> {
///     let validation = OpenApiValidation::from_yaml(include_str!("api.yaml"))?;
///
///     HttpServer::new(move || {
///         App::new()
///             .wrap(validation.clone())
///             .route("/api/users", web::post().to(create_user))
///     })
///     .bind("127.0.0.1:8080")?
///     .run()
///     .await?;
///     Ok(())
/// }
/// ```
impl<S, B> Transform<S, ServiceRequest> for OpenApiValidation
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Transform = OpenApiValidationMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(OpenApiValidationMiddleware {
            service: Rc::new(service),
            validation: self.clone(),
        }))
    }
}

pub struct OpenApiValidationMiddleware<S> {
    service: Rc<S>,
    validation: OpenApiValidation,
}

impl<S, B> Service<ServiceRequest> for OpenApiValidationMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let validation = self.validation.clone();

        Box::pin(async move {
            let (http_req, payload) = req.into_parts();
            let body = match read_payload(payload).await {
                Ok(body) => body,
                Err(e) => {
                    let error_req =
                        ServiceRequest::from_parts(http_req, Payload::from(Bytes::new()));
                    return Ok(error_req.error_response(e));
                }
            };

            let request = match to_validated_request(&http_req, body) {
                Ok(request) => request,
                Err(e) => {
                    let response =
                        HttpResponse::BadRequest().body(format!("Invalid request: {e}"));
                    return Ok(ServiceResponse::new(http_req, response));
                }
            };
            let metrics = ValidationMetrics::from_context(&RequestContext::from_request(&request));

            let (http_req, result) = match validation.process_request(request) {
                Ok(RequestFlow::Bypass(request)) => {
                    let res = service.call(rebuild(http_req, request)).await?;
                    metrics.record_success();
                    return Ok(res.map_into_boxed_body());
                }
                Ok(RequestFlow::Respond(response)) => (http_req, Ok(response)),
                Ok(RequestFlow::Forward { request, exchange }) => {
                    let (http_req, res) = service
                        .call(rebuild(http_req, request))
                        .await?
                        .into_parts();
                    match buffer(res).await {
                        Ok(response) => {
                            let result = validation.process_response(&exchange, response);
                            (http_req, result)
                        }
                        Err(e) => {
                            let response = HttpResponse::from_error(e);
                            return Ok(ServiceResponse::new(http_req, response));
                        }
                    }
                }
                Err(e) => (http_req, Err(e)),
            };

            metrics.record(&result);
            let response = match result {
                Ok(response) => from_validated_response(response),
                Err(e) => failure(&e),
            };
            Ok(ServiceResponse::new(http_req, response))
        })
    }
}

async fn read_payload(mut payload: Payload) -> Result<Bytes, Error> {
    let mut body = BytesMut::new();

    while let Some(chunk_result) = payload.next().await {
        let chunk = chunk_result.map_err(|e| {
            actix_web::error::ErrorBadRequest(format!("Error reading request chunk: {e}"))
        })?;

        body.extend_from_slice(&chunk);
    }

    Ok(body.freeze())
}

fn to_validated_request(req: &HttpRequest, body: Bytes) -> Result<ValidatedRequest, http::Error> {
    let mut builder = http::Request::builder()
        .method(req.method().as_str())
        .uri(req.uri().to_string());
    for (name, value) in req.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    builder.body(body)
}

/// Hands the (possibly rewritten) request back to actix-web.
fn rebuild(http_req: HttpRequest, request: ValidatedRequest) -> ServiceRequest {
    let (parts, body) = request.into_parts();
    let mut service_req = ServiceRequest::from_parts(http_req, Payload::from(body));

    let uri = parts.uri.to_string();
    if service_req.uri().to_string() != uri {
        match uri.parse::<Uri>() {
            Ok(uri) => {
                service_req.match_info_mut().get_mut().update(&uri);
                service_req.head_mut().uri = uri;
            }
            Err(e) => log::warn!("could not rewrite request uri {uri}: {e}"),
        }
    }

    let headers = actix_headers(&parts.headers);
    if !same_headers(&headers, service_req.headers()) {
        service_req.head_mut().headers = headers;
    }
    service_req
}

fn actix_headers(headers: &http::HeaderMap) -> HeaderMap {
    let mut converted = HeaderMap::new();
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            converted.append(name, value);
        }
    }
    converted
}

fn same_headers(left: &HeaderMap, right: &HeaderMap) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .all(|(name, value)| right.get_all(name).any(|other| other == value))
}

async fn buffer<B: MessageBody>(res: HttpResponse<B>) -> Result<ValidatedResponse, Error> {
    let mut builder = http::Response::builder().status(res.status().as_u16());
    for (name, value) in res.headers() {
        builder = builder.header(name.as_str(), value.as_bytes());
    }
    let body = actix_web::body::to_bytes(res.into_body())
        .await
        .map_err(|e| {
            let e: Box<dyn std::error::Error> = e.into();
            actix_web::error::ErrorInternalServerError(format!("Error reading response body: {e}"))
        })?;
    builder
        .body(body)
        .map_err(actix_web::error::ErrorInternalServerError)
}

fn from_validated_response(response: ValidatedResponse) -> HttpResponse {
    let (parts, body) = response.into_parts();
    let status =
        StatusCode::from_u16(parts.status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let mut builder = HttpResponse::build(status);
    for (name, value) in &parts.headers {
        if *name == http::header::CONTENT_LENGTH {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.append_header((name, value));
        }
    }
    builder.body(body)
}

fn failure(error: &crate::Error) -> HttpResponse {
    log::error!("OpenAPI validation failed: {error}");
    let status = StatusCode::from_u16(error.status_code().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(json!({"message": error.to_string()}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse::OpenAPI;
    use crate::Options;
    use actix_web::{
        test::{self, TestRequest},
        web, App,
    };
    use serde_json::Value;

    const CONTENT: &str = r#"
openapi: 3.0.3
info:
  title: Users API
  version: '1.0.0'
paths:
  /users/{id}:
    get:
      parameters:
        - name: id
          in: path
          required: true
          schema:
            type: integer
      responses:
        '200':
          description: A user
          content:
            application/json:
              schema:
                type: object
                properties:
                  id:
                    type: integer
                  name:
                    type: string
  /users:
    post:
      requestBody:
        required: true
        content:
          application/json:
            schema:
              type: object
              required: [name]
              properties:
                name:
                  type: string
      responses:
        '201':
          description: Created
  /search:
    get:
      parameters:
        - name: limit
          in: query
          schema:
            type: integer
            default: 10
      responses:
        '200':
          description: Echoes the query string
"#;

    async fn get_user() -> HttpResponse {
        HttpResponse::Ok().json(json!({"id": 1, "name": "ann", "internal": true}))
    }

    async fn create_user() -> HttpResponse {
        HttpResponse::Created().finish()
    }

    async fn health() -> HttpResponse {
        HttpResponse::Ok().body("ok")
    }

    async fn search(req: HttpRequest) -> HttpResponse {
        HttpResponse::Ok().body(req.query_string().to_string())
    }

    fn validation(options: Options) -> OpenApiValidation {
        OpenApiValidation::new(OpenAPI::yaml(CONTENT).unwrap(), options).unwrap()
    }

    macro_rules! app {
        ($options:expr) => {
            test::init_service(
                App::new()
                    .wrap(validation($options))
                    .route("/users/{id}", web::get().to(get_user))
                    .route("/users", web::post().to(create_user))
                    .route("/search", web::get().to(search))
                    .route("/health", web::get().to(health)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_valid_request_and_stripped_response() {
        let app = app!(Options {
            strip_response: true,
            ..Options::default()
        });

        let req = TestRequest::get().uri("/users/1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({"id": 1, "name": "ann"}));
    }

    #[actix_web::test]
    async fn test_invalid_path_parameter() {
        let app = app!(Options::default());

        let req = TestRequest::get().uri("/users/abc").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Request validation failed");
        assert_eq!(body["errors"][0]["name"], "id");
        assert_eq!(body["errors"][0]["in"], "path");
    }

    #[actix_web::test]
    async fn test_post_request() {
        let app = app!(Options::default());

        let req = TestRequest::post()
            .uri("/users")
            .set_json(json!({"name": "ann"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = TestRequest::post()
            .uri("/users")
            .set_json(json!({"name": 7}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"][0]["name"], "name");

        let req = TestRequest::post()
            .uri("/users")
            .insert_header(("content-type", "application/json"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["errors"][0]["name"], "requestBody");
    }

    #[actix_web::test]
    async fn test_default_query_parameter_reaches_handler() {
        let app = app!(Options {
            set_default_parameters: true,
            ..Options::default()
        });

        let req = TestRequest::get().uri("/search").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"limit=10"));

        let req = TestRequest::get().uri("/search?limit=5").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(test::read_body(resp).await, Bytes::from_static(b"limit=5"));
    }

    #[actix_web::test]
    async fn test_unknown_path() {
        let app = app!(Options::default());

        let req = TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "no operation matches GET /health");

        let app = app!(Options {
            path_not_found_exception: false,
            ..Options::default()
        });
        let req = TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
