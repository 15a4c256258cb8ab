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

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::header::CONTENT_TYPE;
    use http::StatusCode;
    use openapi_validation::model::parse::{In, OpenAPI, RefOr};
    use openapi_validation::{
        Error, HttpRequest, HttpResponse, OpenApiValidation, Options, SecurityKind,
    };
    use serde_json::{json, Value};
    use std::env;

    const TESTAPI: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/testapi.yaml");

    fn validation(options: Options) -> OpenApiValidation {
        OpenApiValidation::from_file(TESTAPI, options).unwrap()
    }

    fn get(uri: &str) -> HttpRequest {
        http::Request::get(uri).body(Bytes::new()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> HttpRequest {
        http::Request::post(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    fn ok() -> HttpResponse {
        HttpResponse::new(Bytes::new())
    }

    fn json_response(body: Value) -> HttpResponse {
        http::Response::builder()
            .header(CONTENT_TYPE, "application/json")
            .body(Bytes::from(body.to_string()))
            .unwrap()
    }

    fn errors(response: &HttpResponse) -> Value {
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        body["errors"].clone()
    }

    #[test]
    fn parse_testapi() -> Result<(), Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(env::current_dir()?.join("tests/testapi.yaml"))?;
        let openapi = OpenAPI::yaml(&content)?;

        assert_eq!(openapi.openapi, "3.0.3");
        assert_eq!(openapi.info.title, "Test API");
        assert_eq!(openapi.servers[0].url, "http://localhost/api");

        let operation = openapi.paths["/parameters"]
            .get
            .as_ref()
            .ok_or("Missing GET /parameters")?;
        assert_eq!(operation.parameters.len(), 7);
        let RefOr::Item(first) = &operation.parameters[0] else {
            return Err("Unexpected parameter reference".into());
        };
        assert_eq!(first.name, "id");
        assert_eq!(first.r#in, In::Query);
        assert!(first.required);

        let components = openapi.components.as_ref().ok_or("Missing components")?;
        assert_eq!(components.schemas["Pet"]["required"], json!(["name"]));
        assert!(components.security_schemes.contains_key("apiKey"));
        Ok(())
    }

    #[test]
    fn parse_json_document() -> Result<(), Box<dyn std::error::Error>> {
        let content = r#"{
            "openapi": "3.1.0",
            "info": {"title": "Example API", "version": "0.0.1"},
            "paths": {
                "/example": {"get": {"responses": {"200": {"description": "ok"}}}}
            }
        }"#;
        let openapi = OpenAPI::json(content)?;
        assert_eq!(openapi.info.version, "0.0.1");
        assert!(openapi.paths["/example"].get.is_some());
        Ok(())
    }

    #[test]
    fn test_query_parameters() {
        let validation = validation(Options::default());

        let response = validation
            .handle(get("/parameters?id=1&active=TRUE"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = validation.handle(get("/parameters"), |_| ok()).unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            errors(&response),
            json!([{"name": "id", "code": "error_required", "in": "query"}])
        );

        let response = validation
            .handle(get("/parameters?id=abc&active=yes"), |_| ok())
            .unwrap();
        let errors = errors(&response);
        assert_eq!(errors[0]["name"], "id");
        assert_eq!(errors[0]["code"], "error_type");
        assert_eq!(errors[0]["expected"], "integer");
        assert_eq!(errors[0]["used"], "string");
        assert_eq!(errors[1]["name"], "active");
        assert_eq!(errors[1]["code"], "error_type");
    }

    #[test]
    fn test_style_and_explode() {
        let validation = validation(Options::default());

        let response = validation
            .handle(get("/parameters?id=1&ids=a,b&tags=a%7Cb"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = validation
            .handle(get("/parameters?id=1&tags=a%7Cc"), |_| ok())
            .unwrap();
        let found = errors(&response);
        assert_eq!(found[0]["name"], "tags.1");
        assert_eq!(found[0]["code"], "error_enum");
        assert_eq!(found[0]["value"], "c");

        let response = validation
            .handle(
                get("/parameters?id=1&filter%5Bids%5D%5B0%5D=1&filter%5Bids%5D%5B1%5D=aaa"),
                |_| ok(),
            )
            .unwrap();
        assert_eq!(
            errors(&response),
            json!([{
                "name": "filter.ids.1",
                "code": "error_type",
                "in": "query",
                "expected": "integer",
                "used": "string",
                "type": "string",
                "value": "aaa"
            }])
        );
    }

    #[test]
    fn test_header_and_cookie_parameters() {
        let validation = validation(Options::default());
        let request = http::Request::get("/parameters?id=1")
            .header("X-Request-Id", "not-a-uuid")
            .header("Cookie", "theme=dark; session=ab")
            .body(Bytes::new())
            .unwrap();

        let response = validation.handle(request, |_| ok()).unwrap();
        let errors = errors(&response);
        assert_eq!(errors[0]["name"], "X-Request-Id");
        assert_eq!(errors[0]["code"], "error_format");
        assert_eq!(errors[0]["in"], "header");
        assert_eq!(errors[1]["name"], "session");
        assert_eq!(errors[1]["code"], "error_minLength");
        assert_eq!(errors[1]["in"], "cookie");
        assert_eq!(errors[1]["expected"], 3);
    }

    #[test]
    fn test_path_parameters() {
        let validation = validation(Options::default());

        let response = validation.handle(get("/path/1/path/x"), |_| ok()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = validation.handle(get("/path/a/path/z"), |_| ok()).unwrap();
        let errors = errors(&response);
        assert_eq!(errors[0]["name"], "a");
        assert_eq!(errors[0]["code"], "error_type");
        assert_eq!(errors[1]["name"], "b");
        assert_eq!(errors[1]["code"], "error_enum");
        assert_eq!(errors[1]["expected"], json!(["x", "y"]));
    }

    #[test]
    fn test_server_prefix() {
        let response = validation(Options::default())
            .handle(get("/api/parameters?id=1"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_formats() {
        let validation = validation(Options::default());

        let response = validation
            .handle(
                get("/formats?email=user@example.com&date=2024-02-29&secret=x"),
                |_| ok(),
            )
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = validation
            .handle(get("/formats?email=user.example.com&date=2023-02-29"), |_| {
                ok()
            })
            .unwrap();
        let errors = errors(&response);
        assert_eq!(errors[0]["name"], "email");
        assert_eq!(errors[0]["format"], "email");
        assert_eq!(errors[1]["name"], "date");
        assert_eq!(errors[1]["format"], "date");
    }

    #[test]
    fn test_request_body() {
        let validation = validation(Options::default());

        let pet = r#"{"name": "rex", "age": 3, "tags": ["good"]}"#;
        let response = validation
            .handle(post_json("/request/body", pet), |request| {
                json_response(serde_json::from_slice(request.body()).unwrap())
            })
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = validation
            .handle(
                post_json("/request/body", r#"{"name": "rex", "age": -1, "tags": "good"}"#),
                |_| ok(),
            )
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let errors = errors(&response);
        assert_eq!(
            errors[0],
            json!({"name": "age", "code": "error_minimum", "in": "body", "expected": 0, "value": -1})
        );
        assert_eq!(errors[1]["name"], "tags");
        assert_eq!(errors[1]["expected"], "array");

        let response = validation
            .handle(post_json("/request/body/empty", ""), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_all_of() {
        let response = validation(Options::default())
            .handle(post_json("/all/of", r#"{"a": "x"}"#), |_| ok())
            .unwrap();
        assert_eq!(
            errors(&response),
            json!([{"name": "b", "code": "error_required", "in": "body"}])
        );

        let options = Options {
            strip_response: true,
            ..Options::default()
        };
        let response = validation(options)
            .handle(post_json("/all/of", r#"{"a": "x", "b": 1}"#), |_| {
                json_response(json!({"a": "x", "b": 1, "c": true}))
            })
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"a": "x", "b": 1, "c": true}));
    }

    #[test]
    fn test_additional_properties() {
        let response = validation(Options::default())
            .handle(get("/additionalProperties"), |_| {
                json_response(json!({"id": 1, "x": 2}))
            })
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let errors = errors(&response);
        assert_eq!(errors[0]["code"], "error_additionalProperties");
        assert_eq!(errors[0]["properties"], json!(["x"]));

        let options = Options {
            strip_response: true,
            ..Options::default()
        };
        let response = validation(options)
            .handle(get("/additionalProperties"), |_| {
                json_response(json!({"id": 1, "x": 2}))
            })
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), &Bytes::from_static(br#"{"id":1}"#));
    }

    #[test]
    fn test_nullable() {
        let response = validation(Options::default())
            .handle(get("/nullable"), |_| json_response(json!({"name": null})))
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_response_example() {
        let options = Options {
            example_response: true,
            ..Options::default()
        };
        let response = validation(options)
            .handle(get("/response/example"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body, json!({"name": "rex", "age": 3}));
    }

    #[test]
    fn test_missing_header() {
        let options = Options {
            validate_response_headers: true,
            ..Options::default()
        };
        let response = validation(options)
            .handle(get("/missing/header"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            errors(&response),
            json!([{"name": "X-Total", "code": "error_required", "in": "header"}])
        );
    }

    #[test]
    fn test_missing_format() {
        let result = validation(Options::default()).handle(get("/missing/format?id=1"), |_| ok());
        assert!(matches!(result, Err(Error::MissingFormat { .. })));

        let options = Options {
            missing_format_exception: false,
            ..Options::default()
        };
        let response = validation(options)
            .handle(get("/missing/format?id=1"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_security() {
        let openapi = OpenAPI::yaml(&std::fs::read_to_string(TESTAPI).unwrap()).unwrap();
        let validation = OpenApiValidation::builder(openapi)
            .security_handler(
                |_: &HttpRequest, kind: SecurityKind, credential: &str, _: &[String]| {
                    if kind == SecurityKind::ApiKey && credential == "secret" {
                        return None;
                    }
                    let mut response = HttpResponse::new(Bytes::from_static(b"forbidden"));
                    *response.status_mut() = StatusCode::FORBIDDEN;
                    Some(response)
                },
            )
            .build()
            .unwrap();

        let request = http::Request::get("/secured")
            .header("X-API-Key", "secret")
            .body(Bytes::new())
            .unwrap();
        let response = validation.handle(request, |_| ok()).unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = validation.handle(get("/secured"), |_| ok()).unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_options_file() {
        let options = Options::from_yaml(
            r#"
additionalParameters: true
pathNotFoundException: false
"#,
        )
        .unwrap();
        let validation = validation(options);

        let response = validation
            .handle(get("/parameters?id=1&unknown=x"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = validation
            .handle(get("/not/declared"), |_| ok())
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
