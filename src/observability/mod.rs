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
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: String,
    pub path: String,
}

impl RequestContext {
    pub fn new(method: String, path: String) -> Self {
        Self { method, path }
    }

    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        Self::new(
            request.method().to_string(),
            request.uri().path().to_string(),
        )
    }
}

/// Times one pipeline run and logs a single line when it completes.
pub struct ValidationMetrics {
    start_time: Instant,
    method: String,
    path: String,
}

impl ValidationMetrics {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            start_time: Instant::now(),
            method: method.to_string(),
            path: path.to_string(),
        }
    }

    pub fn from_context(context: &RequestContext) -> Self {
        Self::new(&context.method, &context.path)
    }

    /// Pipeline errors and 4xx/5xx answers count as failures.
    pub fn record<B>(self, result: &Result<http::Response<B>, Error>) {
        match failure_reason(result) {
            Some(reason) => self.record_failure(reason),
            None => self.record_success(),
        }
    }

    pub fn record_success(self) {
        let duration_ms = self.start_time.elapsed().as_millis();
        let timestamp = chrono::Utc::now().timestamp_millis();

        log::info!(
            "openapi_validation method=\"{}\" path=\"{}\" success=true duration_ms={} timestamp={}",
            self.method,
            self.path,
            duration_ms,
            timestamp
        );
    }

    pub fn record_failure(self, error: String) {
        let duration_ms = self.start_time.elapsed().as_millis();
        let timestamp = chrono::Utc::now().timestamp_millis();

        log::warn!(
            "openapi_validation method=\"{}\" path=\"{}\" success=false duration_ms={} error=\"{}\" timestamp={}",
            self.method,
            self.path,
            duration_ms,
            error,
            timestamp
        );
    }
}

fn failure_reason<B>(result: &Result<http::Response<B>, Error>) -> Option<String> {
    match result {
        Ok(response)
            if response.status().is_client_error() || response.status().is_server_error() =>
        {
            Some(format!("status {}", response.status().as_u16()))
        }
        Ok(_) => None,
        Err(e) => Some(e.to_string()),
    }
}

/// Installs `env_logger` at `info`, overridable through `RUST_LOG`.
pub fn init_logger() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_request_context_from_request() {
        let request = http::Request::post("/users/42?verbose=true")
            .body(Bytes::new())
            .unwrap();
        let context = RequestContext::from_request(&request);
        assert_eq!(context.method, "POST");
        assert_eq!(context.path, "/users/42");
    }

    #[test]
    fn test_failure_reason() {
        let ok: Result<http::Response<Bytes>, Error> = Ok(http::Response::new(Bytes::new()));
        assert_eq!(failure_reason(&ok), None);

        let rejected: Result<http::Response<Bytes>, Error> = http::Response::builder()
            .status(400)
            .body(Bytes::new())
            .map_err(|e| Error::Document(e.to_string()));
        assert_eq!(failure_reason(&rejected).as_deref(), Some("status 400"));

        let redirected: Result<http::Response<Bytes>, Error> = http::Response::builder()
            .status(302)
            .body(Bytes::new())
            .map_err(|e| Error::Document(e.to_string()));
        assert_eq!(failure_reason(&redirected), None);

        let failed: Result<http::Response<Bytes>, Error> = Err(Error::PathNotFound {
            method: "GET".to_string(),
            path: "/missing".to_string(),
        });
        let reason = failure_reason(&failed).unwrap();
        assert!(reason.contains("/missing"));
    }
}
