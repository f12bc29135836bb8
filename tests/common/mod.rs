#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use notebase::config::{RateLimits, ServerConfig};
use notebase::ratelimit::RateLimitRule;
use notebase::server::{AppState, create_router};
use notebase::store::{SqliteStore, Store};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

/// Router backed by a fresh on-disk store, driven in-process.
pub struct TestApp {
    pub temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.body["fields"]["errors"][field].as_str()
    }

    pub fn field_value(&self, field: &str) -> Option<&str> {
        self.body["fields"]["values"][field].as_str()
    }
}

impl TestApp {
    /// App with limits high enough that failure scenarios never trip them.
    pub fn new() -> Self {
        let relaxed = RateLimitRule::new(1000, 10);
        Self::with_limits(RateLimits {
            login: relaxed,
            signup: relaxed,
            mutation: relaxed,
        })
    }

    pub fn with_limits(rate_limits: RateLimits) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            rate_limits,
            ..ServerConfig::default()
        };

        let store = Arc::new(SqliteStore::new(config.db_path()).expect("open store"));
        store.initialize().expect("initialize store");

        let state = Arc::new(AppState::new(store.clone(), config));
        let router = create_router(state);

        Self {
            temp_dir,
            store,
            router,
        }
    }

    /// Sends a request as `client` (used as the forwarded address).
    pub async fn send(
        &self,
        client: &str,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", client);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("send request");

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        TestResponse { status, body }
    }

    pub async fn get(&self, uri: &str, token: &str) -> TestResponse {
        self.send("10.0.0.1", Method::GET, uri, Some(token), None)
            .await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.send("10.0.0.1", Method::POST, uri, Some(token), Some(body))
            .await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> TestResponse {
        self.send("10.0.0.1", Method::PATCH, uri, Some(token), Some(body))
            .await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> TestResponse {
        self.send("10.0.0.1", Method::DELETE, uri, Some(token), None)
            .await
    }

    /// Signs a user up and returns their session token.
    pub async fn signup(&self, name: &str, email: &str) -> String {
        let resp = self
            .send(
                "10.0.0.1",
                Method::POST,
                "/api/v1/signup",
                None,
                Some(serde_json::json!({
                    "name": name,
                    "email": email,
                    "password": "correct horse",
                })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "signup failed: {}", resp.body);

        resp.data()["token"]
            .as_str()
            .expect("session token")
            .to_string()
    }
}
