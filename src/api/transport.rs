//! Transport seam between the request layer and the network.
//!
//! `Transport` is the boundary the rest of the client calls through; the
//! production implementation wraps `reqwest`, tests substitute a scripted
//! mock. Keeping the seam this narrow makes the refresh machinery
//! exercisable without a server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use tracing::debug;

use super::ApiError;

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl TransportRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError>;
}

/// Production transport backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        if let Some(ref token) = request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.text().await?;

        debug!(status, url = %request.url, "Response received");
        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted transport for exercising the auth machinery without a server.
    //!
    //! Routes are matched by method plus URL suffix; each route holds a queue
    //! of replies consumed in order. A per-route delay keeps a refresh round
    //! in flight long enough for concurrent callers to pile up behind it.

    use std::collections::VecDeque;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;

    pub(crate) struct RecordedCall {
        pub method: Method,
        pub url: String,
        pub bearer: Option<String>,
    }

    enum Reply {
        Json(u16, serde_json::Value),
        Text(u16, String),
        Unreachable,
    }

    struct Route {
        method: Method,
        path: String,
        replies: VecDeque<Reply>,
        delay_ms: u64,
    }

    #[derive(Default)]
    pub(crate) struct MockTransport {
        routes: Mutex<Vec<Route>>,
        calls: Mutex<Vec<RecordedCall>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        fn route_mut<'a>(
            routes: &'a mut Vec<Route>,
            method: &Method,
            path: &str,
        ) -> &'a mut Route {
            if let Some(idx) = routes
                .iter()
                .position(|r| r.method == *method && r.path == path)
            {
                return &mut routes[idx];
            }
            routes.push(Route {
                method: method.clone(),
                path: path.to_string(),
                replies: VecDeque::new(),
                delay_ms: 0,
            });
            routes.last_mut().unwrap()
        }

        pub fn enqueue_json(
            &self,
            method: Method,
            path: &str,
            status: u16,
            body: serde_json::Value,
        ) {
            let mut routes = self.routes.lock();
            Self::route_mut(&mut routes, &method, path)
                .replies
                .push_back(Reply::Json(status, body));
        }

        pub fn enqueue_text(&self, method: Method, path: &str, status: u16, body: &str) {
            let mut routes = self.routes.lock();
            Self::route_mut(&mut routes, &method, path)
                .replies
                .push_back(Reply::Text(status, body.to_string()));
        }

        pub fn enqueue_unreachable(&self, method: Method, path: &str) {
            let mut routes = self.routes.lock();
            Self::route_mut(&mut routes, &method, path)
                .replies
                .push_back(Reply::Unreachable);
        }

        pub fn set_delay(&self, method: Method, path: &str, delay_ms: u64) {
            let mut routes = self.routes.lock();
            Self::route_mut(&mut routes, &method, path).delay_ms = delay_ms;
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().len()
        }

        pub fn calls_to(&self, path: &str) -> usize {
            self.calls
                .lock()
                .iter()
                .filter(|c| c.url.ends_with(path))
                .count()
        }

        /// Bearer tokens sent to a path, in call order.
        pub fn bearers_sent(&self, path: &str) -> Vec<Option<String>> {
            self.calls
                .lock()
                .iter()
                .filter(|c| c.url.ends_with(path))
                .map(|c| c.bearer.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
            let (reply, delay_ms) = {
                let mut routes = self.routes.lock();
                let route = routes
                    .iter_mut()
                    .find(|r| r.method == request.method && request.url.ends_with(&r.path))
                    .unwrap_or_else(|| panic!("no scripted route for {} {}", request.method, request.url));
                let reply = route
                    .replies
                    .pop_front()
                    .unwrap_or_else(|| panic!("no scripted reply left for {}", request.url));
                (reply, route.delay_ms)
            };

            self.calls.lock().push(RecordedCall {
                method: request.method,
                url: request.url.clone(),
                bearer: request.bearer,
            });

            if delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match reply {
                Reply::Json(status, body) => Ok(TransportResponse {
                    status,
                    content_type: Some("application/json".to_string()),
                    body: body.to_string(),
                }),
                Reply::Text(status, body) => Ok(TransportResponse {
                    status,
                    content_type: Some("text/plain".to_string()),
                    body,
                }),
                Reply::Unreachable => Err(ApiError::Network("connection refused".to_string())),
            }
        }
    }
}
