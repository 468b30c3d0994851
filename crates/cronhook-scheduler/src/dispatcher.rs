//! Outbound webhook requests.

use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, Request, Response, Url};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use cronhook_config::DispatcherConfig;
use cronhook_core::{parse_header_text, JobDefinition, ResponseSnapshot};

use crate::error::WebhookError;

/// Everything needed to send one webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRequest {
    pub method: String,
    pub endpoint: String,
    pub body: String,
    /// Header mapping as stored, parsed at dispatch time.
    pub headers: String,
}

impl From<&JobDefinition> for WebhookRequest {
    fn from(job: &JobDefinition) -> Self {
        Self {
            method: job.method.clone(),
            endpoint: job.endpoint.clone(),
            body: job.body.clone(),
            headers: job.headers.clone(),
        }
    }
}

/// Sends webhook requests over a shared HTTP client.
pub struct WebhookDispatcher {
    client: Client,
    max_body_bytes: usize,
}

impl WebhookDispatcher {
    /// Create a dispatcher from configuration.
    pub fn new(config: &DispatcherConfig) -> Result<Self, WebhookError> {
        let mut builder = Client::builder().user_agent(config.user_agent.clone());
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let client = builder
            .build()
            .map_err(|e| WebhookError::RequestBuild(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_response_body_bytes,
        })
    }

    /// Send one request and capture the response.
    ///
    /// Any HTTP status counts as a response; classifying it is up to the caller.
    /// Cancelling `cancel` aborts the request, including a body still being read.
    pub async fn dispatch(
        &self,
        request: &WebhookRequest,
        cancel: &CancellationToken,
    ) -> Result<ResponseSnapshot, WebhookError> {
        let headers =
            parse_header_text(&request.headers).map_err(|e| WebhookError::HeaderParse(e.to_string()))?;
        let http_request = self.build_request(request, &headers)?;

        debug!("Dispatching {} {}", http_request.method(), http_request.url());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(WebhookError::Dispatch("request canceled".to_string()));
            }
            result = self.client.execute(http_request) => {
                result.map_err(|e| WebhookError::Dispatch(describe(&e)))?
            }
        };

        self.capture(response, cancel).await
    }

    fn build_request(
        &self,
        request: &WebhookRequest,
        headers: &HashMap<String, String>,
    ) -> Result<Request, WebhookError> {
        let method = Method::from_bytes(request.method.trim().to_uppercase().as_bytes())
            .map_err(|_| WebhookError::RequestBuild(format!("invalid method '{}'", request.method)))?;

        let url = Url::parse(&request.endpoint)
            .map_err(|e| WebhookError::RequestBuild(format!("invalid URL '{}': {e}", request.endpoint)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WebhookError::RequestBuild(format!(
                "unsupported URL scheme '{}'",
                url.scheme()
            )));
        }

        let mut header_map = HeaderMap::new();
        for (key, value) in headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| WebhookError::RequestBuild(format!("invalid header name '{key}'")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| WebhookError::RequestBuild(format!("invalid value for header '{key}'")))?;
            header_map.insert(name, value);
        }

        let mut builder = self.client.request(method, url).headers(header_map);
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        builder
            .build()
            .map_err(|e| WebhookError::RequestBuild(e.to_string()))
    }

    async fn capture(
        &self,
        mut response: Response,
        cancel: &CancellationToken,
    ) -> Result<ResponseSnapshot, WebhookError> {
        let mut snapshot = ResponseSnapshot::new(response.status().as_u16());

        for name in response.headers().keys() {
            let values: Vec<&str> = response
                .headers()
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            snapshot
                .headers
                .insert(name.as_str().to_string(), values.join(", "));
        }

        let mut body = Vec::new();
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(WebhookError::Dispatch("request canceled".to_string()));
                }
                chunk = response.chunk() => {
                    chunk.map_err(|e| WebhookError::Dispatch(describe(&e)))?
                }
            };

            let Some(chunk) = chunk else { break };
            body.extend_from_slice(&chunk);

            if self.max_body_bytes > 0 && body.len() >= self.max_body_bytes {
                body.truncate(self.max_body_bytes);
                break;
            }
        }

        snapshot.body = String::from_utf8_lossy(&body).into_owned();
        Ok(snapshot)
    }
}

/// Flatten a reqwest error and its sources into one line.
fn describe(err: &reqwest::Error) -> String {
    let mut message = if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        "connection failed".to_string()
    } else {
        err.to_string()
    };

    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
