//! HTTP transport
//!
//! Sends JSON envelopes to `<api_url><path>` with `Authorization: APIToken`.
//! Network failures, HTTP 429 and 5xx answers are retried with exponential
//! backoff; any other failure is returned at once. Dropping the returned
//! future aborts an in-progress wait.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;

use xcform_core::descriptor::ResourceDescriptor;
use xcform_core::envelope::Envelope;
use xcform_core::transport::{
    ClientTransport, TransportError, TransportErrorKind, TransportResult,
};

use crate::config::{ClientConfig, ConfigError};

/// Longest response body quoted in an error message
const MAX_ERROR_BODY_LENGTH: usize = 200;

/// Error body returned by the API
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Shorten a response body before it is quoted
fn sanitize_body(body: &str) -> String {
    let cleaned: String = body
        .chars()
        .filter(|c| c.is_ascii_graphic() || *c == ' ')
        .collect();
    if cleaned.len() > MAX_ERROR_BODY_LENGTH {
        format!(
            "{}... [truncated, {} bytes total]",
            &cleaned[..MAX_ERROR_BODY_LENGTH],
            body.len()
        )
    } else {
        cleaned
    }
}

/// Message of a failed call: the API's `message` when present, else the body
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ApiErrorBody>(body)
        && let Some(message) = parsed.message.filter(|m| !m.is_empty())
    {
        return match parsed.code {
            Some(code) => format!("{} (code {})", message, code),
            None => message,
        };
    }
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        sanitize_body(body)
    }
}

fn request_error(error: reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else {
        TransportErrorKind::Network
    };
    TransportError::new(kind, error.to_string())
}

/// [`ClientTransport`] over HTTPS
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    config: ClientConfig,
}

impl HttpTransport {
    pub fn new(config: ClientConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url, path)
    }

    /// Send one request, retrying transient failures; returns the body text
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Envelope>,
    ) -> TransportResult<String> {
        let payload = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| TransportError::new(TransportErrorKind::Decode, e.to_string()))?;
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            log::debug!("{} {} (attempt {})", method, path, attempt + 1);
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("APIToken {}", self.config.api_token))
                .header("Accept", "application/json");
            if let Some(payload) = &payload {
                request = request
                    .header("Content-Type", "application/json")
                    .body(payload.clone());
            }

            let (error, wait) = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.map_err(request_error)?;
                    if status.is_success() {
                        return Ok(text);
                    }
                    let error = TransportError::from_status(status.as_u16(), error_message(status, &text));
                    let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                        self.config.rate_limit_delay
                    } else {
                        self.config.backoff_delay(attempt)
                    };
                    (error, wait)
                }
                Err(e) => (request_error(e), self.config.backoff_delay(attempt)),
            };

            if !error.kind.is_retryable() || attempt >= self.config.max_retries {
                return Err(error);
            }
            log::warn!(
                "{} {} failed: {}; retrying in {:?}",
                method,
                path,
                error,
                wait
            );
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    }

    fn decode(path: &str, text: &str) -> TransportResult<Envelope> {
        serde_json::from_str(text).map_err(|e| {
            TransportError::new(
                TransportErrorKind::Decode,
                format!("invalid response from {}: {}", path, e),
            )
        })
    }

    /// Decode a write response, re-reading the object when the body is empty
    async fn written(
        &self,
        descriptor: &ResourceDescriptor,
        envelope: &Envelope,
        text: String,
    ) -> TransportResult<Envelope> {
        if text.trim().is_empty() || text.trim() == "{}" {
            let meta = &envelope.metadata;
            return self.get(descriptor, &meta.namespace, &meta.name).await;
        }
        let path = descriptor.item_path(&envelope.metadata.namespace, &envelope.metadata.name);
        Self::decode(&path, &text)
    }
}

#[async_trait]
impl ClientTransport for HttpTransport {
    async fn get(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
    ) -> TransportResult<Envelope> {
        let path = descriptor.item_path(namespace, name);
        let text = self.send(Method::GET, &path, None).await?;
        Self::decode(&path, &text)
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        envelope: &Envelope,
    ) -> TransportResult<Envelope> {
        let path = descriptor.collection_path(&envelope.metadata.namespace);
        let text = self.send(Method::POST, &path, Some(envelope)).await?;
        self.written(descriptor, envelope, text).await
    }

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        envelope: &Envelope,
    ) -> TransportResult<Envelope> {
        let path = descriptor.item_path(&envelope.metadata.namespace, &envelope.metadata.name);
        let text = self.send(Method::PUT, &path, Some(envelope)).await?;
        self.written(descriptor, envelope, text).await
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: &str,
        name: &str,
    ) -> TransportResult<()> {
        let path = descriptor.item_path(namespace, name);
        self.send(Method::DELETE, &path, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_message_is_preferred() {
        let body = r#"{"code": 5, "message": "object not found"}"#;
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, body),
            "object not found (code 5)"
        );
    }

    #[test]
    fn empty_body_uses_reason() {
        assert_eq!(
            error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }

    #[test]
    fn long_body_is_truncated() {
        let body = "x".repeat(1000);
        let message = error_message(StatusCode::BAD_GATEWAY, &body);
        assert!(message.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(message.contains("truncated, 1000 bytes total"));
    }

    #[test]
    fn url_joins_base_and_path() {
        let config = ClientConfig::new("https://acme.console.ves.volterra.io/api", "t").unwrap();
        let transport = HttpTransport::new(config).unwrap();
        assert_eq!(
            transport.url("/api/config/namespaces/ns1/healthchecks"),
            "https://acme.console.ves.volterra.io/api/config/namespaces/ns1/healthchecks"
        );
    }
}
