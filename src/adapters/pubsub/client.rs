//! Google Cloud Pub/Sub REST client
//!
//! Talks to the v1 REST surface (`projects/*/topics/*`, `projects/*/subscriptions/*`).
//! The endpoint is configurable so the same client works against the emulator.

use crate::adapters::pubsub::models::{
    AcknowledgeRequest, MetadataToken, OutgoingMessage, PublishRequest, PublishResponse,
    PullRequest, PullResponse, ReceivedMessage, WireMessage,
};
use crate::adapters::pubsub::traits::MessageBus;
use crate::config::{AuthMode, GoogleConfig, PubSubConfig, RetryConfig, SecretString};
use crate::domain::{BridgeError, MessageBusError, Result};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh a metadata token this long before it expires
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Expands a short name into `projects/{project}/{kind}/{name}`
pub fn resource_path(project_id: &str, kind: &str, name: &str) -> String {
    if name.starts_with("projects/") {
        name.to_string()
    } else {
        format!("projects/{project_id}/{kind}/{name}")
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Pub/Sub client for one topic and one subscription
pub struct PubSubClient {
    http: Client,
    endpoint: String,
    topic: String,
    subscription: String,
    auth: AuthMode,
    static_token: Option<SecretString>,
    metadata_url: String,
    token: Mutex<Option<CachedToken>>,
    retry: RetryConfig,
}

impl PubSubClient {
    /// Creates a client; no request is made until the first call
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(google: &GoogleConfig, pubsub: &PubSubConfig) -> Result<Self> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_secs(google.timeout_seconds))
            .connect_timeout(Duration::from_secs(google.timeout_seconds.min(30)))
            .user_agent(concat!("ckg-bridge/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: google.endpoint.trim_end_matches('/').to_string(),
            topic: resource_path(&google.project_id, "topics", &pubsub.topic),
            subscription: resource_path(&google.project_id, "subscriptions", &pubsub.subscription),
            auth: google.auth,
            static_token: google.access_token.clone(),
            metadata_url: METADATA_TOKEN_URL.to_string(),
            token: Mutex::new(None),
            retry: google.retry.clone(),
        })
    }

    /// Overrides the metadata token URL
    pub fn with_metadata_url(mut self, url: impl Into<String>) -> Self {
        self.metadata_url = url.into();
        self
    }

    fn url(&self, resource: &str, action: Option<&str>) -> String {
        match action {
            Some(action) => format!("{}/{}:{}", self.endpoint, resource, action),
            None => format!("{}/{}", self.endpoint, resource),
        }
    }

    async fn bearer_token(&self) -> Result<Option<String>> {
        match self.auth {
            AuthMode::None => Ok(None),
            AuthMode::Token => Ok(self
                .static_token
                .as_ref()
                .map(|t| t.expose_secret().as_str().to_string())),
            AuthMode::Metadata => {
                let mut cached = self.token.lock().await;
                if let Some(token) = cached.as_ref() {
                    if Instant::now() < token.expires_at {
                        return Ok(Some(token.value.clone()));
                    }
                }
                let fresh = self.fetch_metadata_token().await?;
                let value = fresh.access_token.clone();
                let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
                *cached = Some(CachedToken {
                    value: fresh.access_token,
                    expires_at: Instant::now() + lifetime,
                });
                Ok(Some(value))
            }
        }
    }

    async fn fetch_metadata_token(&self) -> Result<MetadataToken> {
        tracing::debug!("Fetching access token from metadata server");
        let response = self
            .http
            .get(&self.metadata_url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| MessageBusError::AuthenticationFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(MessageBusError::AuthenticationFailed(format!(
                "metadata server returned {status}: {body}"
            ))
            .into());
        }

        response
            .json::<MetadataToken>()
            .await
            .map_err(|e| MessageBusError::AuthenticationFailed(e.to_string()).into())
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match self.bearer_token().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| MessageBusError::ConnectionFailed(e.to_string()))?;
        Ok(response)
    }

    async fn error_from(response: Response) -> BridgeError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                MessageBusError::AuthenticationFailed(format!("{status}: {message}")).into()
            }
            _ => MessageBusError::ServerError {
                status: status.as_u16(),
                message,
            }
            .into(),
        }
    }

    async fn resource_exists(&self, resource: &str) -> Result<bool> {
        let url = self.url(resource, None);
        self.retry_request(|| async {
            let response = self.send(self.http.get(&url)).await?;
            match response.status() {
                status if status.is_success() => Ok(true),
                StatusCode::NOT_FOUND => Ok(false),
                _ => Err(Self::error_from(response).await),
            }
        })
        .await
    }

    /// Retries transient failures with exponential backoff
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries || !is_transient(&e) {
                        return Err(e);
                    }

                    let delay_ms = backoff_delay_ms(&self.retry, attempt);
                    tracing::warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Retrying Pub/Sub request after error"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}

fn is_transient(err: &BridgeError) -> bool {
    match err {
        BridgeError::MessageBus(MessageBusError::ConnectionFailed(_)) => true,
        BridgeError::MessageBus(MessageBusError::ServerError { status, .. }) => {
            *status == 429 || *status >= 500
        }
        _ => false,
    }
}

/// Delay before retry `attempt` (1-based), capped at `max_delay_ms`
pub fn backoff_delay_ms(retry: &RetryConfig, attempt: usize) -> u64 {
    let factor = retry.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
    let delay = (retry.initial_delay_ms as f64 * factor) as u64;
    delay.min(retry.max_delay_ms)
}

#[async_trait]
impl MessageBus for PubSubClient {
    fn topic(&self) -> &str {
        &self.topic
    }

    fn subscription(&self) -> &str {
        &self.subscription
    }

    async fn topic_exists(&self) -> Result<bool> {
        self.resource_exists(&self.topic).await
    }

    async fn subscription_exists(&self) -> Result<bool> {
        self.resource_exists(&self.subscription).await
    }

    async fn publish(&self, message: OutgoingMessage) -> Result<String> {
        let url = self.url(&self.topic, Some("publish"));
        let body = PublishRequest {
            messages: vec![WireMessage::from(message)],
        };

        // Not retried: a retry after a lost response would publish twice
        let response = self
            .send(self.http.post(&url).json(&body))
            .await
            .map_err(|e| match e {
                BridgeError::MessageBus(MessageBusError::ConnectionFailed(msg)) => {
                    MessageBusError::PublishFailed(msg).into()
                }
                other => other,
            })?;
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let published: PublishResponse = response
            .json()
            .await
            .map_err(|e| MessageBusError::InvalidResponse(e.to_string()))?;
        published.message_ids.into_iter().next().ok_or_else(|| {
            MessageBusError::PublishFailed("response carried no message id".to_string()).into()
        })
    }

    async fn pull(&self, max_messages: u32) -> Result<Vec<ReceivedMessage>> {
        let url = self.url(&self.subscription, Some("pull"));
        let body = PullRequest { max_messages };

        let response: PullResponse = self
            .retry_request(|| async {
                let response = self.send(self.http.post(&url).json(&body)).await?;
                if !response.status().is_success() {
                    return Err(Self::error_from(response).await);
                }
                response
                    .json::<PullResponse>()
                    .await
                    .map_err(|e| MessageBusError::PullFailed(e.to_string()).into())
            })
            .await?;

        response
            .received_messages
            .into_iter()
            .map(|m| m.into_message())
            .collect()
    }

    async fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        if ack_ids.is_empty() {
            return Ok(());
        }
        let url = self.url(&self.subscription, Some("acknowledge"));
        let body = AcknowledgeRequest { ack_ids };

        self.retry_request(|| async {
            let response = self.send(self.http.post(&url).json(&body)).await?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(match Self::error_from(response).await {
                    BridgeError::MessageBus(MessageBusError::ServerError { status, message })
                        if status < 500 && status != 429 =>
                    {
                        MessageBusError::AcknowledgeFailed(format!("{status}: {message}")).into()
                    }
                    other => other,
                })
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_path() {
        assert_eq!(
            resource_path("ckg-tb-staging", "topics", "CKG-SITB"),
            "projects/ckg-tb-staging/topics/CKG-SITB"
        );
        assert_eq!(
            resource_path("other", "topics", "projects/p/topics/t"),
            "projects/p/topics/t"
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 100,
            max_delay_ms: 350,
            backoff_multiplier: 2.0,
        };
        assert_eq!(backoff_delay_ms(&retry, 1), 100);
        assert_eq!(backoff_delay_ms(&retry, 2), 200);
        assert_eq!(backoff_delay_ms(&retry, 3), 350);
    }

    #[test]
    fn test_transient_classification() {
        assert!(is_transient(
            &MessageBusError::ServerError {
                status: 503,
                message: String::new()
            }
            .into()
        ));
        assert!(!is_transient(
            &MessageBusError::ServerError {
                status: 400,
                message: String::new()
            }
            .into()
        ));
    }
}
