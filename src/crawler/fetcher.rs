//! HTTP fetcher implementation
//!
//! This module is the only place that talks to the network:
//! - Building the HTTP client with a proper user agent string
//! - GET requests returning the body as text
//! - Classifying failures into transport errors the throttler can retry

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Why a single request attempt failed
///
/// Cloneable so one failure can be handed to every waiting caller when the
/// throttler gives up on the run.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The server answered with a non-2xx status
    #[error("HTTP {status}")]
    Status { status: u16, body: String },

    /// No usable response (connection refused, timeout, broken body, ...)
    #[error("{0}")]
    Request(String),

    /// The request queue shut down before the request ran
    #[error("request queue closed")]
    Closed,
}

impl TransportError {
    /// What a raw dump of this failure contains
    pub fn dump_body(&self) -> String {
        match self {
            Self::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}

/// Fetch primitive used beneath the throttler
///
/// Implementations perform exactly one attempt; retrying and pacing are the
/// throttler's job.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// GETs `url` and returns the response body
    async fn get(&self, url: &str) -> Result<String, TransportError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use ff_scrape::config::UserAgentConfig;
/// use ff_scrape::crawler::build_http_client;
///
/// let client = build_http_client(&UserAgentConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// `Fetch` over a reqwest client
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds the client from user agent settings
    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, url: &str) -> Result<String, TransportError> {
        let response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status();

        let body = response.text().await.map_err(classify)?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Request("Request timeout".to_string())
    } else if error.is_connect() {
        TransportError::Request(format!("Connection failed: {}", error))
    } else {
        TransportError::Request(error.to_string())
    }
}
