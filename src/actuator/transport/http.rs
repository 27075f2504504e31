//! HTTP transport
//!
//! POSTs the JSON payload to a fixed URL, topic in the `X-Topic` header.

use super::{Transport, TransportError};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

const TOPIC_HEADER: &str = "X-Topic";

pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> std::result::Result<(), TransportError> {
        let resp = self
            .client
            .post(&self.url)
            .header(TOPIC_HEADER, topic)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Publish(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(TransportError::Publish(format!(
                "endpoint returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}
