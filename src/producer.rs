//! NATS publisher for quote responses

use crate::types::quote::QuoteResponse;
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::debug;

/// Publishes quote responses to a request's reply inbox
#[derive(Clone)]
pub struct ResponseProducer {
    client: Client,
    /// Used when a request arrives without a reply inbox
    fallback_subject: Option<String>,
}

impl ResponseProducer {
    pub fn new(client: Client, fallback_subject: Option<&str>) -> Self {
        Self {
            client,
            fallback_subject: fallback_subject.map(str::to_string),
        }
    }

    /// Where a reply to a request should go, if anywhere
    pub fn reply_target(&self, reply: Option<&Subject>) -> Option<Subject> {
        reply
            .cloned()
            .or_else(|| self.fallback_subject.clone().map(Subject::from))
    }

    /// Publish a response. Returns `false` when there was nowhere to send it.
    pub async fn respond(&self, reply: Option<&Subject>, response: &QuoteResponse) -> Result<bool> {
        let Some(target) = self.reply_target(reply) else {
            return Ok(false);
        };

        let payload = serde_json::to_vec(response)?;
        self.client.publish(target.clone(), payload.into()).await?;

        debug!(
            request_id = %response.request_id,
            subject = %target,
            success = response.outcome.is_success(),
            "Published quote response"
        );

        Ok(true)
    }
}
