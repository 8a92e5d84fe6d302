//! Downstream hooks
//!
//! The engine hands work to two external surfaces: the document
//! processing pipeline (after a resolution publishes an answer document)
//! and the alert channel (when a cluster crosses a boundary). Both have
//! log-only defaults and webhook implementations.

use async_trait::async_trait;
use knowgap_common::config::HooksConfig;
use knowgap_common::errors::{AppError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Submits a published document for chunking and embedding
#[async_trait]
pub trait ProcessingPipeline: Send + Sync {
    async fn submit(&self, tenant_id: Uuid, document_id: Uuid) -> Result<()>;
}

/// Delivers cluster boundary alerts
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn notify(&self, tenant_id: Uuid, cluster_id: Uuid, boundary: u32) -> Result<()>;
}

/// Log-only pipeline used when no endpoint is configured
pub struct TracingPipeline;

#[async_trait]
impl ProcessingPipeline for TracingPipeline {
    async fn submit(&self, tenant_id: Uuid, document_id: Uuid) -> Result<()> {
        tracing::info!(
            tenant_id = %tenant_id,
            document_id = %document_id,
            "Document ready for processing (no pipeline endpoint configured)"
        );
        Ok(())
    }
}

/// Log-only alert channel used when no webhook is configured
pub struct TracingAlertChannel;

#[async_trait]
impl AlertChannel for TracingAlertChannel {
    async fn notify(&self, tenant_id: Uuid, cluster_id: Uuid, boundary: u32) -> Result<()> {
        tracing::info!(
            tenant_id = %tenant_id,
            cluster_id = %cluster_id,
            boundary = boundary,
            "Cluster crossed alert boundary"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct SubmitPayload {
    tenant_id: Uuid,
    document_id: Uuid,
}

/// HTTP pipeline submission
pub struct WebhookPipeline {
    client: reqwest::Client,
    url: String,
}

impl WebhookPipeline {
    pub fn new(url: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }
}

#[async_trait]
impl ProcessingPipeline for WebhookPipeline {
    async fn submit(&self, tenant_id: Uuid, document_id: Uuid) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&SubmitPayload {
                tenant_id,
                document_id,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::PipelineError {
                message: format!("Pipeline submit returned {}", response.status()),
            });
        }

        Ok(())
    }
}

#[derive(Serialize)]
struct AlertPayload {
    tenant_id: Uuid,
    cluster_id: Uuid,
    boundary: u32,
}

/// HTTP alert delivery
pub struct WebhookAlertChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertChannel {
    pub fn new(url: String, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self { client, url }
    }
}

#[async_trait]
impl AlertChannel for WebhookAlertChannel {
    async fn notify(&self, tenant_id: Uuid, cluster_id: Uuid, boundary: u32) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&AlertPayload {
                tenant_id,
                cluster_id,
                boundary,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::AlertError {
                message: format!("Alert webhook returned {}", response.status()),
            });
        }

        Ok(())
    }
}

/// Pipeline from config: webhook when a URL is set, log-only otherwise
pub fn create_pipeline(config: &HooksConfig) -> Arc<dyn ProcessingPipeline> {
    match &config.pipeline_url {
        Some(url) if !url.is_empty() => {
            Arc::new(WebhookPipeline::new(url.clone(), config.timeout_secs))
        }
        _ => Arc::new(TracingPipeline),
    }
}

/// Alert channel from config: webhook when a URL is set, log-only otherwise
pub fn create_alert_channel(config: &HooksConfig) -> Arc<dyn AlertChannel> {
    match &config.alert_webhook_url {
        Some(url) if !url.is_empty() => {
            Arc::new(WebhookAlertChannel::new(url.clone(), config.timeout_secs))
        }
        _ => Arc::new(TracingAlertChannel),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_hooks_always_succeed() {
        let pipeline = TracingPipeline;
        let alerts = TracingAlertChannel;

        pipeline
            .submit(Uuid::new_v4(), Uuid::new_v4())
            .await
            .unwrap();
        alerts
            .notify(Uuid::new_v4(), Uuid::new_v4(), 5)
            .await
            .unwrap();
    }

    #[test]
    fn test_factories_follow_config() {
        let log_only = HooksConfig::default();
        // Defaults build without a URL, so these are the log-only variants
        create_pipeline(&log_only);
        create_alert_channel(&log_only);

        let configured = HooksConfig {
            pipeline_url: Some("http://pipeline.internal/submit".into()),
            alert_webhook_url: Some("http://alerts.internal/notify".into()),
            timeout_secs: 5,
        };
        create_pipeline(&configured);
        create_alert_channel(&configured);
    }
}
