use std::net::IpAddr;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::NotifyError;

/// Outbound channel for origin-anomaly alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, identity: Uuid, offending_address: IpAddr) -> Result<(), NotifyError>;
}

/// Posts anomaly alerts to the notification service, which resolves the
/// identity's contact address and delivers the warning.
#[derive(Clone)]
pub struct AlertClient {
    http_client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
pub struct AnomalyAlert {
    identity: Uuid,
    offending_address: IpAddr,
    subject: String,
    body: String,
}

impl AnomalyAlert {
    pub fn new(identity: Uuid, offending_address: IpAddr) -> Self {
        Self {
            identity,
            offending_address,
            subject: "Sign-in attempt from a new address".to_string(),
            body: format!(
                "Someone tried to sign in to your account from {}. \
                 If this was not you, contact support.",
                offending_address
            ),
        }
    }
}

impl AlertClient {
    pub fn new(base_url: String, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            base_url,
        }
    }

    pub async fn send_alert(&self, alert: &AnomalyAlert) -> Result<(), NotifyError> {
        let url = format!("{}/alerts", self.base_url.trim_end_matches('/'));

        self.http_client
            .post(&url)
            .json(alert)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout
                } else {
                    NotifyError::SendFailed(e.to_string())
                }
            })?
            .error_for_status()
            .map_err(|e| NotifyError::Rejected(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl Notifier for AlertClient {
    async fn notify(&self, identity: Uuid, offending_address: IpAddr) -> Result<(), NotifyError> {
        self.send_alert(&AnomalyAlert::new(identity, offending_address)).await
    }
}
