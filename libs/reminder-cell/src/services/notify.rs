use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};
use uuid::Uuid;

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification gateway unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Notification gateway error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// The device-notification scheduler and push dispatcher, as one external
/// collaborator. Scheduling is cancel-by-id: the numeric id is the only
/// handle we keep.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn schedule(
        &self,
        id: i64,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<(), NotifyError>;

    async fn cancel(&self, id: i64) -> Result<(), NotifyError>;

    async fn send_to_user(&self, user_id: Uuid, title: &str, body: &str)
        -> Result<(), NotifyError>;
}

pub struct HttpNotificationGateway {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpNotificationGateway {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.notify_gateway_url.clone(),
            token: config.notify_gateway_token.clone(),
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<(), NotifyError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Notification gateway error ({}): {}", status, body);
            return Err(NotifyError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for HttpNotificationGateway {
    async fn schedule(
        &self,
        id: i64,
        title: &str,
        body: &str,
        fire_at: DateTime<Utc>,
    ) -> Result<(), NotifyError> {
        debug!("Scheduling notification {} at {}", id, fire_at);

        let response = self
            .client
            .post(format!("{}/v1/notifications", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({
                "id": id,
                "title": title,
                "body": body,
                "fireAt": fire_at.to_rfc3339(),
            }))
            .send()
            .await?;

        self.check(response).await
    }

    async fn cancel(&self, id: i64) -> Result<(), NotifyError> {
        debug!("Cancelling notification {}", id);

        let response = self
            .client
            .delete(format!("{}/v1/notifications/{}", self.base_url, id))
            .bearer_auth(&self.token)
            .send()
            .await?;

        self.check(response).await
    }

    async fn send_to_user(
        &self,
        user_id: Uuid,
        title: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        debug!("Sending push to user {}", user_id);

        let response = self
            .client
            .post(format!("{}/v1/push", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({
                "userId": user_id,
                "title": title,
                "body": body,
            }))
            .send()
            .await?;

        self.check(response).await
    }
}
