//! Best-effort delivery of inbox entries to registered devices.

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// A single device alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    /// Device token registered on the recipient's profile.
    pub to: String,
    pub title: String,
    pub body: String,
    /// Extra payload handed to the app when the alert is opened.
    pub data: PushData,
}

/// App-side payload of a [`PushMessage`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ride_id: Option<Uuid>,
    pub notification_id: Uuid,
}

/// Failures of a push relay call.
#[derive(Debug, Error)]
pub enum PushError {
    /// Relay is switched off in configuration.
    #[error("push relay disabled")]
    Disabled,
    /// The HTTP request to the relay failed.
    #[cfg(feature = "push-relay")]
    #[error("failed to reach push relay at `{endpoint}`")]
    Send {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// The relay answered but refused the message.
    #[error("push relay rejected message: {0}")]
    Rejected(String),
}

/// Device channel used by the notification dispatcher.
pub trait PushGateway: Send + Sync {
    fn deliver(&self, message: PushMessage) -> BoxFuture<'static, Result<(), PushError>>;
}

/// Gateway used when push is disabled; every delivery reports [`PushError::Disabled`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledPushGateway;

impl PushGateway for DisabledPushGateway {
    fn deliver(&self, _message: PushMessage) -> BoxFuture<'static, Result<(), PushError>> {
        Box::pin(async { Err(PushError::Disabled) })
    }
}

#[cfg(feature = "push-relay")]
pub use self::expo::ExpoPushGateway;

#[cfg(feature = "push-relay")]
mod expo {
    use std::sync::Arc;

    use futures::future::BoxFuture;
    use reqwest::Client;
    use serde::Deserialize;
    use tracing::debug;

    use super::{PushError, PushGateway, PushMessage};

    /// Relay speaking the Expo push HTTP API.
    #[derive(Clone)]
    pub struct ExpoPushGateway {
        client: Client,
        endpoint: Arc<str>,
    }

    #[derive(Deserialize)]
    struct TicketResponse {
        data: Ticket,
    }

    #[derive(Deserialize)]
    struct Ticket {
        status: String,
        #[serde(default)]
        message: Option<String>,
    }

    impl ExpoPushGateway {
        /// Gateway posting to `endpoint`.
        pub fn new(endpoint: impl Into<Arc<str>>) -> Self {
            Self {
                client: Client::new(),
                endpoint: endpoint.into(),
            }
        }

        async fn send(&self, message: PushMessage) -> Result<(), PushError> {
            let send_err = |source| PushError::Send {
                endpoint: self.endpoint.to_string(),
                source,
            };
            let response = self
                .client
                .post(self.endpoint.as_ref())
                .json(&message)
                .send()
                .await
                .and_then(|response| response.error_for_status())
                .map_err(send_err)?;
            let ticket: TicketResponse = response.json().await.map_err(send_err)?;

            if ticket.data.status == "error" {
                return Err(PushError::Rejected(
                    ticket
                        .data
                        .message
                        .unwrap_or_else(|| "unspecified error".into()),
                ));
            }
            debug!(to = %message.to, "push delivered to relay");
            Ok(())
        }
    }

    impl PushGateway for ExpoPushGateway {
        fn deliver(&self, message: PushMessage) -> BoxFuture<'static, Result<(), PushError>> {
            let gateway = self.clone();
            Box::pin(async move { gateway.send(message).await })
        }
    }
}
