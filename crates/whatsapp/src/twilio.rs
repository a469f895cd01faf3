use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use threadline_core::config::GatewayConfig;

use crate::chunk::{split_message, MAX_MESSAGE_CHARS};
use crate::webhook::channel_address;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway client could not be built: {0}")]
    Client(String),
    #[error("gateway transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("gateway rejected message with status {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_sids: Vec<String>,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Delivers `body` to `to`, splitting it into several messages when it
    /// exceeds the channel limit.
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, GatewayError>;
}

/// Drops every message. Used for dry runs and where no gateway is configured.
#[derive(Clone, Debug, Default)]
pub struct NoopSender;

#[async_trait]
impl MessageSender for NoopSender {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, GatewayError> {
        debug!(
            event_name = "egress.whatsapp.dropped",
            to,
            chars = body.chars().count(),
            "noop sender dropped outbound message"
        );
        Ok(SendReceipt::default())
    }
}

pub struct TwilioClient {
    http: reqwest::Client,
    api_base_url: String,
    account_sid: String,
    auth_token: SecretString,
    from_address: String,
}

#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

impl TwilioClient {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| GatewayError::Client(error.to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.trim().to_string(),
            auth_token: config.auth_token.clone(),
            from_address: channel_address(&config.from_number),
        })
    }

    pub fn messages_url(&self) -> String {
        format!("{}/2010-04-01/Accounts/{}/Messages.json", self.api_base_url, self.account_sid)
    }

    async fn send_one(&self, to_address: &str, body: &str) -> Result<Option<String>, GatewayError> {
        let form = [("From", self.from_address.as_str()), ("To", to_address), ("Body", body)];
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GatewayError::Api { status: status.as_u16(), body: text });
        }

        Ok(serde_json::from_str::<MessageResource>(&text).ok().and_then(|resource| resource.sid))
    }
}

#[async_trait]
impl MessageSender for TwilioClient {
    async fn send_text(&self, to: &str, body: &str) -> Result<SendReceipt, GatewayError> {
        let to_address = channel_address(to);
        let chunks = split_message(body, MAX_MESSAGE_CHARS);
        let mut receipt = SendReceipt::default();

        for (index, chunk) in chunks.iter().enumerate() {
            let sid = self.send_one(&to_address, chunk).await?;
            info!(
                event_name = "egress.whatsapp.sent",
                to = %to_address,
                part = index + 1,
                parts = chunks.len(),
                message_sid = sid.as_deref().unwrap_or("unknown"),
                "sent whatsapp message"
            );
            if let Some(sid) = sid {
                receipt.message_sids.push(sid);
            }
        }

        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use serde_json::json;

    use threadline_core::config::GatewayConfig;

    use super::{GatewayError, MessageSender, NoopSender, TwilioClient};

    type Captured = Arc<Mutex<Vec<HashMap<String, String>>>>;

    fn config(api_base_url: String) -> GatewayConfig {
        GatewayConfig {
            account_sid: "AC123".to_string(),
            auth_token: "secret-token".to_string().into(),
            from_number: "+14155238886".to_string(),
            api_base_url,
            timeout_secs: 5,
        }
    }

    async fn spawn_gateway(status: StatusCode) -> (String, Captured) {
        let captured: Captured = Arc::default();
        let app = Router::new()
            .route(
                "/2010-04-01/Accounts/AC123/Messages.json",
                post(
                    move |State(captured): State<Captured>,
                          Form(fields): Form<HashMap<String, String>>| async move {
                        let mut messages = captured.lock().expect("capture lock");
                        messages.push(fields);
                        let sid = format!("SM{}", messages.len());
                        (status, Json(json!({ "sid": sid, "message": "rejected" })))
                    },
                ),
            )
            .with_state(Arc::clone(&captured));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        (format!("http://{address}"), captured)
    }

    #[test]
    fn messages_url_targets_the_account() {
        let client = TwilioClient::from_config(&config("https://api.twilio.com/".to_string()))
            .expect("client");
        assert_eq!(
            client.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
    }

    #[tokio::test]
    async fn sends_form_with_channel_addresses() {
        let (base_url, captured) = spawn_gateway(StatusCode::CREATED).await;
        let client = TwilioClient::from_config(&config(base_url)).expect("client");

        let receipt =
            client.send_text("+5215550001111", "Your order is confirmed.").await.expect("send");

        assert_eq!(receipt.message_sids, vec!["SM1".to_string()]);
        let messages = captured.lock().expect("capture lock").clone();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["From"], "whatsapp:+14155238886");
        assert_eq!(messages[0]["To"], "whatsapp:+5215550001111");
        assert_eq!(messages[0]["Body"], "Your order is confirmed.");
    }

    #[tokio::test]
    async fn long_replies_are_sent_in_parts() {
        let (base_url, captured) = spawn_gateway(StatusCode::CREATED).await;
        let client = TwilioClient::from_config(&config(base_url)).expect("client");
        let body = "word ".repeat(500);

        let receipt = client.send_text("+15550100", &body).await.expect("send");

        assert_eq!(receipt.message_sids.len(), 2);
        assert_eq!(captured.lock().expect("capture lock").len(), 2);
    }

    #[tokio::test]
    async fn api_errors_surface_status_and_body() {
        let (base_url, _captured) = spawn_gateway(StatusCode::BAD_REQUEST).await;
        let client = TwilioClient::from_config(&config(base_url)).expect("client");

        let error = client.send_text("+15550100", "hi").await.expect_err("should fail");
        assert!(matches!(
            error,
            GatewayError::Api { status: 400, ref body } if body.contains("rejected")
        ));
    }

    #[tokio::test]
    async fn noop_sender_accepts_everything() {
        let receipt = NoopSender.send_text("+15550100", "hi").await.expect("send");
        assert!(receipt.message_sids.is_empty());
    }
}
