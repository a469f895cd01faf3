use std::sync::Arc;

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Form, Router};
use tracing::{debug, error, info, warn};

use threadline_agent::{AgentRuntime, TurnOutcome};
use threadline_whatsapp::{InboundMessage, MessageSender, TwilioWebhookForm};

#[derive(Clone)]
pub struct WebhookState {
    pub runtime: Arc<AgentRuntime>,
    pub sender: Arc<dyn MessageSender>,
    pub fallback_reply: Arc<str>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/whatsapp", post(receive)).with_state(state)
}

/// Twilio retries deliveries that do not get a 200, so every request is
/// acknowledged whatever happens to the turn.
pub async fn receive(
    State(state): State<WebhookState>,
    form: Result<Form<TwilioWebhookForm>, FormRejection>,
) -> (StatusCode, &'static str) {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            warn!(
                event_name = "webhook.request.rejected",
                error = %rejection,
                "webhook body could not be parsed"
            );
            return (StatusCode::OK, "OK");
        }
    };

    match InboundMessage::from_form(form) {
        Some(message) => respond(&state, &message).await,
        None => debug!(event_name = "webhook.message.ignored", "message without sender or body"),
    }

    (StatusCode::OK, "OK")
}

async fn respond(state: &WebhookState, message: &InboundMessage) {
    info!(
        event_name = "webhook.message.received",
        correlation_id = message.correlation_id(),
        sender = %message.sender,
        "incoming whatsapp message"
    );

    let Some(reply) = reply_for(state, message).await else {
        return;
    };

    match state.sender.send_text(&message.sender, &reply).await {
        Ok(receipt) => info!(
            event_name = "webhook.reply.sent",
            correlation_id = message.correlation_id(),
            sender = %message.sender,
            parts = receipt.message_sids.len(),
            "reply delivered to gateway"
        ),
        Err(send_error) => error!(
            event_name = "webhook.reply.failed",
            correlation_id = message.correlation_id(),
            sender = %message.sender,
            error = %send_error,
            "reply could not be sent"
        ),
    }
}

async fn reply_for(state: &WebhookState, message: &InboundMessage) -> Option<String> {
    match state.runtime.handle_message(&message.sender, &message.body).await {
        Ok(TurnOutcome::Answered(text)) if !text.trim().is_empty() => Some(text),
        Ok(TurnOutcome::Answered(_)) => {
            warn!(
                event_name = "webhook.turn.empty_answer",
                correlation_id = message.correlation_id(),
                sender = %message.sender,
                "model answered with no text, sending fallback"
            );
            Some(state.fallback_reply.to_string())
        }
        Ok(TurnOutcome::NotConverged { iterations }) => {
            warn!(
                event_name = "webhook.turn.not_converged",
                correlation_id = message.correlation_id(),
                sender = %message.sender,
                iterations,
                "agent did not converge, sending fallback"
            );
            Some(state.fallback_reply.to_string())
        }
        Err(agent_error) => {
            error!(
                event_name = "webhook.turn.failed",
                correlation_id = message.correlation_id(),
                sender = %message.sender,
                error = %agent_error,
                "agent turn failed"
            );
            None
        }
    }
}
