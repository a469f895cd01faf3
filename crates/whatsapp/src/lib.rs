//! WhatsApp messaging over the Twilio API: inbound webhook payloads and
//! outbound replies.

pub mod chunk;
pub mod twilio;
pub mod webhook;

pub use chunk::{split_message, MAX_MESSAGE_CHARS};
pub use twilio::{GatewayError, MessageSender, NoopSender, SendReceipt, TwilioClient};
pub use webhook::{InboundMessage, TwilioWebhookForm};
