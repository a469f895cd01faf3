use serde::Deserialize;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Form fields Twilio posts for an incoming WhatsApp message. Only `From` and
/// `Body` drive behavior; the rest is carried for log correlation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct TwilioWebhookForm {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
    #[serde(rename = "ProfileName", default)]
    pub profile_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender phone number without the `whatsapp:` channel prefix.
    pub sender: String,
    pub body: String,
    pub message_sid: Option<String>,
    pub profile_name: Option<String>,
}

impl InboundMessage {
    /// `None` when either the sender or the body is blank; such deliveries
    /// are acknowledged and otherwise ignored.
    pub fn from_form(form: TwilioWebhookForm) -> Option<Self> {
        let sender = strip_channel_prefix(&form.from).trim().to_string();
        let body = form.body.trim().to_string();
        if sender.is_empty() || body.is_empty() {
            return None;
        }

        Some(Self {
            sender,
            body,
            message_sid: form.message_sid.filter(|sid| !sid.trim().is_empty()),
            profile_name: form.profile_name.filter(|name| !name.trim().is_empty()),
        })
    }

    pub fn correlation_id(&self) -> &str {
        self.message_sid.as_deref().unwrap_or("unknown-message-sid")
    }
}

pub fn strip_channel_prefix(address: &str) -> &str {
    let trimmed = address.trim();
    trimmed.strip_prefix(WHATSAPP_PREFIX).unwrap_or(trimmed)
}

/// Formats a phone number as a WhatsApp channel address.
pub fn channel_address(number: &str) -> String {
    format!("{WHATSAPP_PREFIX}{}", strip_channel_prefix(number))
}

#[cfg(test)]
mod tests {
    use super::{channel_address, InboundMessage, TwilioWebhookForm};

    fn form(from: &str, body: &str) -> TwilioWebhookForm {
        TwilioWebhookForm {
            from: from.to_string(),
            body: body.to_string(),
            ..TwilioWebhookForm::default()
        }
    }

    #[test]
    fn sender_prefix_is_stripped_and_body_trimmed() {
        let message = InboundMessage::from_form(form("whatsapp:+5215550001111", "  hola \n"))
            .expect("message");

        assert_eq!(message.sender, "+5215550001111");
        assert_eq!(message.body, "hola");
    }

    #[test]
    fn blank_sender_or_body_is_ignored() {
        assert_eq!(InboundMessage::from_form(form("", "hello")), None);
        assert_eq!(InboundMessage::from_form(form("whatsapp:+15550100", "   ")), None);
        assert_eq!(InboundMessage::from_form(form("whatsapp:", "hello")), None);
    }

    #[test]
    fn channel_address_is_not_double_prefixed() {
        assert_eq!(channel_address("+15550100"), "whatsapp:+15550100");
        assert_eq!(channel_address("whatsapp:+15550100"), "whatsapp:+15550100");
    }
}
