use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
    /// Opaque token thinking models attach to a call; it must be sent back
    /// unchanged with the call in later requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self { name: name.into(), args, thought_signature: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPart {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse { name: String, response: Value },
}

/// One entry of a conversation as exchanged with the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub parts: Vec<TurnPart>,
}

impl ChatTurn {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, parts: vec![TurnPart::Text(text.into())] }
    }

    pub fn model(parts: Vec<TurnPart>) -> Self {
        Self { role: ChatRole::Model, parts }
    }

    pub fn function_responses(responses: Vec<(String, Value)>) -> Self {
        Self {
            role: ChatRole::User,
            parts: responses
                .into_iter()
                .map(|(name, response)| TurnPart::FunctionResponse { name, response })
                .collect(),
        }
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                TurnPart::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                TurnPart::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}
