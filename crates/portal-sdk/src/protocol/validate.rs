//! Inbound validation: raw value in, typed message or drop reason out.

use serde::Deserialize;
use serde_json::Value;

use super::message::PortalMessage;

/// Why an inbound value was dropped.
///
/// None of these are surfaced to application code: the channel is shared,
/// and plenty of traffic on it is legitimately meant for someone else.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Unknown `type`, missing required field, or wrong field type.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// `targetId` names an identity the receiver does not answer to.
    #[error("message addressed to '{target_id}'")]
    Unaddressed { target_id: String },

    /// `sourceId` is not a registered sender.
    #[error("message from unknown source '{source_id}'")]
    UnknownSource { source_id: String },
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::Malformed(_) => "MALFORMED_MESSAGE",
            ValidationError::Unaddressed { .. } => "UNADDRESSED",
            ValidationError::UnknownSource { .. } => "UNKNOWN_SOURCE",
        }
    }
}

/// Match `raw` against the discriminated schema keyed by `type`.
pub fn parse_message(raw: &Value) -> Result<PortalMessage, ValidationError> {
    if !raw.is_object() {
        return Err(ValidationError::Malformed("expected a JSON object".to_string()));
    }
    PortalMessage::deserialize(raw).map_err(|error| ValidationError::Malformed(error.to_string()))
}

/// Parse a message from its JSON text form.
pub fn parse_message_str(text: &str) -> Result<PortalMessage, ValidationError> {
    let raw: Value = serde_json::from_str(text)
        .map_err(|error| ValidationError::Malformed(format!("invalid json: {error}")))?;
    parse_message(&raw)
}
