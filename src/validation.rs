//! Shape check for inbound conversation payloads.
//!
//! Runs before any I/O. The payload arrives as raw JSON so that malformed
//! input is reported with a precise message instead of a generic
//! deserialization failure.

use serde_json::Value;
use thiserror::Error;

use crate::models::chat::{ ChatMessage, Role };

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Messages must be an array")]
    NotAnArray,
    #[error("Messages array cannot be empty")]
    Empty,
    #[error("Each message must have a role and content")]
    MissingField { index: usize },
    #[error("Invalid message role")]
    InvalidRole { index: usize, role: String },
    #[error("Message content must be a string")]
    ContentNotString { index: usize },
}

/// Validates `payload` and converts it into an ordered conversation.
/// Message order is preserved exactly.
pub fn validate_conversation(payload: &Value) -> Result<Vec<ChatMessage>, ValidationError> {
    let items = payload.as_array().ok_or(ValidationError::NotAnArray)?;
    if items.is_empty() {
        return Err(ValidationError::Empty);
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| validate_message(index, item))
        .collect()
}

fn validate_message(index: usize, item: &Value) -> Result<ChatMessage, ValidationError> {
    let role = item.get("role").filter(|v| !v.is_null());
    let content = item.get("content").filter(|v| !v.is_null());

    let (role, content) = match (role, content) {
        (Some(r), Some(c)) => (r, c),
        _ => return Err(ValidationError::MissingField { index }),
    };

    let role_str = role.as_str().ok_or_else(|| ValidationError::InvalidRole {
        index,
        role: role.to_string(),
    })?;
    if role_str.is_empty() {
        return Err(ValidationError::MissingField { index });
    }
    let role = Role::parse(role_str).ok_or_else(|| ValidationError::InvalidRole {
        index,
        role: role_str.to_string(),
    })?;

    let content = content.as_str().ok_or(ValidationError::ContentNotString { index })?;

    let timestamp = item.get("timestamp").and_then(Value::as_i64);

    Ok(ChatMessage {
        role,
        content: content.to_string(),
        timestamp,
    })
}
