//! Pass delivery models.
//!
//! Deliveries send an already-issued pass to a guest by email or SMS. They
//! never change the key itself, so re-sending is always safe.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    Sms,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Email => "email",
            DeliveryChannel::Sms => "sms",
        }
    }
}

/// Request body for `POST /api/v1/keys/{id}/send-email`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendEmailRequest {
    /// Overrides the guest's stored email address
    pub alternative_email: Option<String>,
}

/// Request body for `POST /api/v1/keys/{id}/send-sms`.
///
/// Accepts either `{"phone_numbers": [...]}` or a bare JSON array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SendSmsRequest {
    Numbers(Vec<String>),
    Object {
        #[serde(default)]
        phone_numbers: Vec<String>,
    },
}

impl SendSmsRequest {
    pub fn into_numbers(self) -> Vec<String> {
        match self {
            SendSmsRequest::Numbers(numbers) => numbers,
            SendSmsRequest::Object { phone_numbers } => phone_numbers,
        }
    }
}

/// A rendered message ready to hand to a transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub channel: DeliveryChannel,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub body: String,
}

/// Result of delivering to one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipientOutcome {
    pub recipient: String,
    pub delivered: bool,
    pub detail: String,
}

/// Response body for delivery endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryReport {
    pub channel: DeliveryChannel,
    pub results: Vec<RecipientOutcome>,
}

impl DeliveryReport {
    pub fn delivered_count(&self) -> usize {
        self.results.iter().filter(|r| r.delivered).count()
    }
}
