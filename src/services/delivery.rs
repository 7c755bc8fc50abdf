//! Pass delivery by email and SMS.
//!
//! Delivery sends the pass URL of an existing key to a guest. It never
//! changes the key; every attempt is audited as a key event.
//!
//! # Outbound requests
//!
//! [`HttpTransport`] posts each message as JSON to `DELIVERY_API_URL`:
//!
//! - `Content-Type: application/json`
//! - `Authorization: Bearer <DELIVERY_API_KEY>` when a key is configured
//! - `X-Delivery-Signature: sha256=<hex>` HMAC of the body under the API key
//! - `X-Delivery-Id: <uuid>`

#![allow(async_fn_in_trait)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthContext,
    models::{
        delivery::{DeliveryChannel, DeliveryReport, OutboundMessage, RecipientOutcome},
        digital_key::DigitalKey,
        key_event::{KeyEventKind, NewKeyEvent},
        reservation::ReservationDetails,
    },
    store::KeyStore,
};

type HmacSha256 = Hmac<Sha256>;

/// Something that can hand a rendered message to an email or SMS provider.
pub trait DeliveryTransport: Send + Sync {
    /// Send one message. The error string is recorded on the audit event.
    async fn send(&self, message: &OutboundMessage) -> Result<(), String>;
}

/// Transport that posts messages to an HTTP delivery gateway.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Option<Url>,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(
        endpoint: Option<Url>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

impl DeliveryTransport for HttpTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), String> {
        let Some(endpoint) = &self.endpoint else {
            tracing::info!(
                channel = message.channel.as_str(),
                to = %message.to,
                "delivery gateway not configured, message not sent"
            );
            return Err("delivery gateway not configured".to_string());
        };

        let delivery_id = Uuid::new_v4();
        let body = serde_json::to_string(message).map_err(|e| e.to_string())?;

        let mut request = self
            .client
            .post(endpoint.clone())
            .header("Content-Type", "application/json")
            .header("X-Delivery-Id", delivery_id.to_string());

        if let Some(api_key) = &self.api_key {
            request = request
                .bearer_auth(api_key)
                .header("X-Delivery-Signature", sign_body(api_key, &body));
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(format!("gateway responded with {}", status.as_u16()))
        }
    }
}

/// `sha256=<hex>` HMAC of a request body.
fn sign_body(secret: &str, body: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body.as_bytes());
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Trimmed contact, or `None` if there is nothing left.
fn non_blank(contact: Option<String>) -> Option<String> {
    contact
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Normalize a phone number for SMS.
///
/// Spaces, dashes and parentheses are dropped. What remains must be an
/// optional leading `+` followed by digits, 10 to 15 characters in total.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let valid = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit())
        && (10..=15).contains(&cleaned.len());

    valid.then_some(cleaned)
}

fn render_email(
    key: &DigitalKey,
    reservation: &ReservationDetails,
    hotel_name: &str,
    to: String,
) -> OutboundMessage {
    OutboundMessage {
        channel: DeliveryChannel::Email,
        to,
        subject: Some(format!("Your digital room key for {hotel_name}")),
        body: format!(
            "Dear {},\n\n\
             Your digital key for room {} is ready.\n\
             Valid from {} until {}.\n\n\
             Add it to your wallet: {}\n",
            reservation.guest_name(),
            reservation.room_number,
            key.valid_from.format("%Y-%m-%d %H:%M UTC"),
            key.valid_until.format("%Y-%m-%d %H:%M UTC"),
            key.pass_url,
        ),
    }
}

fn render_sms(
    key: &DigitalKey,
    reservation: &ReservationDetails,
    hotel_name: &str,
    to: String,
) -> OutboundMessage {
    OutboundMessage {
        channel: DeliveryChannel::Sms,
        to,
        subject: None,
        body: format!(
            "{hotel_name}: your key for room {} is ready. {}",
            reservation.room_number, key.pass_url
        ),
    }
}

async fn load<S: KeyStore>(
    store: &S,
    key_id: Uuid,
) -> Result<(DigitalKey, ReservationDetails), AppError> {
    let key = store.find_key(key_id).await?.ok_or(AppError::KeyNotFound)?;
    let reservation = store
        .find_reservation(key.reservation_id)
        .await?
        .ok_or(AppError::ReservationNotFound)?;
    Ok((key, reservation))
}

/// Send each message, audit each attempt, and fail if nothing got through.
async fn dispatch<S: KeyStore, T: DeliveryTransport>(
    store: &S,
    transport: &T,
    actor: Option<Uuid>,
    key_id: Uuid,
    channel: DeliveryChannel,
    attempts: Vec<Result<OutboundMessage, RecipientOutcome>>,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, AppError> {
    let (sent, failed) = match channel {
        DeliveryChannel::Email => (KeyEventKind::EmailSent, KeyEventKind::EmailFailed),
        DeliveryChannel::Sms => (KeyEventKind::SmsSent, KeyEventKind::SmsFailed),
    };

    let mut results = Vec::with_capacity(attempts.len());
    for attempt in attempts {
        let outcome = match attempt {
            Ok(message) => match transport.send(&message).await {
                Ok(()) => RecipientOutcome {
                    recipient: message.to,
                    delivered: true,
                    detail: "sent".to_string(),
                },
                Err(detail) => {
                    tracing::error!(
                        key_id = %key_id,
                        channel = channel.as_str(),
                        to = %message.to,
                        error = %detail,
                        "delivery failed"
                    );
                    RecipientOutcome {
                        recipient: message.to,
                        delivered: false,
                        detail,
                    }
                }
            },
            Err(rejected) => rejected,
        };

        let kind = if outcome.delivered { sent } else { failed };
        let event = NewKeyEvent::new(key_id, kind, now)
            .by(actor)
            .with_details(format!("{}: {}", outcome.recipient, outcome.detail));
        store.append_key_event(&event).await?;

        results.push(outcome);
    }

    let report = DeliveryReport { channel, results };
    if report.delivered_count() == 0 {
        let details: Vec<String> = report
            .results
            .iter()
            .map(|r| format!("{}: {}", r.recipient, r.detail))
            .collect();
        return Err(AppError::DeliveryFailure(details.join("; ")));
    }

    tracing::info!(
        key_id = %key_id,
        channel = channel.as_str(),
        delivered = report.delivered_count(),
        attempted = report.results.len(),
        "pass delivered"
    );
    Ok(report)
}

/// Email a key's pass to the guest, or to `alternative_email`. Staff only.
///
/// # Errors
///
/// - `KeyNotFound`, `Forbidden`
/// - `NoRecipient`: No override and no stored email
/// - `DeliveryFailure`: The message could not be sent
pub async fn send_email<S: KeyStore, T: DeliveryTransport>(
    store: &S,
    transport: &T,
    actor: &AuthContext,
    key_id: Uuid,
    alternative_email: Option<String>,
    hotel_name: &str,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, AppError> {
    actor.require_staff()?;
    deliver_email(
        store,
        transport,
        Some(actor.user_id),
        key_id,
        alternative_email,
        hotel_name,
        now,
    )
    .await
}

/// Email delivery without the permission check, used after key creation.
pub async fn deliver_email<S: KeyStore, T: DeliveryTransport>(
    store: &S,
    transport: &T,
    actor: Option<Uuid>,
    key_id: Uuid,
    alternative_email: Option<String>,
    hotel_name: &str,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, AppError> {
    let (key, reservation) = load(store, key_id).await?;

    let to = non_blank(alternative_email)
        .or_else(|| non_blank(reservation.guest_email.clone()))
        .ok_or(AppError::NoRecipient)?;

    let message = render_email(&key, &reservation, hotel_name, to);
    dispatch(
        store,
        transport,
        actor,
        key_id,
        DeliveryChannel::Email,
        vec![Ok(message)],
        now,
    )
    .await
}

/// Text a key's pass to the given numbers, or to the guest's stored phone. Staff only.
///
/// Invalid numbers are reported as failed without being sent; the call
/// only fails outright if no recipient at all got the message.
pub async fn send_sms<S: KeyStore, T: DeliveryTransport>(
    store: &S,
    transport: &T,
    actor: &AuthContext,
    key_id: Uuid,
    phone_numbers: Vec<String>,
    hotel_name: &str,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, AppError> {
    actor.require_staff()?;
    deliver_sms(
        store,
        transport,
        Some(actor.user_id),
        key_id,
        phone_numbers,
        hotel_name,
        now,
    )
    .await
}

/// SMS delivery without the permission check, used after key creation.
pub async fn deliver_sms<S: KeyStore, T: DeliveryTransport>(
    store: &S,
    transport: &T,
    actor: Option<Uuid>,
    key_id: Uuid,
    phone_numbers: Vec<String>,
    hotel_name: &str,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, AppError> {
    let (key, reservation) = load(store, key_id).await?;

    let mut recipients: Vec<String> = phone_numbers
        .into_iter()
        .filter_map(|n| non_blank(Some(n)))
        .collect();
    if recipients.is_empty() {
        recipients.extend(non_blank(reservation.guest_phone.clone()));
    }
    if recipients.is_empty() {
        return Err(AppError::NoRecipient);
    }

    let attempts = recipients
        .into_iter()
        .map(|raw| match normalize_phone(&raw) {
            Some(to) => Ok(render_sms(&key, &reservation, hotel_name, to)),
            None => Err(RecipientOutcome {
                recipient: raw,
                delivered: false,
                detail: "invalid phone number".to_string(),
            }),
        })
        .collect();

    dispatch(
        store,
        transport,
        actor,
        key_id,
        DeliveryChannel::Sms,
        attempts,
        now,
    )
    .await
}
