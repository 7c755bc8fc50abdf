//! Wallet pass references.
//!
//! Generating the actual Apple/Google wallet artifact happens outside this
//! service. A key stores a signed URL that the pass host resolves:
//!
//! `{base}/{apple|google}/{key_uuid}?exp=<unix seconds>&sig=<hex hmac>`
//!
//! The signature covers the pass type, the key token and the expiry, so a
//! URL issued before an extension cannot be edited to claim the new window.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use url::Url;
use uuid::Uuid;

use crate::models::digital_key::PassType;

type HmacSha256 = Hmac<Sha256>;

/// Builds and checks signed pass URLs.
#[derive(Debug, Clone)]
pub struct PassIssuer {
    base_url: Url,
    secret: Vec<u8>,
}

impl PassIssuer {
    pub fn new(base_url: Url, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            base_url,
            secret: secret.into(),
        }
    }

    fn mac(&self, pass_type: PassType, key_uuid: Uuid, exp: i64) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC key length is valid");
        let message = format!("{}:{}:{}", pass_type.as_str(), key_uuid, exp);
        mac.update(message.as_bytes());
        mac
    }

    /// Signed URL for a key's pass, valid until `valid_until`.
    pub fn pass_url(
        &self,
        pass_type: PassType,
        key_uuid: Uuid,
        valid_until: DateTime<Utc>,
    ) -> String {
        let exp = valid_until.timestamp();
        let sig = hex::encode(self.mac(pass_type, key_uuid, exp).finalize().into_bytes());

        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(pass_type.as_str())
                .push(&key_uuid.to_string());
        }
        url.query_pairs_mut()
            .clear()
            .append_pair("exp", &exp.to_string())
            .append_pair("sig", &sig);

        url.to_string()
    }

    /// Check a pass URL's signature in constant time.
    pub fn verify(&self, pass_url: &str) -> bool {
        let Ok(url) = Url::parse(pass_url) else {
            return false;
        };

        let segments: Vec<&str> = match url.path_segments() {
            Some(segments) => segments.collect(),
            None => return false,
        };
        let [.., kind, token] = segments.as_slice() else {
            return false;
        };

        let pass_type = match *kind {
            "apple" => PassType::Apple,
            "google" => PassType::Google,
            _ => return false,
        };
        let Ok(key_uuid) = Uuid::parse_str(token) else {
            return false;
        };

        let mut exp = None;
        let mut sig = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "exp" => exp = value.parse::<i64>().ok(),
                "sig" => sig = hex::decode(value.as_bytes()).ok(),
                _ => {}
            }
        }

        let (Some(exp), Some(sig)) = (exp, sig) else {
            return false;
        };
        let mac = self.mac(pass_type, key_uuid, exp);
        mac.verify_slice(&sig).is_ok()
    }
}
