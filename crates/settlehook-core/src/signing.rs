//! # Signing Module
//!
//! HMAC-SHA256 signatures over delivery payloads.
//!
//! The signature covers the exact serialized envelope bytes. Nothing else is
//! mixed into the digest; the envelope already carries its own timestamp.
//! Subscribers without a secret receive unsigned deliveries.

use crate::ValidationError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the event type tag
pub const EVENT_HEADER: &str = "x-webhook-event";

/// Header carrying the dispatch timestamp (ISO-8601)
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";

/// Header carrying the payload signature; only sent when a secret is configured
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Prefix identifying the signature algorithm
pub const SIGNATURE_PREFIX: &str = "sha256=";

// ============================================================================
// Webhook Secret
// ============================================================================

/// Shared secret used to sign deliveries for one subscription
///
/// The value is wiped from memory when dropped and never appears in `Debug`
/// output.
#[derive(Clone)]
pub struct WebhookSecret(Zeroizing<String>);

impl WebhookSecret {
    /// Wrap a secret value
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::TooShort` for an empty secret.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = Zeroizing::new(value.into());
        if value.is_empty() {
            return Err(ValidationError::TooShort {
                field: "secret".to_string(),
                min_length: 1,
            });
        }
        Ok(Self(value))
    }

    /// Access the raw secret value
    ///
    /// Only for computing signatures; never log the result.
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for WebhookSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WebhookSecret(<REDACTED>)")
    }
}

// ============================================================================
// Signature Operations
// ============================================================================

/// Compute the signature header value for a payload
///
/// Deterministic: the same payload and secret always give the same value.
///
/// # Examples
///
/// ```rust
/// use settlehook_core::{sign_payload, verify_signature, WebhookSecret};
///
/// let secret = WebhookSecret::new("s3cr3t").unwrap();
/// let signature = sign_payload(b"{\"event\":\"onSwapFinalized\"}", &secret).unwrap();
///
/// assert!(signature.starts_with("sha256="));
/// assert!(verify_signature(b"{\"event\":\"onSwapFinalized\"}", &signature, &secret));
/// ```
pub fn sign_payload(payload: &[u8], secret: &WebhookSecret) -> Result<String, ValidationError> {
    let mut mac = new_mac(secret)?;
    mac.update(payload);
    let digest = mac.finalize().into_bytes();

    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest)))
}

/// Check a signature against a payload, as a subscriber would
///
/// Accepts the value with or without the `sha256=` prefix. Malformed hex is
/// treated as a mismatch. The comparison is constant-time.
pub fn verify_signature(payload: &[u8], signature: &str, secret: &WebhookSecret) -> bool {
    let hex_signature = signature.strip_prefix(SIGNATURE_PREFIX).unwrap_or(signature);

    let Ok(expected) = hex::decode(hex_signature) else {
        return false;
    };

    let Ok(mut mac) = new_mac(secret) else {
        return false;
    };
    mac.update(payload);

    mac.verify_slice(&expected).is_ok()
}

fn new_mac(secret: &WebhookSecret) -> Result<HmacSha256, ValidationError> {
    HmacSha256::new_from_slice(secret.expose_secret().as_bytes()).map_err(|e| {
        ValidationError::InvalidFormat {
            field: "secret".to_string(),
            message: format!("cannot initialise HMAC: {}", e),
        }
    })
}

#[cfg(test)]
#[path = "signing_tests.rs"]
mod tests;
