// IPN webhook verification.
//
// NOWPayments signs each callback: HMAC-SHA512 over the JSON body with its
// keys sorted alphabetically, keyed by the merchant's IPN secret, hex-encoded
// into the `x-nowpayments-sig` header. Re-serializing the parsed body through
// serde_json sorts the keys for us (its maps are BTree-backed), and the
// comparison is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use subtle::ConstantTimeEq;

use unity_ledger_core::error::{LedgerError, Result};
use unity_ledger_core::provider::ProviderCallback;

use crate::types::IpnPayload;

type HmacSha512 = Hmac<Sha512>;

/// Verify the `x-nowpayments-sig` header against the raw request body.
/// Fails closed: a missing secret rejects everything.
pub fn verify_ipn_signature(
    ipn_secret: Option<&str>,
    raw_body: &[u8],
    signature_header: &str,
) -> Result<()> {
    let secret = ipn_secret.ok_or_else(|| {
        LedgerError::Config("ipn secret not configured, rejecting webhook".into())
    })?;

    let parsed: serde_json::Value = serde_json::from_slice(raw_body)
        .map_err(|e| LedgerError::Serialization(format!("malformed ipn body: {e}")))?;
    let sorted = serde_json::to_string(&parsed)
        .map_err(|e| LedgerError::Serialization(e.to_string()))?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| LedgerError::Config(format!("ipn secret unusable: {e}")))?;
    mac.update(sorted.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    if bool::from(expected.as_bytes().ct_eq(signature_header.as_bytes())) {
        Ok(())
    } else {
        Err(LedgerError::Serialization("ipn signature mismatch".into()))
    }
}

/// Parse a raw IPN body into the engine's callback type.
pub fn parse_ipn(raw_body: &[u8]) -> Result<ProviderCallback> {
    let payload: IpnPayload = serde_json::from_slice(raw_body)
        .map_err(|e| LedgerError::Serialization(format!("malformed ipn body: {e}")))?;
    Ok(payload.into_callback())
}

#[cfg(test)]
mod tests {
    use super::*;
    use unity_ledger_core::provider::CallbackStatus;

    fn sign(secret: &str, body: &[u8]) -> String {
        let parsed: serde_json::Value = serde_json::from_slice(body).unwrap();
        let sorted = serde_json::to_string(&parsed).unwrap();
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(sorted.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    const BODY: &[u8] =
        br#"{"payment_status": "finished", "payment_id": 42, "price_amount": 20.0}"#;

    #[test]
    fn valid_signature_accepted() {
        let sig = sign("topsecret", BODY);
        verify_ipn_signature(Some("topsecret"), BODY, &sig).unwrap();
    }

    #[test]
    fn signature_is_key_order_independent() {
        // Same fields, different textual order: same signature
        let reordered =
            br#"{"price_amount": 20.0, "payment_id": 42, "payment_status": "finished"}"#;
        let sig = sign("topsecret", BODY);
        verify_ipn_signature(Some("topsecret"), reordered, &sig).unwrap();
    }

    #[test]
    fn wrong_secret_rejected() {
        let sig = sign("other", BODY);
        assert!(verify_ipn_signature(Some("topsecret"), BODY, &sig).is_err());
    }

    #[test]
    fn tampered_body_rejected() {
        let sig = sign("topsecret", BODY);
        let tampered =
            br#"{"payment_status": "finished", "payment_id": 42, "price_amount": 2000.0}"#;
        assert!(verify_ipn_signature(Some("topsecret"), tampered, &sig).is_err());
    }

    #[test]
    fn missing_secret_fails_closed() {
        let sig = sign("topsecret", BODY);
        assert!(verify_ipn_signature(None, BODY, &sig).is_err());
    }

    #[test]
    fn parse_ipn_normalizes_status() {
        let callback = parse_ipn(BODY).unwrap();
        assert_eq!(callback.payment_id, "42");
        assert_eq!(callback.status, CallbackStatus::Finished);
        assert_eq!(callback.pay_amount, 20.0);
    }
}
