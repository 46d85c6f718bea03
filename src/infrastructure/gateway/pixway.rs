//! Pixway IPN adapter.
//!
//! Pixway signs each notification with an HMAC-SHA512 hex digest over the
//! JSON payload minus the `signature` field. serde_json keeps object keys
//! sorted, so serializing the stripped payload reproduces the canonical
//! byte string the provider signed.

use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha512;

use super::{require_amount, require_str, CanonicalStatus, GatewayAdapter, SettlementEvent};
use crate::domain::errors::GatewayError;

type HmacSha512 = Hmac<Sha512>;

pub const PROVIDER: &str = "pixway";

/// Pixway's status vocabulary, mapped exhaustively onto the canonical one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixwayStatus {
    PaidOut,
    WaitingForApproval,
    Canceled,
    Expired,
    Refunded,
}

impl PixwayStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PAID_OUT" => Some(PixwayStatus::PaidOut),
            "WAITING_FOR_APPROVAL" => Some(PixwayStatus::WaitingForApproval),
            "CANCELED" => Some(PixwayStatus::Canceled),
            "EXPIRED" => Some(PixwayStatus::Expired),
            "REFUNDED" => Some(PixwayStatus::Refunded),
            _ => None,
        }
    }

    pub fn canonical(&self) -> CanonicalStatus {
        match self {
            PixwayStatus::PaidOut => CanonicalStatus::Paid,
            PixwayStatus::WaitingForApproval => CanonicalStatus::Pending,
            PixwayStatus::Canceled | PixwayStatus::Expired | PixwayStatus::Refunded => {
                CanonicalStatus::Failed
            }
        }
    }
}

pub struct PixwayAdapter {
    ipn_secret: String,
}

impl PixwayAdapter {
    pub fn new(ipn_secret: &str) -> Self {
        Self {
            ipn_secret: ipn_secret.to_string(),
        }
    }

    fn expected_digest(&self, payload: &Value) -> Option<HmacSha512> {
        let object = payload.as_object()?;
        let mut stripped = object.clone();
        stripped.remove("signature");
        let canonical = serde_json::to_string(&Value::Object(stripped)).ok()?;

        let mut mac = HmacSha512::new_from_slice(self.ipn_secret.as_bytes()).ok()?;
        mac.update(canonical.as_bytes());
        Some(mac)
    }
}

impl GatewayAdapter for PixwayAdapter {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    fn signature_valid(&self, payload: &Value) -> bool {
        let Some(signature_hex) = payload.get("signature").and_then(Value::as_str) else {
            return false;
        };
        let Ok(signature) = hex::decode(signature_hex) else {
            return false;
        };
        let Some(mac) = self.expected_digest(payload) else {
            return false;
        };
        mac.verify_slice(&signature).is_ok()
    }

    fn validate(&self, payload: &Value) -> Result<SettlementEvent, GatewayError> {
        let transaction_id = require_str(payload, "transactionId")?;
        let status_literal = require_str(payload, "status")?;
        let amount = require_amount(payload, "value")?;

        let status = PixwayStatus::parse(status_literal).ok_or_else(|| {
            GatewayError::UnrecognizedStatus {
                provider: PROVIDER,
                status: status_literal.to_string(),
            }
        })?;

        Ok(SettlementEvent {
            provider: PROVIDER,
            external_transaction_id: transaction_id.to_string(),
            status: status.canonical(),
            reported_amount: amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sign(secret: &str, payload: &Value) -> String {
        let mut stripped = payload.as_object().unwrap().clone();
        stripped.remove("signature");
        let canonical = serde_json::to_string(&Value::Object(stripped)).unwrap();
        let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn payload_with_signature(secret: &str) -> Value {
        let mut payload = json!({
            "transactionId": "ext-1",
            "status": "PAID_OUT",
            "value": 100.0,
        });
        let signature = sign(secret, &payload);
        payload["signature"] = Value::String(signature);
        payload
    }

    #[test]
    fn test_signature_round_trip() {
        let adapter = PixwayAdapter::new("secret");
        let payload = payload_with_signature("secret");
        assert!(adapter.signature_valid(&payload));
    }

    #[test]
    fn test_signature_rejects_wrong_secret() {
        let adapter = PixwayAdapter::new("secret");
        let payload = payload_with_signature("other-secret");
        assert!(!adapter.signature_valid(&payload));
    }

    #[test]
    fn test_signature_rejects_tampered_amount() {
        let adapter = PixwayAdapter::new("secret");
        let mut payload = payload_with_signature("secret");
        payload["value"] = json!(999.0);
        assert!(!adapter.signature_valid(&payload));
    }

    #[test]
    fn test_signature_rejects_missing_or_malformed() {
        let adapter = PixwayAdapter::new("secret");
        assert!(!adapter.signature_valid(&json!({"transactionId": "ext-1"})));
        assert!(!adapter.signature_valid(&json!({"signature": "not-hex!"})));
        assert!(!adapter.signature_valid(&json!("just a string")));
    }

    #[test]
    fn test_validate_normalizes_paid_out() {
        let adapter = PixwayAdapter::new("secret");
        let event = adapter
            .validate(&json!({
                "transactionId": "ext-1",
                "status": "PAID_OUT",
                "value": "100.00",
            }))
            .unwrap();
        assert_eq!(event.provider, "pixway");
        assert_eq!(event.external_transaction_id, "ext-1");
        assert_eq!(event.status, CanonicalStatus::Paid);
        assert_eq!(event.reported_amount, 100.0);
    }

    #[test]
    fn test_status_mapping_is_exhaustive() {
        let cases = [
            ("PAID_OUT", CanonicalStatus::Paid),
            ("WAITING_FOR_APPROVAL", CanonicalStatus::Pending),
            ("CANCELED", CanonicalStatus::Failed),
            ("EXPIRED", CanonicalStatus::Failed),
            ("REFUNDED", CanonicalStatus::Failed),
        ];
        for (literal, expected) in cases {
            assert_eq!(PixwayStatus::parse(literal).unwrap().canonical(), expected);
        }
        assert!(PixwayStatus::parse("SOMETHING_ELSE").is_none());
    }

    #[test]
    fn test_validate_missing_fields() {
        let adapter = PixwayAdapter::new("secret");
        let result = adapter.validate(&json!({"status": "PAID_OUT", "value": 100.0}));
        assert!(matches!(result, Err(GatewayError::MissingField("transactionId"))));

        let result = adapter.validate(&json!({
            "transactionId": "ext-1",
            "status": "PIX_RECEIVED",
            "value": 100.0,
        }));
        assert!(matches!(
            result,
            Err(GatewayError::UnrecognizedStatus { .. })
        ));
    }
}
