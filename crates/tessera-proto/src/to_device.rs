//! Device-to-device message envelope.

use serde::{Deserialize, Serialize};

/// An outbound payload addressed to one specific peer device.
///
/// Verification traffic never goes through a room; each handshake step is
/// delivered straight to the peer device. The `payload` stays an opaque
/// JSON value here because its shape differs per event kind and only the
/// session layer interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToDeviceMessage {
    /// Event kind, e.g. `"verification.key"`.
    pub event_type: String,
    /// User the payload is addressed to.
    pub to_user: String,
    /// Device the payload is addressed to.
    pub to_device: String,
    /// Transaction id correlating the handshake.
    pub transaction_id: String,
    /// Kind-specific body.
    pub payload: serde_json::Value,
}

/// An inbound payload delivered by the homeserver's sync stream.
///
/// The mirror image of [`ToDeviceMessage`]: the server stamps the sending
/// user and device instead of the recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEnvelope {
    /// Event kind, e.g. `"verification.start"`.
    pub event_type: String,
    /// User the payload came from.
    pub from_user: String,
    /// Device the payload came from.
    pub from_device: String,
    /// Transaction id correlating the handshake.
    pub transaction_id: String,
    /// Kind-specific body.
    pub payload: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrips_through_json() {
        let msg = ToDeviceMessage {
            event_type: "verification.key".to_owned(),
            to_user: "@peer:example.org".to_owned(),
            to_device: "DEVICEID".to_owned(),
            transaction_id: "tx-1".to_owned(),
            payload: serde_json::json!({ "key": "AAAA" }),
        };
        let encoded = serde_json::to_string(&msg).unwrap();
        let decoded: ToDeviceMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, msg);
    }
}
