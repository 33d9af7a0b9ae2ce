//! SAS key agreement and MAC material, per transaction.
//!
//! The verification core treats key agreement as an opaque capability; this
//! module is that capability. Each transaction gets an X25519 ephemeral
//! pair. Once both key shares are exchanged the ECDH output feeds
//! HKDF-SHA256 with a transcript string covering both identities and the
//! transaction id, producing six bytes that index the 64-entry emoji table
//! (seven six-bit symbols), plus per-side MAC keys for the final exchange.
//!
//! The store performs no I/O. Outbound envelopes accumulate in an outbox
//! the receive loop drains after every dispatched event; inbound raw
//! envelopes pass through [`SasStore::ingest`], which captures key material
//! and hands back the stripped event for the core.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use hmac::{Hmac, Mac as _};
use rand::rngs::OsRng;
use sha2::Sha256;
use tessera_core::{TransportError, VerificationTransport};
use tessera_proto::{
    CancelCode, InboundEnvelope, SasSymbol, ToDeviceMessage, VerificationEvent,
    VerificationMethod, SAS_SYMBOL_COUNT,
};
use x25519_dalek::{PublicKey, StaticSecret};

/// The 64-entry symbol table; six bits of SAS output select one entry.
pub const EMOJI_TABLE: [SasSymbol; 64] = [
    SasSymbol { glyph: "🐶", name: "dog" },
    SasSymbol { glyph: "🐱", name: "cat" },
    SasSymbol { glyph: "🦁", name: "lion" },
    SasSymbol { glyph: "🐎", name: "horse" },
    SasSymbol { glyph: "🦄", name: "unicorn" },
    SasSymbol { glyph: "🐷", name: "pig" },
    SasSymbol { glyph: "🐘", name: "elephant" },
    SasSymbol { glyph: "🐰", name: "rabbit" },
    SasSymbol { glyph: "🐼", name: "panda" },
    SasSymbol { glyph: "🐓", name: "rooster" },
    SasSymbol { glyph: "🐧", name: "penguin" },
    SasSymbol { glyph: "🐢", name: "turtle" },
    SasSymbol { glyph: "🐟", name: "fish" },
    SasSymbol { glyph: "🐙", name: "octopus" },
    SasSymbol { glyph: "🦋", name: "butterfly" },
    SasSymbol { glyph: "🌷", name: "flower" },
    SasSymbol { glyph: "🌳", name: "tree" },
    SasSymbol { glyph: "🌵", name: "cactus" },
    SasSymbol { glyph: "🍄", name: "mushroom" },
    SasSymbol { glyph: "🌏", name: "globe" },
    SasSymbol { glyph: "🌙", name: "moon" },
    SasSymbol { glyph: "☁️", name: "cloud" },
    SasSymbol { glyph: "🔥", name: "fire" },
    SasSymbol { glyph: "🍌", name: "banana" },
    SasSymbol { glyph: "🍎", name: "apple" },
    SasSymbol { glyph: "🍓", name: "strawberry" },
    SasSymbol { glyph: "🌽", name: "corn" },
    SasSymbol { glyph: "🍕", name: "pizza" },
    SasSymbol { glyph: "🎂", name: "cake" },
    SasSymbol { glyph: "❤️", name: "heart" },
    SasSymbol { glyph: "😀", name: "smiley" },
    SasSymbol { glyph: "🤖", name: "robot" },
    SasSymbol { glyph: "🎩", name: "hat" },
    SasSymbol { glyph: "👓", name: "glasses" },
    SasSymbol { glyph: "🔧", name: "spanner" },
    SasSymbol { glyph: "🎅", name: "santa" },
    SasSymbol { glyph: "👍", name: "thumbs up" },
    SasSymbol { glyph: "☂️", name: "umbrella" },
    SasSymbol { glyph: "⌛", name: "hourglass" },
    SasSymbol { glyph: "⏰", name: "clock" },
    SasSymbol { glyph: "🎁", name: "gift" },
    SasSymbol { glyph: "💡", name: "light bulb" },
    SasSymbol { glyph: "📕", name: "book" },
    SasSymbol { glyph: "✏️", name: "pencil" },
    SasSymbol { glyph: "📎", name: "paperclip" },
    SasSymbol { glyph: "✂️", name: "scissors" },
    SasSymbol { glyph: "🔒", name: "lock" },
    SasSymbol { glyph: "🔑", name: "key" },
    SasSymbol { glyph: "🔨", name: "hammer" },
    SasSymbol { glyph: "☎️", name: "telephone" },
    SasSymbol { glyph: "🏁", name: "flag" },
    SasSymbol { glyph: "🚂", name: "train" },
    SasSymbol { glyph: "🚲", name: "bicycle" },
    SasSymbol { glyph: "✈️", name: "aeroplane" },
    SasSymbol { glyph: "🚀", name: "rocket" },
    SasSymbol { glyph: "🏆", name: "trophy" },
    SasSymbol { glyph: "⚽", name: "ball" },
    SasSymbol { glyph: "🎸", name: "guitar" },
    SasSymbol { glyph: "🎺", name: "trumpet" },
    SasSymbol { glyph: "🔔", name: "bell" },
    SasSymbol { glyph: "⚓", name: "anchor" },
    SasSymbol { glyph: "🎧", name: "headphones" },
    SasSymbol { glyph: "📁", name: "folder" },
    SasSymbol { glyph: "📌", name: "pin" },
];

/// Domain separation for the short-auth-string derivation.
const SAS_INFO_PREFIX: &str = "TESSERA_SAS_V1";
/// Domain separation for MAC key derivation.
const MAC_INFO_PREFIX: &str = "TESSERA_SAS_MAC_V1";

/// Per-transaction handshake state.
struct Handshake {
    peer_user: String,
    peer_device: String,
    secret: StaticSecret,
    our_public: PublicKey,
    /// ECDH output, present once the peer's key share arrived.
    shared: Option<[u8; 32]>,
}

/// Cryptographic session state for all in-flight verifications, plus the
/// outbox of envelopes waiting for delivery.
pub struct SasStore {
    user_id: String,
    device_id: String,
    handshakes: HashMap<String, Handshake>,
    outbox: Vec<ToDeviceMessage>,
}

impl SasStore {
    /// Create an empty store for this device's identity.
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            handshakes: HashMap::new(),
            outbox: Vec::new(),
        }
    }

    /// Initiate a verification towards a peer device.
    ///
    /// Creates handshake state under `transaction_id` and returns the start
    /// envelope to deliver. The responder side of the handshake is driven
    /// by the core; this is the mirror half used when this device asks
    /// first.
    pub fn begin(
        &mut self,
        transaction_id: &str,
        peer_user: &str,
        peer_device: &str,
    ) -> ToDeviceMessage {
        self.track(transaction_id, peer_user, peer_device);
        ToDeviceMessage {
            event_type: "verification.start".to_owned(),
            to_user: peer_user.to_owned(),
            to_device: peer_device.to_owned(),
            transaction_id: transaction_id.to_owned(),
            payload: serde_json::json!({
                "methods": [VerificationMethod::Emoji.as_str()],
            }),
        }
    }

    /// Decode one raw inbound envelope.
    ///
    /// Key material is captured into the store; the returned event carries
    /// only what the core needs. `None` means the envelope was consumed
    /// (or dropped) at this layer.
    pub fn ingest(&mut self, envelope: &InboundEnvelope) -> Option<VerificationEvent> {
        let transaction_id = envelope.transaction_id.clone();
        match envelope.event_type.as_str() {
            "verification.start" => {
                let offered_methods: Vec<VerificationMethod> = envelope.payload["methods"]
                    .as_array()
                    .map(|methods| {
                        methods
                            .iter()
                            .filter_map(|m| m.as_str())
                            .map(VerificationMethod::from)
                            .collect()
                    })
                    .unwrap_or_default();
                // A replayed start must not mint a fresh secret: our public
                // key is already out, and replacing the pair would desync
                // the short auth string on a live handshake.
                if self.handshakes.contains_key(&transaction_id) {
                    tracing::warn!(transaction_id, "start for tracked transaction, keeping state");
                } else if offered_methods.contains(&VerificationMethod::Emoji) {
                    self.track(&transaction_id, &envelope.from_user, &envelope.from_device);
                } else {
                    // The core will ignore this start; holding key material
                    // for it would never be released.
                    tracing::debug!(transaction_id, "start without emoji, not tracking");
                }
                Some(VerificationEvent::Start { transaction_id, offered_methods })
            },
            "verification.accept" => {
                // The peer acknowledged our start; nothing for the core to
                // do until its key share arrives.
                tracing::debug!(transaction_id, "peer accepted verification");
                None
            },
            "verification.key" => {
                let Some(handshake) = self.handshakes.get_mut(&transaction_id) else {
                    tracing::warn!(transaction_id, "key share for untracked transaction");
                    return None;
                };
                let raw = envelope.payload["key"].as_str()?;
                let Ok(bytes) = BASE64.decode(raw) else {
                    tracing::warn!(transaction_id, "peer key share is not valid base64");
                    return None;
                };
                let Ok(key_bytes) = <[u8; 32]>::try_from(bytes.as_slice()) else {
                    tracing::warn!(transaction_id, "peer key share has wrong length");
                    return None;
                };
                let peer_public = PublicKey::from(key_bytes);
                handshake.shared =
                    Some(handshake.secret.diffie_hellman(&peer_public).to_bytes());
                Some(VerificationEvent::Key { transaction_id })
            },
            "verification.mac" => {
                let claimed = envelope.payload["mac"].as_str()?;
                match self.verify_peer_mac(&transaction_id, claimed) {
                    Ok(()) => Some(VerificationEvent::Mac { transaction_id }),
                    Err(err) => {
                        tracing::warn!(transaction_id, %err, "peer MAC failed verification");
                        Some(VerificationEvent::Cancel {
                            transaction_id,
                            code: CancelCode::KeyMismatch,
                        })
                    },
                }
            },
            "verification.confirm" => {
                tracing::debug!(transaction_id, "peer confirmed the short auth string");
                None
            },
            "verification.cancel" => {
                let code = envelope.payload["code"].as_str().map_or(
                    CancelCode::Other("unspecified".to_owned()),
                    CancelCode::from,
                );
                Some(VerificationEvent::Cancel { transaction_id, code })
            },
            other => {
                tracing::debug!(transaction_id, event_type = other, "unrecognized envelope kind");
                None
            },
        }
    }

    /// Take every queued outbound envelope, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<ToDeviceMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Drop handshake state for a finished transaction.
    pub fn forget(&mut self, transaction_id: &str) {
        self.handshakes.remove(transaction_id);
    }

    fn track(&mut self, transaction_id: &str, peer_user: &str, peer_device: &str) {
        let secret = StaticSecret::random_from_rng(OsRng);
        let our_public = PublicKey::from(&secret);
        self.handshakes.insert(
            transaction_id.to_owned(),
            Handshake {
                peer_user: peer_user.to_owned(),
                peer_device: peer_device.to_owned(),
                secret,
                our_public,
                shared: None,
            },
        );
    }

    fn handshake(&self, transaction_id: &str) -> Result<&Handshake, TransportError> {
        self.handshakes.get(transaction_id).ok_or_else(|| TransportError::UnknownTransaction {
            transaction_id: transaction_id.to_owned(),
        })
    }

    fn shared_secret(&self, transaction_id: &str) -> Result<[u8; 32], TransportError> {
        self.handshake(transaction_id)?.shared.ok_or_else(|| TransportError::PeerKeyMissing {
            transaction_id: transaction_id.to_owned(),
        })
    }

    /// Transcript covering both identities and the transaction, identical
    /// on both sides regardless of who initiated.
    fn transcript(&self, transaction_id: &str) -> Result<String, TransportError> {
        let handshake = self.handshake(transaction_id)?;
        let mut sides = [
            format!("{}|{}", self.user_id, self.device_id),
            format!("{}|{}", handshake.peer_user, handshake.peer_device),
        ];
        sides.sort();
        Ok(format!("{SAS_INFO_PREFIX}|{}|{}|{transaction_id}", sides[0], sides[1]))
    }

    fn sas_bytes(&self, transaction_id: &str) -> Result<[u8; 6], TransportError> {
        let shared = self.shared_secret(transaction_id)?;
        let transcript = self.transcript(transaction_id)?;
        let hk = Hkdf::<Sha256>::new(None, &shared);
        let mut out = [0u8; 6];
        hk.expand(transcript.as_bytes(), &mut out)
            .map_err(|_| TransportError::Crypto { reason: "hkdf expand failed".to_owned() })?;
        Ok(out)
    }

    /// MAC key bound to one side's identity.
    fn mac_key(
        &self,
        transaction_id: &str,
        user: &str,
        device: &str,
    ) -> Result<[u8; 32], TransportError> {
        let shared = self.shared_secret(transaction_id)?;
        let info = format!("{MAC_INFO_PREFIX}|{user}|{device}|{transaction_id}");
        let hk = Hkdf::<Sha256>::new(None, &shared);
        let mut out = [0u8; 32];
        hk.expand(info.as_bytes(), &mut out)
            .map_err(|_| TransportError::Crypto { reason: "hkdf expand failed".to_owned() })?;
        Ok(out)
    }

    fn mac_over(key: &[u8; 32], message: &str) -> Result<Vec<u8>, TransportError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(key)
            .map_err(|_| TransportError::Crypto { reason: "bad hmac key length".to_owned() })?;
        mac.update(message.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }

    fn verify_peer_mac(&self, transaction_id: &str, claimed: &str) -> Result<(), TransportError> {
        let handshake = self.handshake(transaction_id)?;
        let key = self.mac_key(transaction_id, &handshake.peer_user, &handshake.peer_device)?;
        let expected = Self::mac_over(&key, &handshake.peer_device)?;
        let claimed_bytes = hex::decode(claimed)
            .map_err(|_| TransportError::Crypto { reason: "mac is not valid hex".to_owned() })?;
        // Not secret data (both sides will display success/failure), so a
        // plain comparison is fine here.
        if claimed_bytes == expected {
            Ok(())
        } else {
            Err(TransportError::Crypto { reason: "mac mismatch".to_owned() })
        }
    }

    fn envelope(
        &self,
        handshake: &Handshake,
        event_type: &str,
        transaction_id: &str,
        payload: serde_json::Value,
    ) -> ToDeviceMessage {
        ToDeviceMessage {
            event_type: event_type.to_owned(),
            to_user: handshake.peer_user.clone(),
            to_device: handshake.peer_device.clone(),
            transaction_id: transaction_id.to_owned(),
            payload,
        }
    }
}

impl VerificationTransport for SasStore {
    fn accept(&mut self, transaction_id: &str) -> Result<(), TransportError> {
        let handshake = self.handshake(transaction_id)?;
        let message = self.envelope(
            handshake,
            "verification.accept",
            transaction_id,
            serde_json::json!({ "method": VerificationMethod::Emoji.as_str() }),
        );
        self.outbox.push(message);
        Ok(())
    }

    fn share_key(&mut self, transaction_id: &str) -> Result<ToDeviceMessage, TransportError> {
        let handshake = self.handshake(transaction_id)?;
        let key = BASE64.encode(handshake.our_public.as_bytes());
        Ok(self.envelope(
            handshake,
            "verification.key",
            transaction_id,
            serde_json::json!({ "key": key }),
        ))
    }

    fn send_to_device(&mut self, message: ToDeviceMessage) -> Result<(), TransportError> {
        self.outbox.push(message);
        Ok(())
    }

    fn cancel(&mut self, transaction_id: &str, reject: bool) -> Result<(), TransportError> {
        let code = if reject { CancelCode::MismatchedSas } else { CancelCode::User };
        let handshake = self.handshake(transaction_id)?;
        let message = self.envelope(
            handshake,
            "verification.cancel",
            transaction_id,
            serde_json::json!({ "code": code.as_str() }),
        );
        self.outbox.push(message);
        self.handshakes.remove(transaction_id);
        Ok(())
    }

    fn confirm_match(&mut self, transaction_id: &str) -> Result<(), TransportError> {
        let handshake = self.handshake(transaction_id)?;
        let message = self.envelope(
            handshake,
            "verification.confirm",
            transaction_id,
            serde_json::json!({}),
        );
        self.outbox.push(message);
        Ok(())
    }

    fn get_mac(&mut self, transaction_id: &str) -> Result<ToDeviceMessage, TransportError> {
        let key = self.mac_key(transaction_id, &self.user_id, &self.device_id)?;
        let mac = Self::mac_over(&key, &self.device_id)?;
        let handshake = self.handshake(transaction_id)?;
        Ok(self.envelope(
            handshake,
            "verification.mac",
            transaction_id,
            serde_json::json!({ "mac": hex::encode(mac) }),
        ))
    }

    fn render_short_auth_string(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<SasSymbol>, TransportError> {
        let bytes = self.sas_bytes(transaction_id)?;
        Ok(emoji_indices(bytes).iter().map(|&i| EMOJI_TABLE[i]).collect())
    }
}

/// Slice 42 bits out of 6 bytes: seven indices of six bits each.
fn emoji_indices(bytes: [u8; 6]) -> [usize; SAS_SYMBOL_COUNT] {
    [
        usize::from(bytes[0] >> 2),
        usize::from(((bytes[0] & 0x3) << 4) | (bytes[1] >> 4)),
        usize::from(((bytes[1] & 0xF) << 2) | (bytes[2] >> 6)),
        usize::from(bytes[2] & 0x3F),
        usize::from(bytes[3] >> 2),
        usize::from(((bytes[3] & 0x3) << 4) | (bytes[4] >> 4)),
        usize::from(((bytes[4] & 0xF) << 2) | (bytes[5] >> 6)),
    ]
}
