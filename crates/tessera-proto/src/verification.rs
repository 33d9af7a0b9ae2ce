//! Device-verification event and method types.
//!
//! A verification attempt is a short three-step handshake between two
//! devices (start, key exchange, MAC exchange), correlated by a transaction
//! id minted by whichever side initiated. These types describe the decoded
//! shape of the events; key material itself stays inside the session layer
//! and never reaches the verification core.

use serde::{Deserialize, Serialize};

/// Number of symbols in a rendered short authentication string.
pub const SAS_SYMBOL_COUNT: usize = 7;

/// A verification method advertised in a start event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VerificationMethod {
    /// Emoji short-authentication-string comparison. The only method this
    /// client can drive.
    Emoji,
    /// Decimal short-authentication-string comparison.
    Decimal,
    /// A method this client does not know about.
    Other(String),
}

impl VerificationMethod {
    /// Wire name of this method.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Emoji => "sas.emoji",
            Self::Decimal => "sas.decimal",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for VerificationMethod {
    fn from(name: &str) -> Self {
        match name {
            "sas.emoji" => Self::Emoji,
            "sas.decimal" => Self::Decimal,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Serialize for VerificationMethod {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VerificationMethod {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

/// Reason attached to a verification cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelCode {
    /// The user aborted on purpose (or the peer did).
    User,
    /// The short authentication strings did not match.
    MismatchedSas,
    /// The transaction sat idle past the transport's deadline.
    Timeout,
    /// The peer sent an event the protocol does not allow in this state.
    UnexpectedMessage,
    /// The peer's MAC did not verify against the agreed key material.
    KeyMismatch,
    /// Any other code carried on the wire.
    Other(String),
}

impl CancelCode {
    /// Wire name of this cancellation code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::User => "user",
            Self::MismatchedSas => "mismatched_sas",
            Self::Timeout => "timeout",
            Self::UnexpectedMessage => "unexpected_message",
            Self::KeyMismatch => "key_mismatch",
            Self::Other(code) => code,
        }
    }
}

impl From<&str> for CancelCode {
    fn from(code: &str) -> Self {
        match code {
            "user" => Self::User,
            "mismatched_sas" => Self::MismatchedSas,
            "timeout" => Self::Timeout,
            "unexpected_message" => Self::UnexpectedMessage,
            "key_mismatch" => Self::KeyMismatch,
            other => Self::Other(other.to_owned()),
        }
    }
}

impl Serialize for CancelCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CancelCode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from(code.as_str()))
    }
}

/// One decoded inbound verification event.
///
/// The session layer strips key material out of the raw envelope before
/// constructing these; the core only ever sees the event kind and the
/// transaction id it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationEvent {
    /// The peer wants to begin verifying, advertising its methods.
    Start {
        /// Transaction id minted by the initiator.
        transaction_id: String,
        /// Methods the peer is willing to use.
        offered_methods: Vec<VerificationMethod>,
    },
    /// The peer aborted the transaction.
    Cancel {
        /// Transaction id being aborted.
        transaction_id: String,
        /// Why the peer (or the transport, for timeouts) aborted.
        code: CancelCode,
    },
    /// The peer's key share arrived; both sides can now derive the short
    /// authentication string.
    Key {
        /// Transaction id the key share belongs to.
        transaction_id: String,
    },
    /// The peer's MAC arrived; the handshake can conclude.
    Mac {
        /// Transaction id the MAC belongs to.
        transaction_id: String,
    },
}

impl VerificationEvent {
    /// Transaction id this event belongs to.
    pub fn transaction_id(&self) -> &str {
        match self {
            Self::Start { transaction_id, .. }
            | Self::Cancel { transaction_id, .. }
            | Self::Key { transaction_id }
            | Self::Mac { transaction_id } => transaction_id,
        }
    }
}

/// One symbol of the rendered short authentication string.
///
/// Both the glyph and a spoken name are shown, so operators on terminals
/// without emoji fonts can still compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SasSymbol {
    /// The emoji glyph.
    pub glyph: &'static str,
    /// Human-readable name of the glyph.
    pub name: &'static str,
}
