//! Verification error types.

use thiserror::Error;

/// Errors reported by a [`crate::VerificationTransport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has no cryptographic state for this transaction.
    #[error("unknown transaction: {transaction_id}")]
    UnknownTransaction {
        /// The transaction id the transport could not resolve.
        transaction_id: String,
    },

    /// The peer's key share has not arrived yet, so the requested material
    /// cannot be derived.
    #[error("peer key not yet available for transaction {transaction_id}")]
    PeerKeyMissing {
        /// The transaction id lacking peer key material.
        transaction_id: String,
    },

    /// A cryptographic derivation failed.
    #[error("crypto failure: {reason}")]
    Crypto {
        /// Description of the failure.
        reason: String,
    },

    /// Delivering an outbound payload failed.
    #[error("delivery failure: {reason}")]
    Delivery {
        /// Description of the failure.
        reason: String,
    },
}

/// Errors surfaced while handling one verification event.
///
/// These never escape the dispatcher: they are logged with transaction
/// context and swallowed, so one bad event cannot take down the receive
/// loop (worst case, one transaction stalls or cancels).
#[derive(Debug, Error)]
pub enum VerifyError {
    /// An outbound transport call failed. The session keeps its current
    /// phase; the peer is expected to re-drive the handshake or time out.
    #[error("transport call failed: {0}")]
    Transport(#[from] TransportError),
}
