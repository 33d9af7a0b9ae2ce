//! Injected capability traits.
//!
//! The state machine never performs I/O itself. Everything outbound goes
//! through [`VerificationTransport`], and the one human checkpoint goes
//! through [`SasPrompt`]. Production wires these to the session layer and
//! the terminal; tests wire them to recording mocks.

use tessera_proto::{SasSymbol, ToDeviceMessage};

use crate::error::TransportError;

/// Outbound capability surface the handshake needs from the session layer.
///
/// The transport owns all cryptographic session state, keyed by transaction
/// id; the core only ever passes the id back in. Calls are synchronous from
/// the core's perspective; latency and retry policy live with the
/// implementation.
pub trait VerificationTransport {
    /// Acknowledge a verification start to the peer.
    fn accept(&mut self, transaction_id: &str) -> Result<(), TransportError>;

    /// Produce this side's key-share payload.
    fn share_key(&mut self, transaction_id: &str) -> Result<ToDeviceMessage, TransportError>;

    /// Deliver a payload to the peer device.
    fn send_to_device(&mut self, message: ToDeviceMessage) -> Result<(), TransportError>;

    /// Abort the transaction. `reject` distinguishes a mismatch rejection
    /// from a plain self-initiated cancel.
    fn cancel(&mut self, transaction_id: &str, reject: bool) -> Result<(), TransportError>;

    /// Signal that the operator confirmed the short auth strings match.
    fn confirm_match(&mut self, transaction_id: &str) -> Result<(), TransportError>;

    /// Produce this side's final MAC payload.
    fn get_mac(&mut self, transaction_id: &str) -> Result<ToDeviceMessage, TransportError>;

    /// Derive the human-facing short authentication string.
    ///
    /// Only valid once the peer's key share has been processed for this
    /// transaction.
    fn render_short_auth_string(
        &self,
        transaction_id: &str,
    ) -> Result<Vec<SasSymbol>, TransportError>;
}

/// The operator's answer to a short-authentication-string comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SasDecision {
    /// Both screens show the same symbols.
    Match,
    /// The symbols differ, or the operator gave no clear answer.
    Mismatch,
}

/// Human checkpoint: show the short authentication string, block for a
/// match/mismatch answer.
///
/// Implementations MUST fail closed: anything that is not an explicit
/// affirmative answer (including read errors) is a [`SasDecision::Mismatch`].
/// This call blocks the dispatch worker, so it belongs on an interactive
/// control path only; refusing to verify when running unattended is the
/// caller's job, before events ever reach the dispatcher.
pub trait SasPrompt {
    /// Present `symbols` for transaction `transaction_id` and block until
    /// the operator answers.
    fn decide(&mut self, transaction_id: &str, symbols: &[SasSymbol]) -> SasDecision;
}
