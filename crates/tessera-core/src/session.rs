//! Per-transaction verification session state.

use tessera_proto::VerificationMethod;

/// Progress of one verification transaction.
///
/// A single enum value per session makes the terminal states mutually
/// exclusive by construction: a session can never be both canceled and
/// verified, or verified and timed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Session created from a start event; our key share not yet out.
    Started,
    /// Our key share was sent; waiting for the peer's key event.
    KeyShared,
    /// Short auth string rendered; waiting on the operator.
    AwaitingDecision,
    /// Operator confirmed the match; waiting for the peer's MAC.
    Confirmed,
    /// MAC exchange completed. Terminal.
    Verified,
    /// Aborted by either side or by mismatch. Terminal.
    Canceled,
    /// The transport gave up on the transaction. Terminal.
    TimedOut,
}

impl Phase {
    /// Whether this phase accepts no further protocol progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Canceled | Self::TimedOut)
    }
}

/// One verification attempt, keyed by its transaction id.
///
/// Created only when the first start event for an untracked transaction id
/// arrives, mutated only by the state machine, and eligible for eviction
/// once terminal. Nothing here survives a process restart.
#[derive(Debug, Clone)]
pub struct VerificationSession {
    transaction_id: String,
    we_started_it: bool,
    sas_accepted: bool,
    offered_methods: Vec<VerificationMethod>,
    phase: Phase,
}

impl VerificationSession {
    /// Create a session in [`Phase::Started`].
    pub(crate) fn new(
        transaction_id: impl Into<String>,
        we_started_it: bool,
        offered_methods: Vec<VerificationMethod>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            we_started_it,
            sas_accepted: false,
            offered_methods,
            phase: Phase::Started,
        }
    }

    /// Transaction id minted by whichever side initiated.
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Whether this side initiated the verification. Set once at creation.
    pub fn we_started_it(&self) -> bool {
        self.we_started_it
    }

    /// Whether the operator confirmed the short auth string. Can only
    /// become true after the key-exchange step.
    pub fn sas_accepted(&self) -> bool {
        self.sas_accepted
    }

    /// Methods the peer advertised in its start event.
    pub fn offered_methods(&self) -> &[VerificationMethod] {
        &self.offered_methods
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the session reached a terminal phase.
    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Whether the session was canceled (by either side, or by mismatch).
    pub fn canceled(&self) -> bool {
        self.phase == Phase::Canceled
    }

    /// Whether the transport timed the transaction out.
    pub fn timed_out(&self) -> bool {
        self.phase == Phase::TimedOut
    }

    /// Whether the MAC exchange completed.
    pub fn verified(&self) -> bool {
        self.phase == Phase::Verified
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub(crate) fn mark_sas_accepted(&mut self) {
        debug_assert!(
            matches!(self.phase, Phase::AwaitingDecision),
            "sas_accepted before key exchange is a contract violation"
        );
        self.sas_accepted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_starts_non_terminal() {
        let session = VerificationSession::new("tx-1", false, vec![VerificationMethod::Emoji]);
        assert_eq!(session.phase(), Phase::Started);
        assert!(!session.is_terminal());
        assert!(!session.sas_accepted());
        assert!(!session.we_started_it());
    }

    #[test]
    fn exactly_the_three_end_phases_are_terminal() {
        assert!(Phase::Verified.is_terminal());
        assert!(Phase::Canceled.is_terminal());
        assert!(Phase::TimedOut.is_terminal());
        for phase in [Phase::Started, Phase::KeyShared, Phase::AwaitingDecision, Phase::Confirmed] {
            assert!(!phase.is_terminal());
        }
    }
}
