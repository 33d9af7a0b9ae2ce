//! Verification state machine.
//!
//! One instance is constructed per event by the dispatcher. The handshake
//! is a strict start, key, MAC sequence with the human checkpoint between
//! key and MAC, and a cancel transition available from every non-terminal
//! phase.
//!
//! Two rules shape every handler:
//!
//! - Outbound calls happen before the phase advances. A failed transport
//!   call leaves the session exactly where it was; there is no retry here,
//!   the peer re-drives the handshake or times out.
//! - An event that is not legal for the current phase is logged and
//!   dropped. Nothing in this module is fatal to the caller.

use tessera_proto::{CancelCode, VerificationMethod};

use crate::{
    error::VerifyError,
    session::{Phase, VerificationSession},
    traits::{SasDecision, SasPrompt, VerificationTransport},
};

/// Per-event view over the injected capabilities.
pub(crate) struct StateMachine<'a, T, P> {
    transport: &'a mut T,
    prompt: &'a mut P,
}

impl<'a, T: VerificationTransport, P: SasPrompt> StateMachine<'a, T, P> {
    pub(crate) fn new(transport: &'a mut T, prompt: &'a mut P) -> Self {
        Self { transport, prompt }
    }

    /// Handle a start event for an untracked transaction id.
    ///
    /// Returns the new session if the peer offered a method we can drive;
    /// otherwise no session is retained and no outbound action happens.
    pub(crate) fn on_start(
        &mut self,
        transaction_id: &str,
        offered_methods: Vec<VerificationMethod>,
    ) -> Result<Option<VerificationSession>, VerifyError> {
        if !offered_methods.contains(&VerificationMethod::Emoji) {
            tracing::info!(
                transaction_id,
                ?offered_methods,
                "peer offered no emoji verification, ignoring start"
            );
            return Ok(None);
        }

        self.transport.accept(transaction_id)?;
        let key_share = self.transport.share_key(transaction_id)?;
        self.transport.send_to_device(key_share)?;

        let mut session = VerificationSession::new(transaction_id, false, offered_methods);
        session.set_phase(Phase::KeyShared);
        tracing::info!(transaction_id, "verification accepted, key share sent");
        Ok(Some(session))
    }

    /// Handle the peer's key event: derive the short auth string, block on
    /// the operator, and either confirm or reject.
    pub(crate) fn on_key(&mut self, session: &mut VerificationSession) -> Result<(), VerifyError> {
        if session.phase() != Phase::KeyShared {
            drop_out_of_sequence(session, "key");
            return Ok(());
        }

        let transaction_id = session.transaction_id().to_owned();
        let symbols = self.transport.render_short_auth_string(&transaction_id)?;
        session.set_phase(Phase::AwaitingDecision);

        // Blocks the dispatch worker until the operator answers. Events for
        // other transactions queue behind this and are handled afterward in
        // arrival order.
        match self.prompt.decide(&transaction_id, &symbols) {
            SasDecision::Match => {
                self.transport.confirm_match(&transaction_id)?;
                session.mark_sas_accepted();
                session.set_phase(Phase::Confirmed);
                tracing::info!(transaction_id, "short auth string confirmed by operator");
            },
            SasDecision::Mismatch => {
                self.transport.cancel(&transaction_id, true)?;
                session.set_phase(Phase::Canceled);
                tracing::warn!(transaction_id, "short auth string rejected, canceled");
            },
        }
        Ok(())
    }

    /// Handle the peer's MAC event: send our MAC and conclude.
    pub(crate) fn on_mac(&mut self, session: &mut VerificationSession) -> Result<(), VerifyError> {
        if session.phase() != Phase::Confirmed {
            drop_out_of_sequence(session, "mac");
            return Ok(());
        }

        let transaction_id = session.transaction_id().to_owned();
        let mac = self.transport.get_mac(&transaction_id)?;
        self.transport.send_to_device(mac)?;
        session.set_phase(Phase::Verified);
        tracing::info!(transaction_id, "device verified");
        Ok(())
    }

    /// Handle a cancel event from the peer (or a transport timeout surfaced
    /// as one). Unconditionally honored: the session goes terminal even if
    /// acknowledging the cancellation fails.
    pub(crate) fn on_cancel(
        &mut self,
        session: &mut VerificationSession,
        code: &CancelCode,
    ) -> Result<(), VerifyError> {
        let transaction_id = session.transaction_id().to_owned();

        if *code == CancelCode::Timeout {
            session.set_phase(Phase::TimedOut);
            tracing::info!(transaction_id, "verification timed out");
            return Ok(());
        }

        session.set_phase(Phase::Canceled);
        tracing::info!(transaction_id, code = code.as_str(), "verification canceled by peer");
        if let Err(err) = self.transport.cancel(&transaction_id, false) {
            // Already terminal; the acknowledgement is best effort.
            tracing::warn!(transaction_id, %err, "failed to acknowledge cancellation");
        }
        Ok(())
    }
}

fn drop_out_of_sequence(session: &VerificationSession, kind: &str) {
    tracing::warn!(
        transaction_id = session.transaction_id(),
        phase = ?session.phase(),
        kind,
        "event out of sequence for phase, dropping"
    );
}
