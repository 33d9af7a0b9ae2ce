//! Event dispatcher: the core's single inbound entry point.

use std::collections::HashMap;

use tessera_proto::VerificationEvent;

use crate::{
    machine::StateMachine,
    session::VerificationSession,
    traits::{SasPrompt, VerificationTransport},
};

/// Routes inbound verification events to per-transaction sessions.
///
/// Owns the only shared mutable state in the core: the transaction-id →
/// session map. All mutation goes through [`Self::handle_event`], invoked
/// once per event from a single receive loop, so events for one transaction
/// are handled strictly in arrival order and never concurrently.
///
/// Nothing escapes this boundary: every handler error is logged with its
/// transaction context and swallowed, so one malformed or ill-timed event
/// cannot terminate the event stream.
pub struct EventDispatcher<T, P> {
    sessions: HashMap<String, VerificationSession>,
    transport: T,
    prompt: P,
}

impl<T: VerificationTransport, P: SasPrompt> EventDispatcher<T, P> {
    /// Create a dispatcher around the injected capabilities.
    pub fn new(transport: T, prompt: P) -> Self {
        Self { sessions: HashMap::new(), transport, prompt }
    }

    /// Handle one inbound verification event.
    ///
    /// Infallible by contract: protocol errors, out-of-sequence events and
    /// transport failures are all logged and absorbed here.
    pub fn handle_event(&mut self, event: VerificationEvent) {
        let transaction_id = event.transaction_id().to_owned();

        if let Some(session) = self.sessions.get(&transaction_id) {
            if session.is_terminal() {
                tracing::debug!(
                    transaction_id,
                    phase = ?session.phase(),
                    "event for terminal transaction, ignoring"
                );
                return;
            }
        }

        let mut machine = StateMachine::new(&mut self.transport, &mut self.prompt);
        let result = match event {
            VerificationEvent::Start { offered_methods, .. } => {
                if self.sessions.contains_key(&transaction_id) {
                    tracing::warn!(transaction_id, "duplicate start for tracked transaction");
                    return;
                }
                match machine.on_start(&transaction_id, offered_methods) {
                    Ok(Some(session)) => {
                        self.sessions.insert(transaction_id.clone(), session);
                        Ok(())
                    },
                    Ok(None) => Ok(()),
                    Err(err) => Err(err),
                }
            },
            VerificationEvent::Cancel { code, .. } => {
                match self.sessions.get_mut(&transaction_id) {
                    Some(session) => machine.on_cancel(session, &code),
                    None => {
                        log_unknown(&transaction_id, "cancel");
                        Ok(())
                    },
                }
            },
            VerificationEvent::Key { .. } => match self.sessions.get_mut(&transaction_id) {
                Some(session) => machine.on_key(session),
                None => {
                    log_unknown(&transaction_id, "key");
                    Ok(())
                },
            },
            VerificationEvent::Mac { .. } => match self.sessions.get_mut(&transaction_id) {
                Some(session) => machine.on_mac(session),
                None => {
                    log_unknown(&transaction_id, "mac");
                    Ok(())
                },
            },
        };

        if let Err(err) = result {
            tracing::error!(transaction_id, %err, "verification event handling failed");
        }
    }

    /// Look up a session by transaction id.
    pub fn session(&self, transaction_id: &str) -> Option<&VerificationSession> {
        self.sessions.get(transaction_id)
    }

    /// Number of currently tracked transactions, terminal ones included.
    pub fn tracked_transactions(&self) -> usize {
        self.sessions.len()
    }

    /// Drop sessions that reached a terminal phase, returning their
    /// transaction ids so callers can release per-transaction state of
    /// their own. Late duplicates for an evicted transaction degrade to
    /// unknown-transaction no-ops.
    pub fn evict_terminal(&mut self) -> Vec<String> {
        let evicted: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.is_terminal())
            .map(|(txn, _)| txn.clone())
            .collect();
        for txn in &evicted {
            self.sessions.remove(txn);
        }
        evicted
    }

    /// Shared access to the injected transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Shared access to the injected prompt.
    pub fn prompt(&self) -> &P {
        &self.prompt
    }

    /// Exclusive access to the injected transport.
    ///
    /// The receive loop uses this to feed raw envelopes (key material, MAC
    /// payloads) into the transport before handing the decoded event to
    /// [`Self::handle_event`].
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

fn log_unknown(transaction_id: &str, kind: &str) {
    tracing::warn!(transaction_id, kind, "event for unknown transaction, ignoring");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;
    use tessera_proto::{
        CancelCode, SasSymbol, ToDeviceMessage, VerificationMethod, SAS_SYMBOL_COUNT,
    };

    use super::*;
    use crate::{
        error::TransportError,
        session::Phase,
        traits::{SasDecision, SasPrompt, VerificationTransport},
    };

    /// Everything the mock transport was asked to do, in order.
    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Accept(String),
        ShareKey(String),
        Send(String),
        Cancel(String, bool),
        Confirm(String),
        GetMac(String),
        Render(String),
    }

    #[derive(Default)]
    struct MockTransport {
        calls: Vec<Call>,
        /// Method name whose next invocation should fail.
        fail_on: Option<&'static str>,
    }

    impl MockTransport {
        fn failing(method: &'static str) -> Self {
            Self { calls: Vec::new(), fail_on: Some(method) }
        }

        fn fail_if(&self, method: &'static str) -> Result<(), TransportError> {
            if self.fail_on == Some(method) {
                return Err(TransportError::Delivery { reason: format!("{method} refused") });
            }
            Ok(())
        }

        fn envelope(kind: &str, transaction_id: &str) -> ToDeviceMessage {
            ToDeviceMessage {
                event_type: kind.to_owned(),
                to_user: "@peer:example.org".to_owned(),
                to_device: "PEERDEV".to_owned(),
                transaction_id: transaction_id.to_owned(),
                payload: serde_json::json!({}),
            }
        }
    }

    impl VerificationTransport for MockTransport {
        fn accept(&mut self, transaction_id: &str) -> Result<(), TransportError> {
            self.fail_if("accept")?;
            self.calls.push(Call::Accept(transaction_id.to_owned()));
            Ok(())
        }

        fn share_key(&mut self, transaction_id: &str) -> Result<ToDeviceMessage, TransportError> {
            self.fail_if("share_key")?;
            self.calls.push(Call::ShareKey(transaction_id.to_owned()));
            Ok(Self::envelope("verification.key", transaction_id))
        }

        fn send_to_device(&mut self, message: ToDeviceMessage) -> Result<(), TransportError> {
            self.fail_if("send_to_device")?;
            self.calls.push(Call::Send(message.event_type));
            Ok(())
        }

        fn cancel(&mut self, transaction_id: &str, reject: bool) -> Result<(), TransportError> {
            self.fail_if("cancel")?;
            self.calls.push(Call::Cancel(transaction_id.to_owned(), reject));
            Ok(())
        }

        fn confirm_match(&mut self, transaction_id: &str) -> Result<(), TransportError> {
            self.fail_if("confirm_match")?;
            self.calls.push(Call::Confirm(transaction_id.to_owned()));
            Ok(())
        }

        fn get_mac(&mut self, transaction_id: &str) -> Result<ToDeviceMessage, TransportError> {
            self.fail_if("get_mac")?;
            self.calls.push(Call::GetMac(transaction_id.to_owned()));
            Ok(Self::envelope("verification.mac", transaction_id))
        }

        fn render_short_auth_string(
            &self,
            transaction_id: &str,
        ) -> Result<Vec<SasSymbol>, TransportError> {
            self.fail_if("render")?;
            // Takes &self, so renders are not in the call log; tests that
            // care assert on the prompt's record instead.
            let _ = transaction_id;
            Ok(vec![SasSymbol { glyph: "🐶", name: "dog" }; SAS_SYMBOL_COUNT])
        }
    }

    /// Prompt that answers from a script; empty script fails closed.
    struct ScriptedPrompt {
        answers: Vec<SasDecision>,
        shown: Vec<(String, usize)>,
    }

    impl ScriptedPrompt {
        fn answering(answers: &[SasDecision]) -> Self {
            let mut answers = answers.to_vec();
            answers.reverse();
            Self { answers, shown: Vec::new() }
        }
    }

    impl SasPrompt for ScriptedPrompt {
        fn decide(&mut self, transaction_id: &str, symbols: &[SasSymbol]) -> SasDecision {
            self.shown.push((transaction_id.to_owned(), symbols.len()));
            self.answers.pop().unwrap_or(SasDecision::Mismatch)
        }
    }

    fn start(transaction_id: &str) -> VerificationEvent {
        VerificationEvent::Start {
            transaction_id: transaction_id.to_owned(),
            offered_methods: vec![VerificationMethod::Emoji, VerificationMethod::Decimal],
        }
    }

    fn key(transaction_id: &str) -> VerificationEvent {
        VerificationEvent::Key { transaction_id: transaction_id.to_owned() }
    }

    fn mac(transaction_id: &str) -> VerificationEvent {
        VerificationEvent::Mac { transaction_id: transaction_id.to_owned() }
    }

    fn cancel(transaction_id: &str, code: CancelCode) -> VerificationEvent {
        VerificationEvent::Cancel { transaction_id: transaction_id.to_owned(), code }
    }

    #[test]
    fn happy_path_reaches_verified() {
        let prompt = ScriptedPrompt::answering(&[SasDecision::Match]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        dispatcher.handle_event(start("tx-1"));
        assert_eq!(dispatcher.session("tx-1").unwrap().phase(), Phase::KeyShared);

        dispatcher.handle_event(key("tx-1"));
        let session = dispatcher.session("tx-1").unwrap();
        assert_eq!(session.phase(), Phase::Confirmed);
        assert!(session.sas_accepted());

        dispatcher.handle_event(mac("tx-1"));
        let session = dispatcher.session("tx-1").unwrap();
        assert!(session.verified());
        assert!(!session.canceled());
        assert!(!session.timed_out());

        // Exactly one confirm and one MAC send, in that order.
        let calls = &dispatcher.transport().calls;
        assert_eq!(
            *calls,
            vec![
                Call::Accept("tx-1".to_owned()),
                Call::ShareKey("tx-1".to_owned()),
                Call::Send("verification.key".to_owned()),
                Call::Confirm("tx-1".to_owned()),
                Call::GetMac("tx-1".to_owned()),
                Call::Send("verification.mac".to_owned()),
            ]
        );
    }

    #[test]
    fn operator_sees_the_full_short_auth_string() {
        let prompt = ScriptedPrompt::answering(&[SasDecision::Match]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        dispatcher.handle_event(start("tx-1"));
        dispatcher.handle_event(key("tx-1"));

        assert_eq!(dispatcher.prompt.shown, vec![("tx-1".to_owned(), SAS_SYMBOL_COUNT)]);
    }

    #[test]
    fn mismatch_cancels_with_reject_and_blocks_mac() {
        let prompt = ScriptedPrompt::answering(&[SasDecision::Mismatch]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        dispatcher.handle_event(start("tx-1"));
        dispatcher.handle_event(key("tx-1"));

        let session = dispatcher.session("tx-1").unwrap();
        assert!(session.canceled());
        assert!(!session.sas_accepted());
        assert!(dispatcher.transport().calls.contains(&Call::Cancel("tx-1".to_owned(), true)));

        // A late MAC event is a no-op.
        dispatcher.handle_event(mac("tx-1"));
        assert!(!dispatcher.transport().calls.iter().any(|c| matches!(c, Call::GetMac(_))));
        assert!(dispatcher.session("tx-1").unwrap().canceled());
    }

    #[test]
    fn empty_prompt_script_fails_closed() {
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        dispatcher.handle_event(start("tx-1"));
        dispatcher.handle_event(key("tx-1"));

        assert!(dispatcher.session("tx-1").unwrap().canceled());
    }

    #[test]
    fn start_without_emoji_creates_nothing() {
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        dispatcher.handle_event(VerificationEvent::Start {
            transaction_id: "tx-1".to_owned(),
            offered_methods: vec![
                VerificationMethod::Decimal,
                VerificationMethod::Other("sas.qr_code".to_owned()),
            ],
        });

        assert!(dispatcher.session("tx-1").is_none());
        assert!(dispatcher.transport().calls.is_empty());
    }

    #[test]
    fn cancel_is_honored_in_every_non_terminal_phase() {
        // KeyShared.
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);
        dispatcher.handle_event(start("tx-a"));
        dispatcher.handle_event(cancel("tx-a", CancelCode::User));
        let session = dispatcher.session("tx-a").unwrap();
        assert!(session.canceled());
        assert!(dispatcher.transport().calls.contains(&Call::Cancel("tx-a".to_owned(), false)));

        // Confirmed.
        let prompt = ScriptedPrompt::answering(&[SasDecision::Match]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);
        dispatcher.handle_event(start("tx-b"));
        dispatcher.handle_event(key("tx-b"));
        dispatcher.handle_event(cancel("tx-b", CancelCode::User));
        assert!(dispatcher.session("tx-b").unwrap().canceled());

        // Further events for a canceled transaction are no-ops.
        let calls_before = dispatcher.transport().calls.len();
        dispatcher.handle_event(mac("tx-b"));
        dispatcher.handle_event(key("tx-b"));
        assert_eq!(dispatcher.transport().calls.len(), calls_before);
        assert!(dispatcher.session("tx-b").unwrap().canceled());
    }

    #[test]
    fn timeout_code_marks_timed_out_without_outbound_ack() {
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);
        dispatcher.handle_event(start("tx-1"));
        let calls_before = dispatcher.transport().calls.len();

        dispatcher.handle_event(cancel("tx-1", CancelCode::Timeout));

        let session = dispatcher.session("tx-1").unwrap();
        assert!(session.timed_out());
        assert!(!session.canceled());
        assert_eq!(dispatcher.transport().calls.len(), calls_before);
    }

    #[test]
    fn unknown_transaction_events_are_noops() {
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        dispatcher.handle_event(key("tx-ghost"));
        dispatcher.handle_event(mac("tx-ghost"));
        dispatcher.handle_event(cancel("tx-ghost", CancelCode::User));

        assert_eq!(dispatcher.tracked_transactions(), 0);
        assert!(dispatcher.transport().calls.is_empty());
    }

    #[test]
    fn out_of_order_mac_is_dropped() {
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);
        dispatcher.handle_event(start("tx-1"));

        // MAC before key: unrecognized for this phase.
        dispatcher.handle_event(mac("tx-1"));

        let session = dispatcher.session("tx-1").unwrap();
        assert_eq!(session.phase(), Phase::KeyShared);
        assert!(!dispatcher.transport().calls.iter().any(|c| matches!(c, Call::GetMac(_))));
    }

    #[test]
    fn duplicate_start_is_dropped() {
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);
        dispatcher.handle_event(start("tx-1"));
        let calls_before = dispatcher.transport().calls.len();

        dispatcher.handle_event(start("tx-1"));

        assert_eq!(dispatcher.transport().calls.len(), calls_before);
        assert_eq!(dispatcher.session("tx-1").unwrap().phase(), Phase::KeyShared);
    }

    #[test]
    fn failed_share_key_retains_no_session() {
        let prompt = ScriptedPrompt::answering(&[]);
        let mut dispatcher = EventDispatcher::new(MockTransport::failing("share_key"), prompt);

        dispatcher.handle_event(start("tx-1"));

        assert!(dispatcher.session("tx-1").is_none());
    }

    #[test]
    fn failed_confirm_does_not_advance_phase() {
        let prompt = ScriptedPrompt::answering(&[SasDecision::Match]);
        let mut dispatcher = EventDispatcher::new(MockTransport::failing("confirm_match"), prompt);

        dispatcher.handle_event(start("tx-1"));
        dispatcher.handle_event(key("tx-1"));

        let session = dispatcher.session("tx-1").unwrap();
        assert_eq!(session.phase(), Phase::AwaitingDecision);
        assert!(!session.sas_accepted());
    }

    #[test]
    fn concurrent_transactions_are_independent() {
        let prompt = ScriptedPrompt::answering(&[SasDecision::Match, SasDecision::Mismatch]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        // Interleave two transactions arbitrarily.
        dispatcher.handle_event(start("tx-1"));
        dispatcher.handle_event(start("tx-2"));
        dispatcher.handle_event(key("tx-1"));
        dispatcher.handle_event(key("tx-2"));
        dispatcher.handle_event(mac("tx-1"));

        assert!(dispatcher.session("tx-1").unwrap().verified());
        assert!(dispatcher.session("tx-2").unwrap().canceled());
    }

    #[test]
    fn evict_terminal_drops_finished_sessions() {
        let prompt = ScriptedPrompt::answering(&[SasDecision::Match]);
        let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);

        dispatcher.handle_event(start("tx-1"));
        dispatcher.handle_event(start("tx-2"));
        dispatcher.handle_event(key("tx-1"));
        dispatcher.handle_event(mac("tx-1"));

        assert_eq!(dispatcher.evict_terminal(), vec!["tx-1".to_owned()]);
        assert!(dispatcher.session("tx-1").is_none());
        assert_eq!(dispatcher.session("tx-2").unwrap().phase(), Phase::KeyShared);

        // Late event for the evicted transaction degrades to unknown-id.
        dispatcher.handle_event(mac("tx-1"));
        assert!(dispatcher.session("tx-1").is_none());
    }

    /// One arbitrary step of a dispatch sequence.
    #[derive(Debug, Clone)]
    enum Step {
        Start(u8),
        Key(u8),
        Mac(u8),
        Cancel(u8),
        Timeout(u8),
    }

    fn step_strategy() -> impl Strategy<Value = Step> {
        (0u8..3, 0u8..5).prop_map(|(txn, kind)| match kind {
            0 => Step::Start(txn),
            1 => Step::Key(txn),
            2 => Step::Mac(txn),
            3 => Step::Cancel(txn),
            _ => Step::Timeout(txn),
        })
    }

    fn step_event(step: &Step) -> VerificationEvent {
        let txn = |n: &u8| format!("tx-{n}");
        match step {
            Step::Start(n) => start(&txn(n)),
            Step::Key(n) => key(&txn(n)),
            Step::Mac(n) => mac(&txn(n)),
            Step::Cancel(n) => cancel(&txn(n), CancelCode::User),
            Step::Timeout(n) => cancel(&txn(n), CancelCode::Timeout),
        }
    }

    proptest! {
        /// Oracle: once a transaction goes terminal its phase never moves
        /// again, whatever arrives afterward. No event sequence makes the
        /// dispatcher panic.
        #[test]
        fn terminal_phases_are_frozen(
            steps in proptest::collection::vec(step_strategy(), 1..40),
            answers in proptest::collection::vec(
                prop_oneof![Just(SasDecision::Match), Just(SasDecision::Mismatch)],
                0..40,
            ),
        ) {
            let prompt = ScriptedPrompt::answering(&answers);
            let mut dispatcher = EventDispatcher::new(MockTransport::default(), prompt);
            let mut frozen: HashMap<String, Phase> = HashMap::new();

            for step in &steps {
                dispatcher.handle_event(step_event(step));

                for (txn, phase) in &frozen {
                    let session = dispatcher.session(txn).unwrap();
                    prop_assert_eq!(session.phase(), *phase);
                }
                for n in 0u8..3 {
                    let txn = format!("tx-{n}");
                    if let Some(session) = dispatcher.session(&txn) {
                        if session.is_terminal() {
                            frozen.entry(txn).or_insert_with(|| session.phase());
                        }
                    }
                }
            }
        }
    }
}
