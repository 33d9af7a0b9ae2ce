//! Interactive device-verification engine.
//!
//! This crate drives the short-authentication-string (SAS) handshake used to
//! verify a peer device: a strict three-step exchange (start, key share,
//! MAC) with a human checkpoint between the second and third step where the
//! operator compares emoji on both screens.
//!
//! # Architecture
//!
//! The engine is a pure state machine that:
//! - Receives decoded [`VerificationEvent`]s from the caller, one at a time
//! - Drives every outbound step through an injected [`VerificationTransport`]
//! - Asks an injected [`SasPrompt`] for the operator's match/mismatch answer
//!
//! No I/O happens here. The session layer owns key material, wire encoding,
//! and delivery; the caller owns the receive loop. That split keeps the
//! handshake logic deterministic and testable with mock capabilities.
//!
//! # Components
//!
//! - [`EventDispatcher`]: entry point; owns the transaction-id → session map
//! - [`VerificationSession`]: per-transaction identity and phase
//! - [`VerificationTransport`] / [`SasPrompt`]: injected capabilities

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod dispatcher;
mod error;
mod machine;
mod session;
mod traits;

pub use dispatcher::EventDispatcher;
pub use error::{TransportError, VerifyError};
pub use session::{Phase, VerificationSession};
pub use tessera_proto::{CancelCode, SasSymbol, VerificationEvent, VerificationMethod};
pub use traits::{SasDecision, SasPrompt, VerificationTransport};
