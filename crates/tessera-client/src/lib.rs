//! Session layer for the Tessera command-line client.
//!
//! Everything the verification core treats as an external collaborator
//! lives here:
//!
//! - [`Credentials`]: the on-disk login record, with the two-stage path
//!   lookup (given location first, then the user config directory)
//! - [`HttpSession`]: the thin JSON-over-HTTP homeserver client (login,
//!   room send, to-device send, long-poll sync)
//! - [`SasStore`]: per-transaction key agreement and MAC material,
//!   implementing the core's `VerificationTransport` capability
//!
//! The store is deliberately I/O-free: outbound envelopes accumulate in an
//! outbox that the async receive loop drains and posts. That keeps the
//! whole verification path testable without a homeserver.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod credentials;
mod http;
mod sas;

pub use credentials::{Credentials, CredentialsError};
pub use http::{HttpSession, LoginOutcome, SessionError, SyncBatch};
pub use sas::{SasStore, EMOJI_TABLE};
