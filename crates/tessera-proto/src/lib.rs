//! Wire payload types for the Tessera messaging client.
//!
//! Tessera talks to a federated homeserver with JSON payloads. This crate
//! holds the serde types shared between the verification core, the session
//! layer, and the command-line binary:
//!
//! - [`VerificationEvent`]: inbound device-verification events, routed by
//!   transaction id
//! - [`ToDeviceMessage`]: the envelope for outbound device-to-device payloads
//! - [`MessageContent`]: room message bodies (text/notice, optional HTML)
//! - [`SasSymbol`]: one entry of the short-authentication-string display

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod content;
mod to_device;
mod verification;

pub use content::{MessageContent, Msgtype, HTML_FORMAT};
pub use to_device::{InboundEnvelope, ToDeviceMessage};
pub use verification::{
    CancelCode, SasSymbol, VerificationEvent, VerificationMethod, SAS_SYMBOL_COUNT,
};
