//! Command-line client internals.
//!
//! The binary in `main.rs` stays thin; the pieces that benefit from tests
//! live here:
//!
//! - [`compose`]: turn a raw message plus format flags into room content
//! - [`sources`]: aggregate messages from pipe, keyboard and arguments
//! - [`prompt`]: the terminal implementation of the SAS human checkpoint
//! - [`setup`]: the first-run credentials wizard

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod compose;
pub mod prompt;
pub mod setup;
pub mod sources;
