//! Room message content.
//!
//! The homeserver accepts plain-text bodies with an optional HTML rendering
//! alongside. Markdown and code formatting are handled by the caller; by the
//! time content reaches this type the HTML (if any) is already rendered.

use serde::{Deserialize, Serialize};

/// Format label attached when a formatted body is present.
pub const HTML_FORMAT: &str = "custom.html";

/// Message kind: ordinary text or an automated notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Msgtype {
    /// A message typed by a person.
    #[serde(rename = "m.text")]
    Text,
    /// A message produced by an automaton; clients render these dimmed.
    #[serde(rename = "m.notice")]
    Notice,
}

/// Body of one room message event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageContent {
    /// Message kind.
    pub msgtype: Msgtype,
    /// Plain-text body, always present.
    pub body: String,
    /// Format label, present iff `formatted_body` is.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub format: Option<String>,
    /// HTML rendering of the body.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub formatted_body: Option<String>,
}

impl MessageContent {
    /// Plain-text content with no formatted rendering.
    pub fn plain(msgtype: Msgtype, body: impl Into<String>) -> Self {
        Self { msgtype, body: body.into(), format: None, formatted_body: None }
    }

    /// Content carrying an HTML rendering next to the plain body.
    pub fn html(msgtype: Msgtype, body: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            msgtype,
            body: body.into(),
            format: Some(HTML_FORMAT.to_owned()),
            formatted_body: Some(html.into()),
        }
    }
}
