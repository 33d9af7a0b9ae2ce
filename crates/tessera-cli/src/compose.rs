//! Message formatting.
//!
//! Four formats, mirroring the flags: plain text (default), HTML
//! passthrough, Markdown rendered to HTML, and code (fixed-width block).
//! When several flags are given, code wins over markdown wins over html.

use pulldown_cmark::{html, Parser};
use tessera_proto::{MessageContent, Msgtype};

/// How the message body should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Plain text, no formatted body.
    Text,
    /// Body is already HTML; send it alongside unchanged.
    Html,
    /// Body is Markdown; render to HTML.
    Markdown,
    /// Fixed-width block, for tables and ASCII art.
    Code,
}

impl Format {
    /// Pick the format from the command-line flags, applying precedence.
    pub fn from_flags(html: bool, markdown: bool, code: bool) -> Self {
        if code {
            Self::Code
        } else if markdown {
            Self::Markdown
        } else if html {
            Self::Html
        } else {
            Self::Text
        }
    }
}

/// Build room content for one message.
pub fn content(message: &str, format: Format, notice: bool) -> MessageContent {
    let msgtype = if notice { Msgtype::Notice } else { Msgtype::Text };
    match format {
        Format::Text => MessageContent::plain(msgtype, message),
        Format::Html => MessageContent::html(msgtype, message, message),
        Format::Code => {
            MessageContent::html(msgtype, message, format!("<pre><code>{message}</code></pre>"))
        },
        Format::Markdown => MessageContent::html(msgtype, message, render_markdown(message)),
    }
}

fn render_markdown(message: &str) -> String {
    let parser = Parser::new(message);
    let mut rendered = String::new();
    html::push_html(&mut rendered, parser);
    rendered
}
