//! Message-source aggregation.
//!
//! Messages can come from three places, published in this order: whatever
//! was piped into the process, then the `-m` arguments. When neither is
//! present and the terminal is interactive, one message is read from the
//! keyboard. Empty messages are dropped rather than sent.

use std::io::{BufRead, IsTerminal, Read};

/// Gather the messages to publish.
///
/// `piped` is the pipe content when stdin was not a terminal; `keyboard`
/// is only consulted when there is no other source.
pub fn gather(
    cli_messages: Vec<String>,
    piped: Option<String>,
    keyboard: impl FnOnce() -> Option<String>,
) -> Vec<String> {
    let mut messages = Vec::new();

    if let Some(piped) = piped {
        messages.push(piped);
    }
    messages.extend(cli_messages);

    if messages.is_empty() {
        if let Some(typed) = keyboard() {
            messages.push(typed);
        }
    }

    messages.retain(|message| !message.trim().is_empty());
    messages
}

/// Read the whole pipe when stdin is not a terminal.
pub fn read_pipe() -> Option<String> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }
    let mut piped = String::new();
    match stdin.lock().read_to_string(&mut piped) {
        Ok(_) => Some(piped),
        Err(err) => {
            tracing::warn!(%err, "failed to read piped input");
            None
        },
    }
}

/// Prompt the keyboard for a single message. EOF yields an empty message,
/// which `gather` then drops.
#[allow(clippy::print_stdout)]
pub fn read_keyboard() -> Option<String> {
    use std::io::Write as _;

    print!("Enter message to send: ");
    std::io::stdout().flush().ok()?;

    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => Some(line.trim_end_matches('\n').to_owned()),
        Err(err) => {
            tracing::warn!(%err, "failed to read from keyboard");
            None
        },
    }
}
