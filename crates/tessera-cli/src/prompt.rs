//! Terminal implementation of the SAS human checkpoint.

#![allow(clippy::print_stdout)]

use std::io::{BufRead, Write as _};

use tessera_core::{SasDecision, SasPrompt};
use tessera_proto::SasSymbol;

/// Prompt on the controlling terminal.
///
/// Fails closed: anything other than an explicit `y`/`yes` counts as a
/// mismatch, including EOF and read errors.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    /// Create a terminal prompt.
    pub fn new() -> Self {
        Self
    }

    fn read_answer() -> Option<String> {
        print!("Do the emoji on both devices match? [y/N] ");
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        Some(line)
    }
}

impl SasPrompt for TerminalPrompt {
    fn decide(&mut self, transaction_id: &str, symbols: &[SasSymbol]) -> SasDecision {
        println!("\nCompare the emoji with the other device (transaction {transaction_id}):\n");
        for symbol in symbols {
            print!("  {} ({})", symbol.glyph, symbol.name);
        }
        println!("\n");

        match Self::read_answer() {
            Some(answer) if is_affirmative(&answer) => SasDecision::Match,
            _ => SasDecision::Mismatch,
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_yes_is_affirmative() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative("Yes\n"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("maybe"));
        assert!(!is_affirmative("yep"));
    }
}
