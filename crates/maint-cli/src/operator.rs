//! Interactive operator on the terminal

use maint_core::{Decision, Operator};
use std::io::{self, BufRead, Write};

/// Asks on stderr and reads the answer from stdin
///
/// End of input counts as quit.
#[derive(Debug, Default)]
pub(crate) struct TerminalOperator;

impl Operator for TerminalOperator {
    fn confirm(&self, prompt: &str) -> Decision {
        let stdin = io::stdin();
        let mut stderr = io::stderr();
        loop {
            // A broken terminal cannot answer; treat it like end of input.
            let asked = write!(stderr, "{prompt} [y(yes), n(no), q(quit)] ")
                .and_then(|()| stderr.flush());
            if asked.is_err() {
                return Decision::Quit;
            }
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => return Decision::Quit,
                Ok(_) => {}
            }
            if let Some(decision) = parse_answer(&line) {
                return decision;
            }
        }
    }
}

fn parse_answer(line: &str) -> Option<Decision> {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => Some(Decision::Yes),
        "n" | "no" => Some(Decision::No),
        "q" | "quit" => Some(Decision::Quit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_are_case_insensitive() {
        assert_eq!(parse_answer("Y\n"), Some(Decision::Yes));
        assert_eq!(parse_answer(" no "), Some(Decision::No));
        assert_eq!(parse_answer("QUIT"), Some(Decision::Quit));
        assert_eq!(parse_answer("maybe"), None);
    }
}
