use std::io::{self, BufRead, Write};

use colored::*;
use xrd_janitor_core::{Decider, Decision};

/// Reads reconciliation choices from standard input. Unknown answers are
/// asked again; end of input counts as quit.
pub struct TerminalDecider;

impl Decider for TerminalDecider {
    fn decide(&mut self, what: &str, count: usize) -> Decision {
        let stdin = io::stdin();
        let mut input = String::new();
        loop {
            input.clear();
            print!(
                "Found {} {} entries. {}elete, {}ist or {}uit? ",
                count.to_string().yellow(),
                what,
                "[d]".bold(),
                "[l]".bold(),
                "[q]".bold()
            );
            if io::stdout().flush().is_err() {
                return Decision::Skip;
            }
            match stdin.lock().read_line(&mut input) {
                Ok(0) | Err(_) => return Decision::Skip,
                Ok(_) => {}
            }
            if let Some(decision) = Decision::parse(&input) {
                return decision;
            }
        }
    }
}

pub fn prompt_confirm(prompt: &str, default: Option<bool>) -> io::Result<bool> {
    let mut input = String::new();

    loop {
        input.clear();

        match default {
            Some(true) => print!("{} (Y/n): ", prompt),
            Some(false) | None => print!("{} (y/N): ", prompt),
        }
        io::stdout().flush()?;

        if io::stdin().read_line(&mut input)? == 0 {
            return Ok(default.unwrap_or(false));
        }

        match input.trim().to_uppercase().as_str() {
            "Y" => return Ok(true),
            "N" => return Ok(false),
            "" => match default {
                Some(default) => return Ok(default),
                None => continue,
            },
            _ => continue,
        }
    }
}
