// src/prompt.rs

//! Interactive questions
//!
//! The install pipeline asks before replacing the current-version link and
//! may ask for an install reason. Both go through [`Prompt`] so batch runs
//! and tests can answer without a terminal.

use std::io::{self, BufRead, Write};

pub trait Prompt {
    /// Yes/no question; an empty answer picks `default_yes`
    fn confirm(&mut self, question: &str, default_yes: bool) -> bool;

    /// Free-text question; `None` when no answer could be read
    fn read_line(&mut self, question: &str) -> Option<String>;
}

/// Asks on stdout and reads stdin
#[derive(Debug, Default)]
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&mut self, question: &str, default_yes: bool) -> bool {
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        match self.read_line(&format!("{} {} ", question, hint)) {
            Some(answer) => match answer.trim().to_lowercase().as_str() {
                "" => default_yes,
                "y" | "yes" => true,
                _ => false,
            },
            None => default_yes,
        }
    }

    fn read_line(&mut self, question: &str) -> Option<String> {
        print!("{}", question);
        io::stdout().flush().ok()?;

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

/// Fixed answers, for batch mode (`SIT_FAST_INSTALL=TRUE`) and tests
#[derive(Debug, Clone, Default)]
pub struct AutoPrompt {
    pub answer: bool,
    pub reason: Option<String>,
    /// Questions asked so far
    pub asked: Vec<String>,
}

impl AutoPrompt {
    pub fn yes() -> Self {
        Self {
            answer: true,
            ..Self::default()
        }
    }

    pub fn no() -> Self {
        Self::default()
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

impl Prompt for AutoPrompt {
    fn confirm(&mut self, question: &str, _default_yes: bool) -> bool {
        self.asked.push(question.to_string());
        self.answer
    }

    fn read_line(&mut self, question: &str) -> Option<String> {
        self.asked.push(question.to_string());
        self.reason.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_prompt_records_questions() {
        let mut prompt = AutoPrompt::no().with_reason("FIX: crash on empty input");
        assert!(!prompt.confirm("Update symlink?", true));
        assert_eq!(prompt.read_line("Reason: ").as_deref(), Some("FIX: crash on empty input"));
        assert_eq!(prompt.asked.len(), 2);
        assert!(AutoPrompt::yes().confirm("Continue?", false));
    }
}
