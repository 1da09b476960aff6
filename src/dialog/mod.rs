// file: src/dialog/mod.rs
// version: 1.1.0
// guid: a9b0c1d2-e3f4-5678-9012-345678abcdef

//! Interactive prompt layer
//!
//! All user interaction goes through the [`Prompter`] trait so the input
//! collection logic can be driven by a scripted implementation in tests.
//! The real implementation wraps `inquire`; Esc or Ctrl-C on any prompt
//! aborts the whole run as a user cancellation (exit code 0).

use inquire::{Confirm, Select, Text};

use crate::error::{PrepError, Result};

/// Menu, text and confirmation prompts used while collecting inputs
pub trait Prompter {
    /// Show a single-choice menu and return the index of the chosen item
    fn select(&mut self, title: &str, items: &[String], default: usize) -> Result<usize>;

    /// Ask for a free-text value with a prefilled default
    fn text(&mut self, title: &str, default: &str) -> Result<String>;

    /// Ask a yes/no question
    fn confirm(&mut self, title: &str, default: bool) -> Result<bool>;
}

/// Terminal prompter backed by `inquire`
pub struct InquirePrompter;

impl Prompter for InquirePrompter {
    fn select(&mut self, title: &str, items: &[String], default: usize) -> Result<usize> {
        let choice = Select::new(title, items.to_vec())
            .with_starting_cursor(default.min(items.len().saturating_sub(1)))
            .with_page_size(14)
            .without_filtering()
            .with_help_message("↑↓ to move, ENTER to select, ESC to abort")
            .raw_prompt_skippable()?;
        match choice {
            Some(option) => Ok(option.index),
            None => Err(PrepError::Cancelled),
        }
    }

    fn text(&mut self, title: &str, default: &str) -> Result<String> {
        let value = Text::new(title)
            .with_default(default)
            .with_help_message("ENTER to accept, ESC to abort")
            .prompt_skippable()?;
        match value {
            Some(value) => Ok(value.trim().to_string()),
            None => Err(PrepError::Cancelled),
        }
    }

    fn confirm(&mut self, title: &str, default: bool) -> Result<bool> {
        let answer = Confirm::new(title)
            .with_default(default)
            .with_help_message("y/n, ESC to abort")
            .prompt_skippable()?;
        match answer {
            Some(answer) => Ok(answer),
            None => Err(PrepError::Cancelled),
        }
    }
}

/// Scripted prompter for unit tests: answers are consumed in order
#[cfg(test)]
#[derive(Default)]
pub struct ScriptedPrompter {
    selects: std::collections::VecDeque<usize>,
    texts: std::collections::VecDeque<String>,
    confirms: std::collections::VecDeque<bool>,
    /// Prompt titles seen, for asserting which prompts fired
    pub log: Vec<String>,
}

#[cfg(test)]
impl ScriptedPrompter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_select(mut self, index: usize) -> Self {
        self.selects.push_back(index);
        self
    }

    pub fn push_text(mut self, value: &str) -> Self {
        self.texts.push_back(value.to_string());
        self
    }

    pub fn push_confirm(mut self, value: bool) -> Self {
        self.confirms.push_back(value);
        self
    }
}

#[cfg(test)]
impl Prompter for ScriptedPrompter {
    fn select(&mut self, title: &str, items: &[String], _default: usize) -> Result<usize> {
        self.log.push(title.to_string());
        match self.selects.pop_front() {
            Some(index) if index < items.len() => Ok(index),
            Some(index) => Err(PrepError::prompt(format!(
                "scripted index {index} out of range for '{title}'"
            ))),
            None => Err(PrepError::Cancelled),
        }
    }

    fn text(&mut self, title: &str, _default: &str) -> Result<String> {
        self.log.push(title.to_string());
        self.texts.pop_front().ok_or(PrepError::Cancelled)
    }

    fn confirm(&mut self, title: &str, _default: bool) -> Result<bool> {
        self.log.push(title.to_string());
        self.confirms.pop_front().ok_or(PrepError::Cancelled)
    }
}
