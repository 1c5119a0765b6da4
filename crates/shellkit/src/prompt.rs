//! Credential prompts.
//!
//! The session asks for a credential when a login is refused or when sudo
//! wants a password. What "asking" means is up to the caller: a terminal
//! prompt, a secrets store, or a canned answer in tests.

use std::collections::VecDeque;

/// Source of credentials for authentication retries and sudo prompts.
pub trait CredentialPrompt: Send {
    /// Ask for a credential. `None` means no answer is available.
    fn ask(&mut self, prompt: &str) -> Option<String>;
}

/// Prompt that never answers.
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn ask(&mut self, _prompt: &str) -> Option<String> {
        None
    }
}

/// Prompt that hands out a fixed list of answers in order.
#[derive(Debug, Default)]
pub struct FixedPrompt {
    answers: VecDeque<String>,
    asked: Vec<String>,
}

impl FixedPrompt {
    /// Create a prompt that answers with `answers`, one per question.
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
        }
    }

    /// Questions asked so far.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl CredentialPrompt for FixedPrompt {
    fn ask(&mut self, prompt: &str) -> Option<String> {
        self.asked.push(prompt.to_string());
        self.answers.pop_front()
    }
}
