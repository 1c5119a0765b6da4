//! POSIX shell quoting for command composition.

use std::borrow::Cow;

/// Quote a single word for `sh`.
///
/// NUL bytes cannot appear in a shell word; they are dropped.
pub fn quote(word: &str) -> String {
    match shlex::try_quote(word) {
        Ok(quoted) => quoted.into_owned(),
        Err(_) => {
            let cleaned = word.replace('\0', "");
            shlex::try_quote(&cleaned)
                .map(Cow::into_owned)
                .unwrap_or_else(|_| "''".to_string())
        }
    }
}

/// Quote every word and join with spaces.
pub fn join<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|w| quote(w.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
