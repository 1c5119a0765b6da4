use colored::Colorize;
use converge::{Event, ResultRecord};
use shellkit::{CredentialPrompt, Status};
use std::io::IsTerminal;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Shorten a blake3 digest for display.
fn short(value: &str) -> &str {
    if value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
        &value[..12]
    } else {
        value
    }
}

/// One-line rendering of a change event.
pub fn format_event(event: &Event) -> String {
    let show = |value: &Option<String>| value.as_deref().map_or("-", short).to_string();
    let marker = if event.privileged { " (sudo)" } else { "" };
    format!(
        "{} {} {}: {} → {}{}",
        event.resource.kind,
        event.resource.id,
        event.attribute,
        show(&event.old),
        show(&event.new),
        marker
    )
}

/// Bus observer that prints every change.
pub fn print_event(event: &Event) {
    println!("{} {}", "~".cyan(), format_event(event));
}

/// Print a command outcome from the results channel.
pub fn print_result(record: &ResultRecord) {
    let line = format!("{} {}", record.operation, record.arguments.join(" "));
    match record.result.status() {
        Status::Applied => success(&line),
        Status::NoChange => dim(&format!("{line} (no change)")),
        Status::Failed => {
            let reason = record
                .result
                .error()
                .map_or_else(|| record.result.stderr().trim().to_string(), ToString::to_string);
            error(&format!("{line}: {reason}"));
        }
    }
}

/// Asks on the terminal with hidden input.
///
/// Answers nothing when stdin is not a terminal.
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn ask(&mut self, prompt: &str) -> Option<String> {
        if !std::io::stdin().is_terminal() {
            log::debug!("Not asking {prompt:?}: stdin is not a terminal");
            return None;
        }
        dialoguer::Password::new()
            .with_prompt(prompt.trim_end_matches([':', ' ']))
            .allow_empty_password(true)
            .interact()
            .ok()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use converge::ResourceRef;

    fn event(old: Option<&str>, new: Option<&str>, privileged: bool) -> Event {
        Event::new(
            ResourceRef::new("web1", "file", "/etc/motd"),
            "mode",
            old.map(str::to_string),
            new.map(str::to_string),
            privileged,
        )
    }

    #[test]
    fn test_format_event() {
        assert_eq!(
            format_event(&event(Some("644"), Some("755"), false)),
            "file /etc/motd mode: 644 → 755"
        );
        assert_eq!(
            format_event(&event(None, Some("600"), true)),
            "file /etc/motd mode: - → 600 (sudo)"
        );
    }

    #[test]
    fn test_digests_are_shortened() {
        let digest = "a".repeat(64);
        let text = format_event(&event(Some(&digest), Some("abc"), false));
        assert!(text.contains("aaaaaaaaaaaa → abc"));
        assert!(!text.contains(&digest));
    }
}
