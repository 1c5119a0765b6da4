//! Change events and the records published to the results channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use shellkit::CommandResult;
use std::fmt;

/// Identity of a resource on a host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceRef {
    /// Host name
    pub host: String,
    /// Resource type, singular ("file", "directory")
    pub kind: String,
    /// Identity within the type, usually a path
    pub id: String,
}

impl ResourceRef {
    pub fn new(host: impl Into<String>, kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Type-level topic, the pluralized kind ("files", "directories").
    pub fn topic(&self) -> String {
        pluralize(&self.kind)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.kind, self.id, self.host)
    }
}

/// English plural for a resource type name.
pub fn pluralize(word: &str) -> String {
    let consonant_y = word.len() > 1
        && word.ends_with('y')
        && !word[..word.len() - 1].ends_with(['a', 'e', 'i', 'o', 'u']);
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if word.ends_with(['s', 'x', 'z']) || word.ends_with("ch") || word.ends_with("sh") {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

/// One attribute change on one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub resource: ResourceRef,
    pub attribute: String,
    pub old: Option<String>,
    pub new: Option<String>,
    /// Whether the change was made with escalated privileges
    pub privileged: bool,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        resource: ResourceRef,
        attribute: impl Into<String>,
        old: Option<String>,
        new: Option<String>,
        privileged: bool,
    ) -> Self {
        Self {
            resource,
            attribute: attribute.into(),
            old,
            new,
            privileged,
            timestamp: Utc::now(),
        }
    }

    /// Field name → value projection for audit serialization.
    pub fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "{} {}: {} -> {}",
            self.resource,
            self.attribute,
            show(&self.old),
            show(&self.new)
        )
    }
}

/// A command outcome as seen on the results channel.
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    pub operation: String,
    pub arguments: Vec<String>,
    pub result: CommandResult,
    pub timestamp: DateTime<Utc>,
}

impl ResultRecord {
    pub fn new(operation: impl Into<String>, arguments: Vec<String>, result: CommandResult) -> Self {
        Self {
            operation: operation.into(),
            arguments,
            result,
            timestamp: Utc::now(),
        }
    }

    pub fn attributes(&self) -> serde_json::Map<String, serde_json::Value> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        }
    }
}
