use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::HubError;

/// Longest message body, in Unicode scalar values, that the hub retains.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Sender recorded on notices the hub writes itself.
pub const SYSTEM_SENDER: &str = "system";

/// Group every user is enrolled in on join unless configured otherwise.
pub const DEFAULT_GROUP_NAME: &str = "General";

pub const THREAD_KEY_DELIMITER: &str = "::";

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(ConnectionId);
id_newtype!(MessageId);

// Names deserialize through `parse`, so a persisted or wire value is held to
// the same trimmed, non-blank rule as one typed by a user.
macro_rules! name_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl TryFrom<String> for $name {
            type Error = HubError;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> Self {
                name.0
            }
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

name_newtype!(DisplayName);
name_newtype!(GroupName);

impl DisplayName {
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(HubError::InvalidIdentity(
                "display name cannot be empty".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn system() -> Self {
        Self(SYSTEM_SENDER.to_string())
    }
}

impl GroupName {
    pub fn parse(raw: &str) -> Result<Self, HubError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(HubError::InvalidGroupName(
                "group name cannot be empty".into(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn general() -> Self {
        Self(DEFAULT_GROUP_NAME.to_string())
    }
}

/// Order-independent identifier for the private thread between two people.
///
/// Participants are sorted by byte order, escaped so that the delimiter can
/// never appear inside a component, and joined with [`THREAD_KEY_DELIMITER`].
/// Names without `:` or `\` produce the plain `a::b` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadKey(String);

impl ThreadKey {
    pub fn between(a: &DisplayName, b: &DisplayName) -> Result<Self, HubError> {
        if a == b {
            return Err(HubError::InvalidIdentity(
                "cannot open a private thread with yourself".into(),
            ));
        }
        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self(format!(
            "{}{THREAD_KEY_DELIMITER}{}",
            escape_component(low.as_str()),
            escape_component(high.as_str())
        )))
    }

    /// Rebuilds a key read back from storage. Any key that decodes to two
    /// distinct participants maps to the key [`ThreadKey::between`] gives that
    /// pair, so `bob::alice` comes back as `alice::bob`.
    pub fn from_raw(raw: &str) -> Option<Self> {
        let (a, b) = Self(raw.to_string()).participants()?;
        Self::between(&a, &b).ok()
    }

    pub fn participants(&self) -> Option<(DisplayName, DisplayName)> {
        let mut parts = Vec::with_capacity(2);
        let mut current = String::new();
        let mut chars = self.0.chars();
        while let Some(ch) = chars.next() {
            match ch {
                '\\' => current.push(chars.next()?),
                ':' => {
                    if chars.next()? != ':' {
                        return None;
                    }
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            }
        }
        parts.push(current);

        let [first, second]: [String; 2] = parts.try_into().ok()?;
        Some((DisplayName::parse(&first).ok()?, DisplayName::parse(&second).ok()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch == '\\' || ch == ':' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatKind {
    Group,
    Private,
}

/// Address of a conversation inside the hub. Groups and private threads live
/// in separate namespaces, so a group may share its name with a user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConversationRef {
    Group(GroupName),
    Private(ThreadKey),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageTarget {
    Group { group: GroupName },
    Private { to: DisplayName },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user: DisplayName,
    pub text: String,
    pub ts: i64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub system: bool,
    #[serde(flatten)]
    pub target: MessageTarget,
}

impl Message {
    pub fn new(user: DisplayName, text: String, ts: i64, target: MessageTarget) -> Self {
        Self {
            id: MessageId::new(),
            user,
            text,
            ts,
            system: false,
            target,
        }
    }

    pub fn system_notice(text: String, ts: i64, target: MessageTarget) -> Self {
        Self {
            system: true,
            ..Self::new(DisplayName::system(), text, ts, target)
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Rejects blank input and truncates the rest to `max_chars` scalar values.
pub fn prepare_text(raw: &str, max_chars: usize) -> Result<String, HubError> {
    if raw.trim().is_empty() {
        return Err(HubError::EmptyMessage);
    }
    Ok(match raw.char_indices().nth(max_chars) {
        Some((cut, _)) => raw[..cut].to_string(),
        None => raw.to_string(),
    })
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
