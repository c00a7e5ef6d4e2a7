use serde::{Deserialize, Serialize};

use crate::domain::{ChatKind, DisplayName, GroupName, Message};

/// A conversation as the client names it: `{ "type": "group", "id": "General" }`
/// or `{ "type": "private", "id": "<peer name>" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ChatRef {
    Group(String),
    Private(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientRequest {
    Join {
        name: String,
    },
    CreateGroup {
        name: String,
    },
    JoinGroup {
        name: String,
    },
    SendPrivate {
        to: String,
        text: String,
    },
    SendGroup {
        group: String,
        text: String,
    },
    Typing {
        chat: ChatRef,
        #[serde(default)]
        is_typing: bool,
    },
    LoadPrivate {
        with_user: String,
    },
    LoadGroup {
        group: String,
    },
    GetChatList {},
}

impl ClientRequest {
    /// Parses one text frame. A frame without a `payload`, such as a bare
    /// `{"type":"get_chat_list"}`, is read as carrying an empty one.
    pub fn from_frame(text: &str) -> serde_json::Result<Self> {
        let mut frame: serde_json::Value = serde_json::from_str(text)?;
        if let Some(fields) = frame.as_object_mut() {
            fields
                .entry("payload")
                .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_value(frame)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub name: GroupName,
    pub member_count: usize,
    pub joined: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatListPayload {
    pub contacts: Vec<DisplayName>,
    pub groups: Vec<GroupSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessagePayload {
    #[serde(flatten)]
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mine: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    ChatList(ChatListPayload),
    ChatListUpdate,
    History {
        #[serde(rename = "type")]
        kind: ChatKind,
        id: String,
        messages: Vec<Message>,
    },
    PrivateMessage(PrivateMessagePayload),
    GroupMessage(Message),
    Typing {
        chat: ChatRef,
        user: DisplayName,
        is_typing: bool,
    },
    Presence {
        online_names: Vec<DisplayName>,
    },
    Toast {
        text: String,
    },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChatList(_) => "chat_list",
            Self::ChatListUpdate => "chat_list_update",
            Self::History { .. } => "history",
            Self::PrivateMessage(_) => "private_message",
            Self::GroupMessage(_) => "group_message",
            Self::Typing { .. } => "typing",
            Self::Presence { .. } => "presence",
            Self::Toast { .. } => "toast",
        }
    }

    pub fn toast(text: impl Into<String>) -> Self {
        Self::Toast { text: text.into() }
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
