use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared::domain::{DisplayName, GroupName, Message, ThreadKey};

/// Everything the hub needs to come back after a restart. Presence is
/// deliberately absent: nobody is online when the process starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubSnapshot {
    #[serde(default)]
    pub groups: BTreeMap<GroupName, GroupRecord>,
    #[serde(default)]
    pub private_threads: BTreeMap<ThreadKey, ThreadRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    #[serde(default)]
    pub members: Vec<DisplayName>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl HubSnapshot {
    pub fn message_count(&self) -> usize {
        let group_messages: usize = self.groups.values().map(|g| g.messages.len()).sum();
        let thread_messages: usize = self
            .private_threads
            .values()
            .map(|t| t.messages.len())
            .sum();
        group_messages + thread_messages
    }
}
