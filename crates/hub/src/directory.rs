use std::collections::{BTreeMap, BTreeSet};

use shared::{
    domain::{ConversationRef, DisplayName, GroupName, Message, ThreadKey},
    error::HubError,
    protocol::GroupSummary,
};
use storage::{GroupRecord, HubSnapshot, ThreadRecord};
use tracing::warn;

use crate::history::BoundedLog;

/// Whether a call site may bring a missing group into existence.
///
/// | Call site                          | Policy        |
/// |------------------------------------|---------------|
/// | default-group enrolment on `join`  | `GetOrCreate` |
/// | `join_group`                       | `MustExist`   |
/// | `send_group`, group `typing`       | `MustExist`   |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPolicy {
    GetOrCreate,
    MustExist,
}

#[derive(Debug)]
pub struct Group {
    members: BTreeSet<DisplayName>,
    history: BoundedLog,
}

impl Group {
    fn new(capacity: usize) -> Self {
        Self {
            members: BTreeSet::new(),
            history: BoundedLog::new(capacity),
        }
    }

    pub fn is_member(&self, name: &DisplayName) -> bool {
        self.members.contains(name)
    }

    pub fn members(&self) -> impl Iterator<Item = &DisplayName> {
        self.members.iter()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug)]
pub struct PrivateThread {
    history: BoundedLog,
}

impl PrivateThread {
    pub fn history(&self) -> &BoundedLog {
        &self.history
    }
}

/// Groups and private threads, each with its bounded history. Groups and
/// threads are never removed while the process runs.
#[derive(Debug)]
pub struct ConversationDirectory {
    capacity: usize,
    groups: BTreeMap<GroupName, Group>,
    threads: BTreeMap<ThreadKey, PrivateThread>,
}

impl ConversationDirectory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            groups: BTreeMap::new(),
            threads: BTreeMap::new(),
        }
    }

    pub fn ensure_group(&mut self, name: &GroupName) -> &mut Group {
        let capacity = self.capacity;
        self.groups
            .entry(name.clone())
            .or_insert_with(|| Group::new(capacity))
    }

    pub fn group(&self, name: &GroupName) -> Option<&Group> {
        self.groups.get(name)
    }

    /// Creates `name` with `creator` as its only member.
    pub fn create_group(&mut self, name: &GroupName, creator: &DisplayName) -> Result<(), HubError> {
        if self.groups.contains_key(name) {
            return Err(HubError::DuplicateGroup(name.to_string()));
        }
        self.ensure_group(name).members.insert(creator.clone());
        Ok(())
    }

    /// Adds `user` to the group. Returns `false` when they were already a member.
    pub fn join_group(
        &mut self,
        name: &GroupName,
        user: &DisplayName,
        policy: GroupPolicy,
    ) -> Result<bool, HubError> {
        let group = match policy {
            GroupPolicy::GetOrCreate => self.ensure_group(name),
            GroupPolicy::MustExist => self
                .groups
                .get_mut(name)
                .ok_or_else(|| HubError::NoSuchGroup(name.to_string()))?,
        };
        Ok(group.members.insert(user.clone()))
    }

    pub fn resolve_private_key(a: &DisplayName, b: &DisplayName) -> Result<ThreadKey, HubError> {
        ThreadKey::between(a, b)
    }

    /// Returns the thread for `key`, opening an empty one on first use.
    pub fn ensure_thread(&mut self, key: &ThreadKey) -> &mut PrivateThread {
        let capacity = self.capacity;
        self.threads
            .entry(key.clone())
            .or_insert_with(|| PrivateThread {
                history: BoundedLog::new(capacity),
            })
    }

    /// Sorted by group name; `joined` is relative to `viewer`.
    pub fn list_groups(&self, viewer: Option<&DisplayName>) -> Vec<GroupSummary> {
        self.groups
            .iter()
            .map(|(name, group)| GroupSummary {
                name: name.clone(),
                member_count: group.member_count(),
                joined: viewer.is_some_and(|viewer| group.is_member(viewer)),
            })
            .collect()
    }

    /// Groups must already exist; private threads are opened on demand.
    pub fn append(&mut self, conversation: &ConversationRef, message: Message) -> Result<(), HubError> {
        let log = match conversation {
            ConversationRef::Group(name) => {
                &mut self
                    .groups
                    .get_mut(name)
                    .ok_or_else(|| HubError::NoSuchGroup(name.to_string()))?
                    .history
            }
            ConversationRef::Private(key) => &mut self.ensure_thread(key).history,
        };
        log.append(message);
        Ok(())
    }

    /// The newest `n` messages of a conversation, oldest first. Unknown
    /// conversations read as empty.
    pub fn tail(&self, conversation: &ConversationRef, n: usize) -> Vec<Message> {
        match conversation {
            ConversationRef::Group(name) => self.groups.get(name).map(|g| g.history.tail(n)),
            ConversationRef::Private(key) => self.threads.get(key).map(|t| t.history.tail(n)),
        }
        .unwrap_or_default()
    }

    pub fn history_len(&self, conversation: &ConversationRef) -> usize {
        match conversation {
            ConversationRef::Group(name) => self.groups.get(name).map(|g| g.history.len()),
            ConversationRef::Private(key) => self.threads.get(key).map(|t| t.history.len()),
        }
        .unwrap_or(0)
    }

    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            groups: self
                .groups
                .iter()
                .map(|(name, group)| {
                    (
                        name.clone(),
                        GroupRecord {
                            members: group.members.iter().cloned().collect(),
                            messages: group.history.to_vec(),
                        },
                    )
                })
                .collect(),
            private_threads: self
                .threads
                .iter()
                .map(|(key, thread)| {
                    (
                        key.clone(),
                        ThreadRecord {
                            messages: thread.history.to_vec(),
                        },
                    )
                })
                .collect(),
        }
    }

    /// Replaces the directory contents with `snapshot`.
    ///
    /// A thread stored under a reversed key is moved to the canonical key for
    /// its pair, merged by timestamp with any history already there. Keys that
    /// do not decode to two distinct names are dropped.
    pub fn restore(&mut self, snapshot: HubSnapshot) {
        self.groups.clear();
        self.threads.clear();

        for (name, record) in snapshot.groups {
            self.groups.insert(
                name,
                Group {
                    members: record.members.into_iter().collect(),
                    history: BoundedLog::from_messages(self.capacity, record.messages),
                },
            );
        }

        let mut threads: BTreeMap<ThreadKey, Vec<Message>> = BTreeMap::new();
        for (raw_key, record) in snapshot.private_threads {
            let Some(key) = ThreadKey::from_raw(raw_key.as_str()) else {
                warn!(thread = %raw_key, "dropping private thread with unreadable key");
                continue;
            };
            if key != raw_key {
                warn!(thread = %raw_key, canonical = %key, "re-keying private thread");
            }
            threads.entry(key).or_default().extend(record.messages);
        }
        for (key, mut messages) in threads {
            messages.sort_by_key(|message| message.ts);
            self.threads.insert(
                key,
                PrivateThread {
                    history: BoundedLog::from_messages(self.capacity, messages),
                },
            );
        }
    }

    /// Newest timestamp across every retained message.
    pub fn latest_timestamp(&self) -> Option<i64> {
        let group_ts = self.groups.values().filter_map(|g| g.history.last());
        let thread_ts = self.threads.values().filter_map(|t| t.history.last());
        group_ts.chain(thread_ts).map(|m| m.ts).max()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
