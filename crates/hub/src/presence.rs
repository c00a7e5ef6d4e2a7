//! Presence snapshots and typing relays. Nothing here is persisted.

use shared::{
    domain::{ConnectionId, DisplayName, GroupName},
    protocol::{ChatRef, ServerEvent},
};

use crate::{directory::Group, registry::IdentityRegistry};

pub fn presence_event(registry: &IdentityRegistry) -> ServerEvent {
    ServerEvent::Presence {
        online_names: registry.list_online(),
    }
}

/// Live connections of every member of `group` that is currently online.
pub fn online_members(registry: &IdentityRegistry, group: &Group) -> Vec<ConnectionId> {
    group
        .members()
        .filter_map(|member| registry.lookup(member))
        .collect()
}

pub fn group_typing_recipients(
    registry: &IdentityRegistry,
    group: &Group,
    typist: &DisplayName,
) -> Vec<ConnectionId> {
    group
        .members()
        .filter(|member| *member != typist)
        .filter_map(|member| registry.lookup(member))
        .collect()
}

pub fn group_typing_event(group: &GroupName, typist: &DisplayName, is_typing: bool) -> ServerEvent {
    ServerEvent::Typing {
        chat: ChatRef::Group(group.to_string()),
        user: typist.clone(),
        is_typing,
    }
}

/// The recipient has the thread open under the typist's name, so the chat
/// reference points back at the typist.
pub fn private_typing_event(typist: &DisplayName, is_typing: bool) -> ServerEvent {
    ServerEvent::Typing {
        chat: ChatRef::Private(typist.to_string()),
        user: typist.clone(),
        is_typing,
    }
}
