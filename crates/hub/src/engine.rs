use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use shared::{
    domain::{
        prepare_text, ChatKind, ConnectionId, ConversationRef, DisplayName, GroupName, Message,
        MessageTarget, ThreadKey,
    },
    error::HubError,
    protocol::{ChatListPayload, ChatRef, ClientRequest, GroupSummary, PrivateMessagePayload, ServerEvent},
};
use storage::{HubSnapshot, SnapshotStore};
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::{
    config::HubConfig,
    directory::{ConversationDirectory, GroupPolicy},
    identity::{IdentityProvider, SelfDeclared},
    persist::write_snapshot,
    presence,
    registry::IdentityRegistry,
    transport::{Recipients, Transport},
};

/// Where a connection is in its lifecycle. Connections the hub has never
/// seen, or has already seen disconnect, report `Anonymous`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Identified(DisplayName),
}

/// Wall-clock millis that never run backwards within a process.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: i64,
}

impl MonotonicClock {
    fn now_millis(&mut self) -> i64 {
        self.last = self.last.max(Utc::now().timestamp_millis());
        self.last
    }

    fn advance_to(&mut self, floor: i64) {
        self.last = self.last.max(floor);
    }
}

struct HubState {
    registry: IdentityRegistry,
    directory: ConversationDirectory,
    /// Identified connections and the name they joined under. A connection
    /// whose name was taken over by a newer one stays identified here until
    /// it disconnects, but no longer resolves through the registry.
    sessions: HashMap<ConnectionId, DisplayName>,
    clock: MonotonicClock,
}

impl HubState {
    fn identity_of(&self, connection: ConnectionId) -> Result<DisplayName, HubError> {
        self.sessions
            .get(&connection)
            .cloned()
            .ok_or(HubError::NotIdentified)
    }
}

/// The routing engine. All registry and directory state sits behind one lock;
/// every operation below is a single critical section that mutates state and
/// enqueues its events before releasing it, so each conversation is delivered
/// in the order it was appended.
pub struct Hub {
    state: Mutex<HubState>,
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityProvider>,
    config: HubConfig,
    dirty: watch::Sender<u64>,
}

impl Hub {
    pub fn new(config: HubConfig, transport: Arc<dyn Transport>) -> Self {
        let mut directory = ConversationDirectory::new(config.history_capacity);
        directory.ensure_group(&config.default_group);
        let (dirty, _) = watch::channel(0);

        Self {
            state: Mutex::new(HubState {
                registry: IdentityRegistry::default(),
                directory,
                sessions: HashMap::new(),
                clock: MonotonicClock::default(),
            }),
            transport,
            identity: Arc::new(SelfDeclared),
            config,
            dirty,
        }
    }

    pub fn with_identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = identity;
        self
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Loads persisted groups and threads. Meant to run once, before any
    /// connection is accepted.
    pub async fn restore(&self, snapshot: HubSnapshot) {
        let mut state = self.state.lock().await;
        state.directory.restore(snapshot);
        state.directory.ensure_group(&self.config.default_group);
        if let Some(latest) = state.directory.latest_timestamp() {
            state.clock.advance_to(latest);
        }
        info!(
            groups = state.directory.group_count(),
            threads = state.directory.thread_count(),
            "restored hub snapshot"
        );
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        self.state.lock().await.directory.snapshot()
    }

    /// Writes the current state immediately, bypassing the persister's debounce.
    pub async fn flush(&self, store: &dyn SnapshotStore) -> Result<(), HubError> {
        let snapshot = self.snapshot().await;
        write_snapshot(store, &snapshot, &self.config).await
    }

    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.dirty.subscribe()
    }

    fn mark_dirty(&self) {
        self.dirty.send_modify(|generation| *generation += 1);
    }

    fn publish(&self, recipients: Recipients, event: ServerEvent) {
        self.transport.publish(recipients, event);
    }

    async fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().await
    }

    pub async fn handle(&self, connection: ConnectionId, request: ClientRequest) -> Result<(), HubError> {
        match request {
            ClientRequest::Join { name } => self.join(connection, &name).await.map(drop),
            ClientRequest::CreateGroup { name } => self.create_group(connection, &name).await,
            ClientRequest::JoinGroup { name } => self.request_join_group(connection, &name).await,
            ClientRequest::SendPrivate { to, text } => {
                self.send_to_private(connection, &to, &text).await
            }
            ClientRequest::SendGroup { group, text } => {
                self.send_to_group(connection, &group, &text).await
            }
            ClientRequest::Typing { chat, is_typing } => {
                self.set_typing(connection, &chat, is_typing).await
            }
            ClientRequest::LoadPrivate { with_user } => self
                .load_history(connection, &ChatRef::Private(with_user))
                .await
                .map(drop),
            ClientRequest::LoadGroup { group } => self
                .load_history(connection, &ChatRef::Group(group))
                .await
                .map(drop),
            ClientRequest::GetChatList {} => self.chat_list(connection).await.map(drop),
        }
    }

    /// Anonymous → Identified. Takes over the name if another connection holds it.
    pub async fn join(&self, connection: ConnectionId, claimed: &str) -> Result<DisplayName, HubError> {
        let name = self.identity.authenticate(claimed)?;
        let default_group = self.config.default_group.clone();

        let mut guard = self.lock().await;
        let state = &mut *guard;

        state.sessions.insert(connection, name.clone());
        if let Some(replaced) = state.registry.register(name.clone(), connection) {
            info!(%name, %connection, %replaced, "display name taken over by a new connection");
        }
        state
            .directory
            .join_group(&default_group, &name, GroupPolicy::GetOrCreate)?;

        let chat_list = chat_list_for(state, Some(&name));
        self.publish(
            Recipients::Connection(connection),
            ServerEvent::ChatList(chat_list),
        );
        self.publish(Recipients::Everyone, presence::presence_event(&state.registry));
        self.publish(Recipients::Everyone, ServerEvent::ChatListUpdate);

        let notice = Message::system_notice(
            format!("{name} joined"),
            state.clock.now_millis(),
            MessageTarget::Group {
                group: default_group.clone(),
            },
        );
        self.append_and_fan_out_group(state, &default_group, notice)?;
        drop(guard);

        self.mark_dirty();
        info!(%connection, %name, "user joined");
        Ok(name)
    }

    pub async fn create_group(&self, connection: ConnectionId, raw_name: &str) -> Result<(), HubError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let user = state.identity_of(connection)?;
        let group = GroupName::parse(raw_name)?;

        state.directory.create_group(&group, &user)?;
        self.publish(Recipients::Everyone, ServerEvent::ChatListUpdate);
        self.publish(
            Recipients::Connection(connection),
            ServerEvent::toast(format!("Created group \"{group}\"")),
        );
        drop(guard);

        self.mark_dirty();
        info!(%user, group = %group, "group created");
        Ok(())
    }

    pub async fn request_join_group(&self, connection: ConnectionId, raw_name: &str) -> Result<(), HubError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let user = state.identity_of(connection)?;
        let group_name = GroupName::parse(raw_name)?;

        let added = state
            .directory
            .join_group(&group_name, &user, GroupPolicy::MustExist)?;
        if !added {
            debug!(%user, group = %group_name, "already a member");
            return Ok(());
        }

        if let Some(group) = state.directory.group(&group_name) {
            let recipients = presence::online_members(&state.registry, group);
            self.publish(
                Recipients::Connections(recipients),
                ServerEvent::toast(format!("{user} joined {group_name}")),
            );
        }
        self.publish(Recipients::Everyone, ServerEvent::ChatListUpdate);
        drop(guard);

        self.mark_dirty();
        info!(%user, group = %group_name, "joined group");
        Ok(())
    }

    pub async fn send_to_group(
        &self,
        connection: ConnectionId,
        raw_group: &str,
        raw_text: &str,
    ) -> Result<(), HubError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let user = state.identity_of(connection)?;
        let group_name = GroupName::parse(raw_group)?;
        let text = prepare_text(raw_text, self.config.max_message_chars)?;

        let group = state
            .directory
            .group(&group_name)
            .ok_or_else(|| HubError::NoSuchGroup(group_name.to_string()))?;
        if !group.is_member(&user) {
            return Err(HubError::NotAMember(group_name.to_string()));
        }

        let message = Message::new(
            user,
            text,
            state.clock.now_millis(),
            MessageTarget::Group {
                group: group_name.clone(),
            },
        );
        self.append_and_fan_out_group(state, &group_name, message)?;
        drop(guard);

        self.mark_dirty();
        Ok(())
    }

    pub async fn send_to_private(
        &self,
        connection: ConnectionId,
        raw_peer: &str,
        raw_text: &str,
    ) -> Result<(), HubError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let user = state.identity_of(connection)?;
        let peer = DisplayName::parse(raw_peer)?;
        let text = prepare_text(raw_text, self.config.max_message_chars)?;
        let key = ConversationDirectory::resolve_private_key(&user, &peer)?;

        let message = Message::new(
            user,
            text,
            state.clock.now_millis(),
            MessageTarget::Private { to: peer.clone() },
        );
        state
            .directory
            .append(&ConversationRef::Private(key), message.clone())?;

        self.publish(
            Recipients::Connection(connection),
            ServerEvent::PrivateMessage(PrivateMessagePayload {
                message: message.clone(),
                mine: Some(true),
            }),
        );
        match state.registry.lookup(&peer) {
            Some(peer_connection) => self.publish(
                Recipients::Connection(peer_connection),
                ServerEvent::PrivateMessage(PrivateMessagePayload {
                    message,
                    mine: None,
                }),
            ),
            None => debug!(%peer, "private peer offline; message kept in history only"),
        }
        drop(guard);

        self.mark_dirty();
        Ok(())
    }

    pub async fn set_typing(
        &self,
        connection: ConnectionId,
        chat: &ChatRef,
        is_typing: bool,
    ) -> Result<(), HubError> {
        let guard = self.lock().await;
        let user = guard.identity_of(connection)?;

        match chat {
            ChatRef::Group(raw_group) => {
                let group_name = GroupName::parse(raw_group)?;
                let group = guard
                    .directory
                    .group(&group_name)
                    .ok_or_else(|| HubError::NoSuchGroup(group_name.to_string()))?;
                if !group.is_member(&user) {
                    return Err(HubError::NotAMember(group_name.to_string()));
                }
                let recipients = presence::group_typing_recipients(&guard.registry, group, &user);
                self.publish(
                    Recipients::Connections(recipients),
                    presence::group_typing_event(&group_name, &user, is_typing),
                );
            }
            ChatRef::Private(raw_peer) => {
                let peer = DisplayName::parse(raw_peer)?;
                ConversationDirectory::resolve_private_key(&user, &peer)?;
                if let Some(peer_connection) = guard.registry.lookup(&peer) {
                    self.publish(
                        Recipients::Connection(peer_connection),
                        presence::private_typing_event(&user, is_typing),
                    );
                }
            }
        }
        Ok(())
    }

    /// Sends the bounded tail of a conversation to the caller and returns it.
    /// Group history needs no membership; private history is always the
    /// caller's own thread with `peer`.
    pub async fn load_history(&self, connection: ConnectionId, chat: &ChatRef) -> Result<Vec<Message>, HubError> {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let user = state.identity_of(connection)?;
        let page = self.config.history_page_size;

        let (kind, id, messages) = match chat {
            ChatRef::Group(raw_group) => {
                let group = GroupName::parse(raw_group)?;
                let messages = state.directory.tail(&ConversationRef::Group(group.clone()), page);
                (ChatKind::Group, group.to_string(), messages)
            }
            ChatRef::Private(raw_peer) => {
                let peer = DisplayName::parse(raw_peer)?;
                let key = ConversationDirectory::resolve_private_key(&user, &peer)?;
                let messages = state.directory.ensure_thread(&key).history().tail(page);
                (ChatKind::Private, peer.to_string(), messages)
            }
        };

        self.publish(
            Recipients::Connection(connection),
            ServerEvent::History {
                kind,
                id,
                messages: messages.clone(),
            },
        );
        Ok(messages)
    }

    /// Works for anonymous connections too: they see every online name and
    /// no group as joined.
    pub async fn chat_list(&self, connection: ConnectionId) -> Result<ChatListPayload, HubError> {
        let guard = self.lock().await;
        let viewer = guard.sessions.get(&connection);
        let payload = chat_list_for(&guard, viewer);
        self.publish(
            Recipients::Connection(connection),
            ServerEvent::ChatList(payload.clone()),
        );
        Ok(payload)
    }

    /// Identified → Disconnected. Safe to call more than once, and for
    /// connections whose name has since been taken over. Group membership
    /// is kept.
    pub async fn disconnect(&self, connection: ConnectionId) {
        let mut guard = self.lock().await;
        let state = &mut *guard;
        let session = state.sessions.remove(&connection);

        match state.registry.unregister(connection) {
            Some(name) => {
                self.publish(Recipients::Everyone, presence::presence_event(&state.registry));
                self.publish(Recipients::Everyone, ServerEvent::ChatListUpdate);
                info!(%connection, %name, "user went offline");
            }
            None => {
                if let Some(name) = session {
                    debug!(%connection, %name, "superseded connection closed");
                }
            }
        }
    }

    pub async fn session_state(&self, connection: ConnectionId) -> SessionState {
        match self.lock().await.sessions.get(&connection) {
            Some(name) => SessionState::Identified(name.clone()),
            None => SessionState::Anonymous,
        }
    }

    pub async fn lookup(&self, name: &DisplayName) -> Option<ConnectionId> {
        self.lock().await.registry.lookup(name)
    }

    pub async fn list_online(&self) -> Vec<DisplayName> {
        self.lock().await.registry.list_online()
    }

    pub async fn list_online_contacts(&self, excluding: &DisplayName) -> Vec<DisplayName> {
        self.lock().await.registry.list_online_except(Some(excluding))
    }

    pub async fn list_groups(&self, viewer: Option<&DisplayName>) -> Vec<GroupSummary> {
        self.lock().await.directory.list_groups(viewer)
    }

    pub async fn group_members(&self, group: &GroupName) -> Option<Vec<DisplayName>> {
        let state = self.lock().await;
        state
            .directory
            .group(group)
            .map(|group| group.members().cloned().collect())
    }

    pub async fn tail(&self, conversation: &ConversationRef, n: usize) -> Vec<Message> {
        self.lock().await.directory.tail(conversation, n)
    }

    pub async fn history_len(&self, conversation: &ConversationRef) -> usize {
        self.lock().await.directory.history_len(conversation)
    }

    pub async fn resolve_private_key(&self, a: &str, b: &str) -> Result<ThreadKey, HubError> {
        let a = DisplayName::parse(a)?;
        let b = DisplayName::parse(b)?;
        ConversationDirectory::resolve_private_key(&a, &b)
    }

    fn append_and_fan_out_group(
        &self,
        state: &mut HubState,
        group_name: &GroupName,
        message: Message,
    ) -> Result<(), HubError> {
        state
            .directory
            .append(&ConversationRef::Group(group_name.clone()), message.clone())?;
        if let Some(group) = state.directory.group(group_name) {
            let recipients = presence::online_members(&state.registry, group);
            self.publish(
                Recipients::Connections(recipients),
                ServerEvent::GroupMessage(message),
            );
        }
        Ok(())
    }
}

fn chat_list_for(state: &HubState, viewer: Option<&DisplayName>) -> ChatListPayload {
    ChatListPayload {
        contacts: state.registry.list_online_except(viewer),
        groups: state.directory.list_groups(viewer),
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
