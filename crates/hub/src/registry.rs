use std::collections::{BTreeMap, HashMap};

use shared::domain::{ConnectionId, DisplayName};

/// Who is online, and on which connection.
///
/// Both directions are indexed so that a disconnect can be resolved from the
/// connection alone. The two maps always describe the same set of bindings.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    by_name: BTreeMap<DisplayName, ConnectionId>,
    by_connection: HashMap<ConnectionId, DisplayName>,
}

impl IdentityRegistry {
    /// Binds `name` to `connection`. A previous binding for the name is
    /// replaced without complaint and its connection is returned; a previous
    /// name held by this connection is released.
    pub fn register(&mut self, name: DisplayName, connection: ConnectionId) -> Option<ConnectionId> {
        if let Some(previous_name) = self.by_connection.remove(&connection) {
            if previous_name != name {
                self.by_name.remove(&previous_name);
            }
        }

        let replaced = self
            .by_name
            .insert(name.clone(), connection)
            .filter(|previous| *previous != connection);
        if let Some(previous) = replaced {
            self.by_connection.remove(&previous);
        }
        self.by_connection.insert(connection, name);
        replaced
    }

    /// Drops the binding held by `connection`. Returns the released name, or
    /// `None` if the connection held nothing (never joined, already gone, or
    /// superseded by a newer connection under the same name).
    pub fn unregister(&mut self, connection: ConnectionId) -> Option<DisplayName> {
        let name = self.by_connection.remove(&connection)?;
        if self.by_name.get(&name) != Some(&connection) {
            return None;
        }
        self.by_name.remove(&name);
        Some(name)
    }

    pub fn lookup(&self, name: &DisplayName) -> Option<ConnectionId> {
        self.by_name.get(name).copied()
    }

    /// Online names in sorted order.
    pub fn list_online(&self) -> Vec<DisplayName> {
        self.by_name.keys().cloned().collect()
    }

    pub fn list_online_except(&self, excluding: Option<&DisplayName>) -> Vec<DisplayName> {
        self.by_name
            .keys()
            .filter(|name| Some(*name) != excluding)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
