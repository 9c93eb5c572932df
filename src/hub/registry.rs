//! The Registry's tables: live clients and the group index.
//!
//! Only the Registry task mutates these (under the write lock); delivery reads
//! them under the read lock. Every mutation keeps the invariant that a user in
//! any group subset is also in the live set.

use super::client::ClientHandle;
use crate::protocol::{GroupId, UserId};
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::protocol::Frame;

#[derive(Debug, Default)]
pub(crate) struct Tables {
    clients: HashMap<UserId, ClientHandle>,
    groups: HashMap<GroupId, HashSet<UserId>>,
    /// Reverse of `groups`, so removal touches only the user's own subsets.
    memberships: HashMap<UserId, HashSet<GroupId>>,
}

impl Tables {
    /// Add a client and index its group snapshot. Returns the client it replaced.
    pub(crate) fn register(&mut self, client: ClientHandle) -> Option<ClientHandle> {
        let replaced = self.remove_user(&client.user_id);

        let user_id = client.user_id.clone();
        let mut joined = HashSet::with_capacity(client.groups().len());
        for group_id in client.groups() {
            self.groups
                .entry(group_id.clone())
                .or_default()
                .insert(user_id.clone());
            joined.insert(group_id.clone());
        }
        self.memberships.insert(user_id.clone(), joined);
        self.clients.insert(user_id, client);

        replaced
    }

    /// Remove the client for `user_id` if it is still connection `conn_id`.
    ///
    /// A stale `conn_id` (the user has since reconnected) is a no-op, as is a
    /// user that is not registered.
    pub(crate) fn unregister(&mut self, user_id: &str, conn_id: Uuid) -> Option<ClientHandle> {
        match self.clients.get(user_id) {
            Some(current) if current.conn_id == conn_id => self.remove_user(user_id),
            _ => None,
        }
    }

    /// Add a live user to a group subset. Ignored for users who are not live.
    pub(crate) fn join_group(&mut self, user_id: &str, group_id: &str) -> bool {
        let Some(joined) = self.memberships.get_mut(user_id) else {
            return false;
        };
        if !joined.insert(group_id.to_string()) {
            return false;
        }
        self.groups
            .entry(group_id.to_string())
            .or_default()
            .insert(user_id.to_string());
        true
    }

    /// Remove a user from one group subset, dropping the subset if it empties.
    pub(crate) fn leave_group(&mut self, user_id: &str, group_id: &str) -> bool {
        let removed = self
            .memberships
            .get_mut(user_id)
            .is_some_and(|joined| joined.remove(group_id));
        if removed {
            self.detach(user_id, group_id);
        }
        removed
    }

    /// Empty every table, returning the clients that were live.
    pub(crate) fn drain(&mut self) -> Vec<ClientHandle> {
        self.groups.clear();
        self.memberships.clear();
        self.clients.drain().map(|(_, client)| client).collect()
    }

    fn remove_user(&mut self, user_id: &str) -> Option<ClientHandle> {
        let client = self.clients.remove(user_id)?;
        if let Some(joined) = self.memberships.remove(user_id) {
            for group_id in &joined {
                self.detach(user_id, group_id);
            }
        }
        Some(client)
    }

    fn detach(&mut self, user_id: &str, group_id: &str) {
        if let Some(members) = self.groups.get_mut(group_id) {
            members.remove(user_id);
            if members.is_empty() {
                self.groups.remove(group_id);
            }
        }
    }

    pub(crate) fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub(crate) fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub(crate) fn contains(&self, user_id: &str) -> bool {
        self.clients.contains_key(user_id)
    }

    pub(crate) fn group_members(&self, group_id: &str) -> Option<&HashSet<UserId>> {
        self.groups.get(group_id)
    }

    pub(crate) fn client(&self, user_id: &str) -> Option<&ClientHandle> {
        self.clients.get(user_id)
    }

    /// Outbound senders of a group's live members, minus `exclude`.
    pub(crate) fn group_targets(
        &self,
        group_id: &str,
        exclude: Option<&str>,
    ) -> Vec<mpsc::Sender<Frame>> {
        let Some(members) = self.groups.get(group_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|id| Some(id.as_str()) != exclude)
            .filter_map(|id| self.clients.get(id))
            .map(|client| client.outbound().clone())
            .collect()
    }

    /// Outbound senders of every live client, minus `exclude`.
    pub(crate) fn all_targets(&self, exclude: Option<&str>) -> Vec<mpsc::Sender<Frame>> {
        self.clients
            .iter()
            .filter(|(id, _)| Some(id.as_str()) != exclude)
            .map(|(_, client)| client.outbound().clone())
            .collect()
    }

    /// Whether every indexed group member is live and both indexes agree.
    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        let forward_ok = self.groups.iter().all(|(group_id, members)| {
            !members.is_empty()
                && members.iter().all(|user_id| {
                    self.clients.contains_key(user_id)
                        && self
                            .memberships
                            .get(user_id)
                            .is_some_and(|joined| joined.contains(group_id))
                })
        });
        let reverse_ok = self.memberships.iter().all(|(user_id, joined)| {
            self.clients.contains_key(user_id)
                && joined.iter().all(|group_id| {
                    self.groups
                        .get(group_id)
                        .is_some_and(|members| members.contains(user_id))
                })
        });
        forward_ok && reverse_ok && self.memberships.len() == self.clients.len()
    }
}
