use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::{Adapter, AdapterError, BroadcastEnvelope, DeliveryHandler};

#[derive(Default)]
struct MemoryState {
    /// `(nsp, room) -> sids`
    room_members: HashMap<(String, String), HashSet<String>>,
    /// `(nsp, sid) -> rooms`
    socket_rooms: HashMap<(String, String), HashSet<String>>,
}

/// All operations are in-process. `broadcast`/`broadcast_to_room` are
/// no-ops because in a single-node deployment the caller has already
/// fanned out locally before asking the adapter to propagate.
pub struct MemoryAdapter {
    state: RwLock<MemoryState>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
        }
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn init(&self, _server_id: &str) {}

    async fn close(&self) {
        let mut state = self.state.write().unwrap();
        state.room_members.clear();
        state.socket_rooms.clear();
    }

    async fn add_socket_to_room(&self, nsp: &str, sid: &str, room: &str) -> Result<(), AdapterError> {
        let mut state = self.state.write().unwrap();
        state
            .room_members
            .entry((nsp.to_owned(), room.to_owned()))
            .or_default()
            .insert(sid.to_owned());
        state
            .socket_rooms
            .entry((nsp.to_owned(), sid.to_owned()))
            .or_default()
            .insert(room.to_owned());
        Ok(())
    }

    async fn remove_socket_from_room(
        &self,
        nsp: &str,
        sid: &str,
        room: &str,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.write().unwrap();
        if let Some(members) = state
            .room_members
            .get_mut(&(nsp.to_owned(), room.to_owned()))
        {
            members.remove(sid);
            if members.is_empty() {
                state.room_members.remove(&(nsp.to_owned(), room.to_owned()));
            }
        }
        if let Some(rooms) = state
            .socket_rooms
            .get_mut(&(nsp.to_owned(), sid.to_owned()))
        {
            rooms.remove(room);
        }
        Ok(())
    }

    async fn remove_socket_from_all_rooms(&self, nsp: &str, sid: &str) -> Result<(), AdapterError> {
        let mut state = self.state.write().unwrap();
        let rooms = state
            .socket_rooms
            .remove(&(nsp.to_owned(), sid.to_owned()))
            .unwrap_or_default();
        for room in rooms {
            if let Some(members) = state.room_members.get_mut(&(nsp.to_owned(), room.clone())) {
                members.remove(sid);
                if members.is_empty() {
                    state.room_members.remove(&(nsp.to_owned(), room));
                }
            }
        }
        Ok(())
    }

    async fn sockets_in_room(&self, nsp: &str, room: &str) -> Vec<String> {
        let state = self.state.read().unwrap();
        state
            .room_members
            .get(&(nsp.to_owned(), room.to_owned()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn rooms_for_socket(&self, nsp: &str, sid: &str) -> Vec<String> {
        let state = self.state.read().unwrap();
        state
            .socket_rooms
            .get(&(nsp.to_owned(), sid.to_owned()))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn broadcast(&self, _envelope: BroadcastEnvelope) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn broadcast_to_room(
        &self,
        _room: &str,
        _envelope: BroadcastEnvelope,
    ) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn subscribe(&self, _handler: DeliveryHandler) {}
    async fn unsubscribe(&self) {}

    async fn server_ids(&self) -> Vec<String> {
        Vec::new()
    }
    async fn register_server(&self) {}
    async fn unregister_server(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn room_symmetry_holds_after_join_and_leave() {
        let adapter = MemoryAdapter::new();
        adapter.add_socket_to_room("/", "s1", "room-a").await.unwrap();
        assert_eq!(adapter.sockets_in_room("/", "room-a").await, vec!["s1"]);
        assert_eq!(adapter.rooms_for_socket("/", "s1").await, vec!["room-a"]);

        adapter.remove_socket_from_room("/", "s1", "room-a").await.unwrap();
        assert!(adapter.sockets_in_room("/", "room-a").await.is_empty());
        assert!(adapter.rooms_for_socket("/", "s1").await.is_empty());
    }

    #[tokio::test]
    async fn remove_from_all_rooms_releases_every_membership() {
        let adapter = MemoryAdapter::new();
        adapter.add_socket_to_room("/", "s1", "a").await.unwrap();
        adapter.add_socket_to_room("/", "s1", "b").await.unwrap();
        adapter.remove_socket_from_all_rooms("/", "s1").await.unwrap();
        assert!(adapter.sockets_in_room("/", "a").await.is_empty());
        assert!(adapter.sockets_in_room("/", "b").await.is_empty());
        assert!(adapter.rooms_for_socket("/", "s1").await.is_empty());
    }

    #[tokio::test]
    async fn namespaces_do_not_leak_membership_into_each_other() {
        let adapter = MemoryAdapter::new();
        adapter.add_socket_to_room("/chat", "s1", "a").await.unwrap();
        assert!(adapter.sockets_in_room("/", "a").await.is_empty());
        assert_eq!(adapter.sockets_in_room("/chat", "a").await, vec!["s1"]);
    }
}
