//! Ephemeral per-call room state: who may join, who has joined.
//!
//! Rooms live only in process memory. A room is deleted the moment its last
//! joined participant detaches; rooms do not outlive their occupants.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use parking_lot::Mutex;

use super::connections::ConnectionHandle;

struct RoomEntry {
    /// Fixed at creation: identities allowed to attach.
    eligible: HashSet<String>,
    /// Identities that have attached a room-scoped connection.
    joined: HashMap<String, ConnectionHandle>,
}

/// Registry of live call rooms.
///
/// `DashMap` for shard-level concurrency, `parking_lot::Mutex` per entry so
/// an eligibility check and the joined-map mutation it guards happen under
/// one lock.
pub struct RoomManager {
    rooms: DashMap<String, Mutex<RoomEntry>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Create a room with its eligible set and return the fresh room id.
    pub fn create_room(&self, eligible: HashSet<String>) -> String {
        let room_id = parley_common::id::prefixed_ulid(parley_common::id::prefix::ROOM);
        self.rooms.insert(
            room_id.clone(),
            Mutex::new(RoomEntry {
                eligible,
                joined: HashMap::new(),
            }),
        );
        room_id
    }

    pub fn eligible_for(&self, room_id: &str) -> Option<HashSet<String>> {
        self.rooms.get(room_id).map(|e| e.lock().eligible.clone())
    }

    pub fn is_eligible(&self, room_id: &str, identity: &str) -> bool {
        self.rooms
            .get(room_id)
            .map(|e| e.lock().eligible.contains(identity))
            .unwrap_or(false)
    }

    /// Attach an identity's room-scoped connection. Returns `false` without
    /// mutating the room when the room is gone or the identity is not
    /// eligible — the caller must close the connection instead of admitting
    /// it. Re-attaching overwrites the previous handle.
    pub fn attach(&self, room_id: &str, identity: &str, handle: ConnectionHandle) -> bool {
        match self.rooms.get(room_id) {
            Some(entry) => {
                let mut room = entry.lock();
                if !room.eligible.contains(identity) {
                    return false;
                }
                room.joined.insert(identity.to_string(), handle);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the joined participants and their handles.
    pub fn connections_in(&self, room_id: &str) -> Option<Vec<(String, ConnectionHandle)>> {
        self.rooms.get(room_id).map(|e| {
            e.lock()
                .joined
                .iter()
                .map(|(identity, handle)| (identity.clone(), handle.clone()))
                .collect()
        })
    }

    /// The joined participant's handle, if that identity is in the room.
    pub fn peer(&self, room_id: &str, identity: &str) -> Option<ConnectionHandle> {
        self.rooms
            .get(room_id)
            .and_then(|e| e.lock().joined.get(identity).cloned())
    }

    /// Detach an identity from a room. Idempotent. When the joined set
    /// empties, the room is deleted — the sole automatic garbage-collection
    /// path for rooms.
    pub fn detach(&self, room_id: &str, identity: &str) {
        let emptied = match self.rooms.get(room_id) {
            Some(entry) => {
                let mut room = entry.lock();
                room.joined.remove(identity);
                room.joined.is_empty()
            }
            None => return,
        };
        if emptied {
            // Re-checked under the map guard: a concurrent attach between
            // the check above and this removal keeps the room alive.
            self.rooms
                .remove_if(room_id, |_, entry| entry.lock().joined.is_empty());
        }
    }

    /// Explicit removal for rooms known to be vacated by other means.
    pub fn delete_room(&self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    /// Every room this identity is currently joined in. Used by disconnect
    /// teardown to cascade-detach.
    pub fn rooms_joined_by(&self, identity: &str) -> Vec<String> {
        self.rooms
            .iter()
            .filter(|entry| entry.value().lock().joined.contains_key(identity))
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn handle() -> ConnectionHandle {
        let (handle, rx) = ConnectionHandle::new_pair(0);
        std::mem::forget(rx);
        handle
    }

    #[test]
    fn create_room_stores_eligible_set() {
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice", "bob"]));

        assert!(room_id.starts_with("room_"));
        let set = rooms.eligible_for(&room_id).unwrap();
        assert!(set.contains("alice"));
        assert!(set.contains("bob"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn room_ids_are_unique() {
        let rooms = RoomManager::new();
        let a = rooms.create_room(eligible(&["alice"]));
        let b = rooms.create_room(eligible(&["alice"]));
        assert_ne!(a, b);
        assert_eq!(rooms.room_count(), 2);
    }

    #[test]
    fn attach_succeeds_iff_eligible() {
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice", "bob"]));

        assert!(rooms.attach(&room_id, "alice", handle()));

        // Ineligible identity is rejected without mutating the joined set.
        assert!(!rooms.attach(&room_id, "carol", handle()));
        let joined = rooms.connections_in(&room_id).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].0, "alice");
    }

    #[test]
    fn attach_to_unknown_room_fails() {
        let rooms = RoomManager::new();
        assert!(!rooms.attach("room_missing", "alice", handle()));
    }

    #[test]
    fn reattach_overwrites_handle() {
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice"]));

        let (first, rx1) = ConnectionHandle::new_pair(1);
        std::mem::forget(rx1);
        let (second, rx2) = ConnectionHandle::new_pair(2);
        std::mem::forget(rx2);

        assert!(rooms.attach(&room_id, "alice", first));
        assert!(rooms.attach(&room_id, "alice", second));

        let joined = rooms.connections_in(&room_id).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].1.id(), 2);
    }

    #[test]
    fn detach_last_participant_deletes_room() {
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice", "bob"]));
        rooms.attach(&room_id, "alice", handle());
        rooms.attach(&room_id, "bob", handle());

        rooms.detach(&room_id, "alice");
        assert!(rooms.eligible_for(&room_id).is_some());

        rooms.detach(&room_id, "bob");
        assert!(rooms.eligible_for(&room_id).is_none());
        assert!(rooms.connections_in(&room_id).is_none());
    }

    #[test]
    fn detach_is_idempotent() {
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice", "bob"]));
        rooms.attach(&room_id, "alice", handle());
        rooms.attach(&room_id, "bob", handle());

        rooms.detach(&room_id, "alice");
        rooms.detach(&room_id, "alice");
        let joined = rooms.connections_in(&room_id).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].0, "bob");
    }

    #[test]
    fn detach_from_unknown_room_is_a_noop() {
        let rooms = RoomManager::new();
        rooms.detach("room_missing", "alice");
        assert_eq!(rooms.room_count(), 0);
    }

    #[test]
    fn detach_on_never_joined_room_still_collects_it() {
        // An empty joined set always triggers deletion; "created" and
        // "vacated" are not distinguished in storage.
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice"]));
        rooms.detach(&room_id, "alice");
        assert!(rooms.eligible_for(&room_id).is_none());
    }

    #[test]
    fn delete_room_removes_everything() {
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice"]));
        rooms.attach(&room_id, "alice", handle());

        rooms.delete_room(&room_id);
        assert!(rooms.eligible_for(&room_id).is_none());
        assert!(rooms.peer(&room_id, "alice").is_none());
    }

    #[test]
    fn peer_lookup_only_sees_joined() {
        let rooms = RoomManager::new();
        let room_id = rooms.create_room(eligible(&["alice", "bob"]));
        rooms.attach(&room_id, "alice", handle());

        assert!(rooms.peer(&room_id, "alice").is_some());
        // Eligible but not joined.
        assert!(rooms.peer(&room_id, "bob").is_none());
    }

    #[test]
    fn rooms_joined_by_lists_occupancy() {
        let rooms = RoomManager::new();
        let a = rooms.create_room(eligible(&["alice", "bob"]));
        let b = rooms.create_room(eligible(&["alice"]));
        let c = rooms.create_room(eligible(&["bob"]));
        rooms.attach(&a, "alice", handle());
        rooms.attach(&b, "alice", handle());
        rooms.attach(&c, "bob", handle());

        let mut joined = rooms.rooms_joined_by("alice");
        joined.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(joined, expected);
        assert!(rooms.rooms_joined_by("carol").is_empty());
    }
}
