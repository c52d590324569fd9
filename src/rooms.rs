use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use uuid::Uuid;

use crate::users::Role;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomMember {
    pub user_name: String,
    pub socket_id: String,
    pub role: Role,
}

/// Per-poll membership, keyed by connection id in an ordered map so rosters
/// come back in a stable order. Rooms outlive their poll's active phase.
#[derive(Default)]
pub struct RoomDirectory {
    rooms: HashMap<Uuid, BTreeMap<String, RoomMember>>,
}

impl RoomDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(&mut self, poll_id: Uuid) {
        self.rooms.entry(poll_id).or_default();
    }

    /// Adds a member (rejoining replaces the previous entry for that
    /// connection) and returns the room's visible roster.
    pub fn join(&mut self, poll_id: Uuid, member: RoomMember) -> Vec<RoomMember> {
        let room = self.rooms.entry(poll_id).or_default();
        room.insert(member.socket_id.clone(), member);
        Self::visible(room)
    }

    /// Removes one member. Returns the updated visible roster only when an
    /// entry was actually removed; leaving a room you are not in changes
    /// nothing and reports nothing.
    pub fn remove(&mut self, poll_id: Uuid, socket_id: &str) -> Option<Vec<RoomMember>> {
        let room = self.rooms.get_mut(&poll_id)?;
        room.remove(socket_id)?;
        Some(Self::visible(room))
    }

    /// Sweeps a closed connection out of every room it was in, returning
    /// the updated visible roster for each affected room.
    pub fn disconnect(&mut self, socket_id: &str) -> Vec<(Uuid, Vec<RoomMember>)> {
        let mut affected = Vec::new();
        for (poll_id, room) in &mut self.rooms {
            if room.remove(socket_id).is_some() {
                affected.push((*poll_id, Self::visible(room)));
            }
        }
        affected
    }

    /// The roster shown to clients. Teachers stay members (they receive
    /// room events) but are never listed.
    pub fn visible_participants(&self, poll_id: Uuid) -> Vec<RoomMember> {
        self.rooms.get(&poll_id).map(Self::visible).unwrap_or_default()
    }

    fn visible(room: &BTreeMap<String, RoomMember>) -> Vec<RoomMember> {
        room.values()
            .filter(|m| m.role != Role::Teacher)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(name: &str, socket: &str) -> RoomMember {
        RoomMember {
            user_name: name.to_string(),
            socket_id: socket.to_string(),
            role: Role::Student,
        }
    }

    #[test]
    fn join_returns_the_updated_roster() {
        let mut rooms = RoomDirectory::new();
        let poll_id = Uuid::new_v4();
        rooms.ensure(poll_id);

        let roster = rooms.join(poll_id, student("Ana", "s1"));
        assert_eq!(roster.len(), 1);
        let roster = rooms.join(poll_id, student("Ben", "s2"));
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn rejoining_replaces_instead_of_duplicating() {
        let mut rooms = RoomDirectory::new();
        let poll_id = Uuid::new_v4();

        rooms.join(poll_id, student("Ana", "s1"));
        let roster = rooms.join(poll_id, student("Ana Maria", "s1"));

        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_name, "Ana Maria");
    }

    #[test]
    fn teachers_are_members_but_never_listed() {
        let mut rooms = RoomDirectory::new();
        let poll_id = Uuid::new_v4();

        rooms.join(
            poll_id,
            RoomMember {
                user_name: "Ms. Reed".to_string(),
                socket_id: "t1".to_string(),
                role: Role::Teacher,
            },
        );
        let roster = rooms.join(poll_id, student("Ana", "s1"));

        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].socket_id, "s1");
        assert_eq!(rooms.visible_participants(poll_id).len(), 1);

        // The teacher is still tracked: removing them shrinks the room.
        assert!(rooms.remove(poll_id, "t1").is_some());
    }

    #[test]
    fn removing_an_absent_member_reports_nothing() {
        let mut rooms = RoomDirectory::new();
        let poll_id = Uuid::new_v4();
        rooms.ensure(poll_id);
        rooms.join(poll_id, student("Ana", "s1"));

        assert!(rooms.remove(poll_id, "ghost").is_none());
        assert!(rooms.remove(Uuid::new_v4(), "s1").is_none());

        let roster = rooms.remove(poll_id, "s1").expect("member was present");
        assert!(roster.is_empty());
    }

    #[test]
    fn disconnect_sweeps_every_room() {
        let mut rooms = RoomDirectory::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let third = Uuid::new_v4();

        rooms.join(first, student("Ana", "s1"));
        rooms.join(first, student("Ben", "s2"));
        rooms.join(second, student("Ana", "s1"));
        rooms.join(third, student("Ben", "s2"));

        let mut affected = rooms.disconnect("s1");
        affected.sort_by_key(|(id, _)| *id);
        let mut expected = vec![first, second];
        expected.sort();

        assert_eq!(
            affected.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            expected
        );
        assert_eq!(rooms.visible_participants(first).len(), 1);
        assert!(rooms.visible_participants(second).is_empty());
        assert_eq!(rooms.visible_participants(third).len(), 1);
    }

    #[test]
    fn rosters_come_back_in_stable_order() {
        let mut rooms = RoomDirectory::new();
        let poll_id = Uuid::new_v4();

        rooms.join(poll_id, student("Zoe", "s9"));
        rooms.join(poll_id, student("Ana", "s1"));
        rooms.join(poll_id, student("Ben", "s5"));

        let sockets: Vec<_> = rooms
            .visible_participants(poll_id)
            .into_iter()
            .map(|m| m.socket_id)
            .collect();
        assert_eq!(sockets, vec!["s1", "s5", "s9"]);
    }
}
