use meshcam_core::{PeerId, RoomId};
use std::collections::HashMap;
use tracing::info;

/// A participant leaving a room, and who is still there to be told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room: RoomId,
    pub remaining: Vec<PeerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    /// Set when the participant had to leave another room first.
    pub left: Option<Departure>,
    /// Members already in the joined room, in join order.
    pub existing: Vec<PeerId>,
}

/// Room membership. Each participant is in at most one room; empty rooms are dropped.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Vec<PeerId>>,
    membership: HashMap<PeerId, RoomId>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, peer_id: &PeerId, room: RoomId) -> JoinOutcome {
        if self.membership.get(peer_id) == Some(&room) {
            let existing = self
                .members(&room)
                .iter()
                .filter(|id| *id != peer_id)
                .cloned()
                .collect();
            return JoinOutcome {
                left: None,
                existing,
            };
        }

        let left = self.leave(peer_id);

        let members = self.rooms.entry(room.clone()).or_insert_with(|| {
            info!("Creating new room: {}", room);
            Vec::new()
        });
        let existing = members.clone();
        members.push(peer_id.clone());
        self.membership.insert(peer_id.clone(), room);

        JoinOutcome { left, existing }
    }

    /// Returns `None` when the participant was not in a room.
    pub fn leave(&mut self, peer_id: &PeerId) -> Option<Departure> {
        let room = self.membership.remove(peer_id)?;

        let remaining = match self.rooms.get_mut(&room) {
            Some(members) => {
                members.retain(|id| id != peer_id);
                members.clone()
            }
            None => Vec::new(),
        };
        if remaining.is_empty() {
            info!("Removing empty room: {}", room);
            self.rooms.remove(&room);
        }

        Some(Departure { room, remaining })
    }

    pub fn room_of(&self, peer_id: &PeerId) -> Option<&RoomId> {
        self.membership.get(peer_id)
    }

    pub fn share_room(&self, a: &PeerId, b: &PeerId) -> bool {
        match (self.membership.get(a), self.membership.get(b)) {
            (Some(room_a), Some(room_b)) => room_a == room_b,
            _ => false,
        }
    }

    pub fn members(&self, room: &RoomId) -> &[PeerId] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
