//! Room registry: one [`BattleRoom`] per battle id.

use std::collections::HashMap;

use crewsync_protocol::BattleId;

use crate::BattleRoom;

/// Owns every live room.
///
/// The registry only allocates and frees rooms. It never touches timers
/// or players; the engine cancels a room's timers with the room it gets
/// back from [`destroy`](Self::destroy).
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<BattleId, BattleRoom>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the room for `battle_id`, creating an empty one if needed.
    /// Calling it again for the same id returns the same room.
    pub fn get_or_create(&mut self, battle_id: &BattleId, now_ms: u64) -> &mut BattleRoom {
        self.rooms.entry(battle_id.clone()).or_insert_with(|| {
            tracing::info!(battle_id = %battle_id, "room created");
            BattleRoom::new(battle_id.clone(), now_ms)
        })
    }

    pub fn get(&self, battle_id: &BattleId) -> Option<&BattleRoom> {
        self.rooms.get(battle_id)
    }

    pub fn get_mut(&mut self, battle_id: &BattleId) -> Option<&mut BattleRoom> {
        self.rooms.get_mut(battle_id)
    }

    pub fn contains(&self, battle_id: &BattleId) -> bool {
        self.rooms.contains_key(battle_id)
    }

    /// Removes a room and hands it back. A later
    /// [`get_or_create`](Self::get_or_create) for the same id starts from
    /// scratch.
    pub fn destroy(&mut self, battle_id: &BattleId) -> Option<BattleRoom> {
        let room = self.rooms.remove(battle_id);
        if room.is_some() {
            tracing::info!(battle_id = %battle_id, "room destroyed");
        }
        room
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &BattleId> {
        self.rooms.keys()
    }
}
