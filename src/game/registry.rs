use super::Rejection;
use super::room::Room;
use crate::models::RoomSummary;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub type SharedRoom = Arc<RwLock<Room>>;

/// Every live room, keyed by id. Rooms are created on first join and dropped
/// once their last player is gone.
#[derive(Default)]
pub struct RoomRegistry {
  rooms: DashMap<String, SharedRoom>,
}

impl RoomRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, id: &str) -> Option<SharedRoom> {
    self.rooms.get(id).map(|r| r.value().clone())
  }

  pub fn insert(&self, room: Room) -> Result<SharedRoom, Rejection> {
    let id = room.id.clone();
    match self.rooms.entry(id.clone()) {
      Entry::Occupied(_) => Err(Rejection::RoomExists),
      Entry::Vacant(slot) => {
        let shared = Arc::new(RwLock::new(room));
        slot.insert(shared.clone());
        tracing::info!(room_id = %id, "room created");
        Ok(shared)
      }
    }
  }

  pub fn get_or_insert_with(&self, id: &str, make: impl FnOnce() -> Room) -> SharedRoom {
    self
      .rooms
      .entry(id.to_string())
      .or_insert_with(|| {
        tracing::info!(room_id = %id, "room created");
        Arc::new(RwLock::new(make()))
      })
      .value()
      .clone()
  }

  /// Puts `room` back under `id` if it was dropped while a caller still held it.
  pub fn reattach(&self, id: &str, room: &SharedRoom) {
    self
      .rooms
      .entry(id.to_string())
      .or_insert_with(|| room.clone());
  }

  /// Drops the room if it has no players. A room whose lock is held is left alone.
  pub fn remove_if_empty(&self, id: &str) -> bool {
    let removed = self
      .rooms
      .remove_if(id, |_, room| room.try_read().is_ok_and(|r| r.is_empty()))
      .is_some();
    if removed {
      tracing::info!(room_id = %id, "room closed");
    }
    removed
  }

  pub fn len(&self) -> usize {
    self.rooms.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rooms.is_empty()
  }

  fn all(&self) -> Vec<(String, SharedRoom)> {
    self
      .rooms
      .iter()
      .map(|r| (r.key().clone(), r.value().clone()))
      .collect()
  }

  pub async fn summaries(&self) -> Vec<RoomSummary> {
    let mut out = vec![];
    for (_, room) in self.all() {
      out.push(room.read().await.summary());
    }
    out.sort_by(|a, b| a.id.cmp(&b.id));
    out
  }

  /// Advances every room by one second and drops rooms left empty.
  pub async fn tick_all(&self, now: Instant, grace: Duration) {
    for (id, room) in self.all() {
      let empty = {
        let mut guard = room.write().await;
        guard.tick(now, grace);
        guard.is_empty()
      };
      if empty {
        self.remove_if_empty(&id);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::game::room::RoomSettings;
  use crate::models::{ConnectionId, GameType};

  fn room(id: &str) -> Room {
    Room::new(id.into(), GameType::QuizBoard, vec![], RoomSettings::default())
  }

  #[tokio::test]
  async fn create_then_conflict() {
    let registry = RoomRegistry::new();
    assert!(registry.insert(room("R1")).is_ok());
    assert!(matches!(registry.insert(room("R1")), Err(Rejection::RoomExists)));
    assert_eq!(registry.len(), 1);
  }

  #[tokio::test]
  async fn get_or_insert_reuses_room() {
    let registry = RoomRegistry::new();
    let a = registry.get_or_insert_with("R1", || room("R1"));
    let b = registry.get_or_insert_with("R1", || panic!("should reuse"));
    assert!(Arc::ptr_eq(&a, &b));
  }

  #[tokio::test]
  async fn empty_rooms_are_dropped_on_tick() {
    let registry = RoomRegistry::new();
    let shared = registry.get_or_insert_with("R1", || room("R1"));
    let conn = ConnectionId::new();
    let now = Instant::now();
    shared.write().await.join(conn, "Sara", None, now).unwrap();
    shared.write().await.disconnect(conn, now);

    let grace = Duration::from_secs(30);
    registry.tick_all(now + Duration::from_secs(5), grace).await;
    assert_eq!(registry.len(), 1);
    registry.tick_all(now + Duration::from_secs(31), grace).await;
    assert!(registry.is_empty());
  }

  #[tokio::test]
  async fn occupied_rooms_survive_removal() {
    let registry = RoomRegistry::new();
    let shared = registry.get_or_insert_with("R1", || room("R1"));
    shared
      .write()
      .await
      .join(ConnectionId::new(), "Omar", None, Instant::now())
      .unwrap();
    assert!(!registry.remove_if_empty("R1"));
    let summaries = registry.summaries().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].player_count, 1);
  }
}
