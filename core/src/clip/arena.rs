use std::sync::Arc;

use crate::clip::{ClipId, ClipShared};
use crate::engine::EngineError;

pub type ProgressCallback = Box<dyn FnMut(f32) + Send>;
pub type LevelCallback = Box<dyn FnMut(f32) + Send>;

#[derive(Default)]
pub struct ClipCallbacks {
  pub progress: Option<ProgressCallback>,
  pub level: Option<LevelCallback>,
}

struct Slot {
  generation: u32,
  entry: Option<Entry>,
}

struct Entry {
  clip: Arc<ClipShared>,
  callbacks: ClipCallbacks,
}

/// Fixed capacity clip storage, ids of removed clips never resolve again.
pub struct ClipArena {
  slots: Vec<Slot>,
  free: Vec<usize>,
}

impl ClipArena {
  pub fn new(capacity: usize) -> ClipArena {
    let slots = (0..capacity)
      .map(|_| Slot {
        generation: 0,
        entry: None,
      })
      .collect();
    let free = (0..capacity).rev().collect();
    ClipArena { slots, free }
  }

  pub fn capacity(&self) -> usize {
    self.slots.len()
  }

  pub fn len(&self) -> usize {
    self.slots.len() - self.free.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Reserves the next id, the slot stays empty until `insert`.
  pub fn next_id(&self) -> Result<ClipId, EngineError> {
    self
      .free
      .last()
      .map(|index| ClipId::new(*index as u32, self.slots[*index].generation.wrapping_add(1)))
      .ok_or(EngineError::ArenaFull {
        capacity: self.slots.len(),
      })
  }

  pub fn insert(&mut self, clip: Arc<ClipShared>) -> Result<ClipId, EngineError> {
    let id = self.next_id()?;
    if clip.id() != id {
      return Err(EngineError::InvalidClip { id: clip.id() });
    }
    self.free.pop();
    let slot = &mut self.slots[id.index()];
    slot.generation = id.generation();
    slot.entry = Some(Entry {
      clip,
      callbacks: ClipCallbacks::default(),
    });
    Ok(id)
  }

  pub fn get(&self, id: ClipId) -> Result<&Arc<ClipShared>, EngineError> {
    self
      .slots
      .get(id.index())
      .filter(|slot| slot.generation == id.generation())
      .and_then(|slot| slot.entry.as_ref())
      .map(|entry| &entry.clip)
      .ok_or(EngineError::InvalidClip { id })
  }

  pub fn callbacks_mut(&mut self, id: ClipId) -> Result<&mut ClipCallbacks, EngineError> {
    self
      .slots
      .get_mut(id.index())
      .filter(|slot| slot.generation == id.generation())
      .and_then(|slot| slot.entry.as_mut())
      .map(|entry| &mut entry.callbacks)
      .ok_or(EngineError::InvalidClip { id })
  }

  pub fn remove(&mut self, id: ClipId) -> Result<Arc<ClipShared>, EngineError> {
    let entry = self
      .slots
      .get_mut(id.index())
      .filter(|slot| slot.generation == id.generation())
      .and_then(|slot| slot.entry.take())
      .ok_or(EngineError::InvalidClip { id })?;
    self.free.push(id.index());
    Ok(entry.clip)
  }

  pub fn ids(&self) -> impl Iterator<Item = ClipId> + '_ {
    self.slots.iter().enumerate().filter_map(|(index, slot)| {
      slot
        .entry
        .as_ref()
        .map(|_| ClipId::new(index as u32, slot.generation))
    })
  }
}
