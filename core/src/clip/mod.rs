pub mod arena;
pub mod voice;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;

use crate::audio::gain::{self, MAX_GAIN, MAX_VOLUME_DB, MIN_DB, MIN_GAIN_DB, SILENT_VOLUME_DB};
use crate::audio::AudioData;
use crate::engine::EngineError;
use crate::time::TicksTime;

pub use self::arena::ClipArena;
pub use self::voice::Voice;

pub const MIN_NOTE: i32 = -1;
pub const MAX_NOTE: i32 = 127;
pub const SLICE_BASE_NOTE: i32 = 60;
pub const MAX_SLICES: u32 = 128;
pub const MIN_SPEED_RATIO: f32 = 0.1;
pub const MAX_SPEED_RATIO: f32 = 10.0;
pub const MAX_PITCH: f32 = 48.0;

const NO_TICK: u64 = u64::MAX;

/// Generation checked handle to a clip slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClipId {
  index: u32,
  generation: u32,
}

impl ClipId {
  pub fn new(index: u32, generation: u32) -> ClipId {
    ClipId { index, generation }
  }

  pub fn index(&self) -> usize {
    self.index as usize
  }

  pub fn generation(&self) -> u32 {
    self.generation
  }
}

impl fmt::Display for ClipId {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{}v{}", self.index, self.generation)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipState {
  Created,
  Ready,
  Playing,
  Stopped,
  Destroyed,
}

impl ClipState {
  fn from_u8(value: u8) -> ClipState {
    match value {
      0 => ClipState::Created,
      1 => ClipState::Ready,
      2 => ClipState::Playing,
      3 => ClipState::Stopped,
      _ => ClipState::Destroyed,
    }
  }

  fn to_u8(self) -> u8 {
    match self {
      ClipState::Created => 0,
      ClipState::Ready => 1,
      ClipState::Playing => 2,
      ClipState::Stopped => 3,
      ClipState::Destroyed => 4,
    }
  }
}

/// Where a playing clip sends its audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  Main,
  Channel(usize),
}

impl Route {
  pub fn from_channel(channel: Option<usize>) -> Route {
    channel.map(Route::Channel).unwrap_or(Route::Main)
  }
}

/// Clip parameters shared between the control side and the audio thread.
///
/// Setters are plain atomic stores, the audio thread reads them once per buffer.
pub struct ClipShared {
  id: ClipId,
  data: Arc<AudioData>,
  state: AtomicU8,
  start_position: AtomicF32,
  length: AtomicF32,
  pan: AtomicF32,
  speed_ratio: AtomicF32,
  pitch: AtomicF32,
  gain: AtomicF32,
  volume_db: AtomicF32,
  slices: AtomicU32,
  key_zone_start: AtomicI32,
  key_zone_end: AtomicI32,
  root_note: AtomicI32,
  muted: AtomicBool,
  progress: AtomicF32,
  level_db: AtomicF32,
  started_at_tick: AtomicU64,
  stopped_at_tick: AtomicU64,
}

impl ClipShared {
  pub fn new(id: ClipId, data: Arc<AudioData>) -> ClipShared {
    ClipShared {
      id,
      data,
      state: AtomicU8::new(ClipState::Created.to_u8()),
      start_position: AtomicF32::new(0.0),
      length: AtomicF32::new(0.0),
      pan: AtomicF32::new(0.0),
      speed_ratio: AtomicF32::new(1.0),
      pitch: AtomicF32::new(0.0),
      gain: AtomicF32::new(1.0),
      volume_db: AtomicF32::new(0.0),
      slices: AtomicU32::new(0),
      key_zone_start: AtomicI32::new(MIN_NOTE),
      key_zone_end: AtomicI32::new(MAX_NOTE),
      root_note: AtomicI32::new(SLICE_BASE_NOTE),
      muted: AtomicBool::new(false),
      progress: AtomicF32::new(0.0),
      level_db: AtomicF32::new(MIN_DB),
      started_at_tick: AtomicU64::new(NO_TICK),
      stopped_at_tick: AtomicU64::new(NO_TICK),
    }
  }

  pub fn id(&self) -> ClipId {
    self.id
  }

  pub fn data(&self) -> &Arc<AudioData> {
    &self.data
  }

  pub fn state(&self) -> ClipState {
    ClipState::from_u8(self.state.load(Ordering::Acquire))
  }

  pub(crate) fn set_state(&self, state: ClipState) {
    self.state.store(state.to_u8(), Ordering::Release);
  }

  pub fn duration(&self) -> f64 {
    self.data.duration()
  }

  pub fn start_position(&self) -> f32 {
    self.start_position.load(Ordering::Relaxed)
  }

  pub fn set_start_position(&self, seconds: f32) {
    let value = seconds.max(0.0).min(self.duration() as f32);
    self.start_position.store(value, Ordering::Relaxed);
  }

  /// Playback length in seconds, 0 plays to the end of the file.
  pub fn length(&self) -> f32 {
    self.length.load(Ordering::Relaxed)
  }

  /// Sets the length from beats at `bpm`, which is not limited to the timer's BPM range.
  pub fn set_length(&self, beats: f32, bpm: u16) -> Result<(), EngineError> {
    if bpm == 0 {
      return Err(EngineError::InvalidTempo { bpm });
    }
    let seconds = f64::from(beats.max(0.0)) * 60.0 / f64::from(bpm);
    self.length.store(seconds as f32, Ordering::Relaxed);
    Ok(())
  }

  pub fn pan(&self) -> f32 {
    self.pan.load(Ordering::Relaxed)
  }

  pub fn set_pan(&self, pan: f32) {
    self.pan.store(pan.max(-1.0).min(1.0), Ordering::Relaxed);
  }

  pub fn speed_ratio(&self) -> f32 {
    self.speed_ratio.load(Ordering::Relaxed)
  }

  pub fn set_speed_ratio(&self, ratio: f32) {
    let value = ratio.max(MIN_SPEED_RATIO).min(MAX_SPEED_RATIO);
    self.speed_ratio.store(value, Ordering::Relaxed);
  }

  pub fn pitch(&self) -> f32 {
    self.pitch.load(Ordering::Relaxed)
  }

  pub fn set_pitch(&self, semitones: f32) {
    self
      .pitch
      .store(semitones.max(-MAX_PITCH).min(MAX_PITCH), Ordering::Relaxed);
  }

  pub fn gain(&self) -> f32 {
    self.gain.load(Ordering::Relaxed)
  }

  pub fn set_gain(&self, gain: f32) {
    self.gain.store(gain.max(0.0).min(MAX_GAIN), Ordering::Relaxed);
  }

  pub fn gain_db(&self) -> f32 {
    gain::gain_to_db(self.gain())
  }

  pub fn set_gain_db(&self, db: f32) {
    self.set_gain(gain::db_to_gain(db, MIN_GAIN_DB));
  }

  pub fn volume(&self) -> f32 {
    self.volume_db.load(Ordering::Relaxed)
  }

  pub fn set_volume(&self, db: f32) {
    let value = db.max(SILENT_VOLUME_DB).min(MAX_VOLUME_DB);
    self.volume_db.store(value, Ordering::Relaxed);
  }

  /// Sets the volume from a fader position, 1.0 being +6 dB.
  pub fn set_fader(&self, position: f32) {
    self.set_volume(gain::db_from_volume(position));
  }

  pub fn slices(&self) -> u32 {
    self.slices.load(Ordering::Relaxed)
  }

  pub fn set_slices(&self, slices: u32) {
    self.slices.store(slices.min(MAX_SLICES), Ordering::Relaxed);
  }

  /// Slice start as a fraction of the playback region.
  pub fn slice_position(&self, slice: u32) -> f32 {
    let slices = self.slices();
    if slices == 0 {
      0.0
    } else {
      slice.min(slices) as f32 / slices as f32
    }
  }

  pub fn slice_for_note(&self, note: i32) -> Option<u32> {
    slice_for_note(self.slices(), note)
  }

  pub fn key_zone_start(&self) -> i32 {
    self.key_zone_start.load(Ordering::Relaxed)
  }

  pub fn key_zone_end(&self) -> i32 {
    self.key_zone_end.load(Ordering::Relaxed)
  }

  /// Moves the end up when the new start is above it.
  pub fn set_key_zone_start(&self, note: i32) {
    let note = clamp_note(note);
    self.key_zone_start.store(note, Ordering::Relaxed);
    if self.key_zone_end() < note {
      self.key_zone_end.store(note, Ordering::Relaxed);
    }
  }

  /// Moves the start down when the new end is below it.
  pub fn set_key_zone_end(&self, note: i32) {
    let note = clamp_note(note);
    self.key_zone_end.store(note, Ordering::Relaxed);
    if self.key_zone_start() > note {
      self.key_zone_start.store(note, Ordering::Relaxed);
    }
  }

  pub fn in_key_zone(&self, note: i32) -> bool {
    let start = self.key_zone_start();
    let end = self.key_zone_end();
    (start < 0 || note >= start) && (end < 0 || note <= end)
  }

  pub fn root_note(&self) -> i32 {
    self.root_note.load(Ordering::Relaxed)
  }

  pub fn set_root_note(&self, note: i32) {
    self.root_note.store(clamp_note(note), Ordering::Relaxed);
  }

  pub fn is_muted(&self) -> bool {
    self.muted.load(Ordering::Relaxed)
  }

  pub fn set_muted(&self, muted: bool) {
    self.muted.store(muted, Ordering::Relaxed);
  }

  pub fn progress(&self) -> f32 {
    self.progress.load(Ordering::Relaxed)
  }

  pub(crate) fn set_progress(&self, progress: f32) {
    self.progress.store(progress, Ordering::Relaxed);
  }

  pub fn level_db(&self) -> f32 {
    self.level_db.load(Ordering::Relaxed)
  }

  pub(crate) fn set_level_db(&self, db: f32) {
    self.level_db.store(db, Ordering::Relaxed);
  }

  pub fn started_at_tick(&self) -> Option<TicksTime> {
    load_tick(&self.started_at_tick)
  }

  pub fn stopped_at_tick(&self) -> Option<TicksTime> {
    load_tick(&self.stopped_at_tick)
  }

  pub(crate) fn mark_started(&self, tick: Option<TicksTime>) {
    self.set_state(ClipState::Playing);
    store_tick(&self.started_at_tick, tick);
    store_tick(&self.stopped_at_tick, None);
  }

  pub(crate) fn mark_stopped(&self, tick: Option<TicksTime>) {
    self.set_state(ClipState::Stopped);
    store_tick(&self.stopped_at_tick, tick);
  }
}

/// Maps a note onto a slice so that the base note triggers the first slice.
pub fn slice_for_note(slices: u32, note: i32) -> Option<u32> {
  if slices == 0 {
    return None;
  }
  let slices = slices as i32;
  let slice = ((slices - SLICE_BASE_NOTE % slices) + note).rem_euclid(slices);
  Some(slice as u32)
}

fn clamp_note(note: i32) -> i32 {
  note.max(MIN_NOTE).min(MAX_NOTE)
}

fn load_tick(tick: &AtomicU64) -> Option<TicksTime> {
  match tick.load(Ordering::Acquire) {
    NO_TICK => None,
    value => Some(TicksTime::new(value)),
  }
}

fn store_tick(atomic: &AtomicU64, tick: Option<TicksTime>) {
  atomic.store(tick.map(u64::from).unwrap_or(NO_TICK), Ordering::Release);
}
