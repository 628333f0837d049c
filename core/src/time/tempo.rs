use crate::time::ticks::{TicksTime, TICKS_PER_BEAT};
use crate::time::ClockTime;

pub const MIN_BPM: u16 = 50;
pub const MAX_BPM: u16 = 200;
pub const DEFAULT_BPM: u16 = 120;

const MILLIS_PER_MINUTE: f64 = 60_000.0;
const SECONDS_PER_MINUTE: f64 = 60.0;

/// Beats per minute, always within `[MIN_BPM, MAX_BPM]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tempo(u16);

impl Tempo {
  pub fn new(value: u16) -> Tempo {
    Tempo(value.max(MIN_BPM).min(MAX_BPM))
  }

  /// Derives the tempo whose tick interval is `interval_ms` milliseconds.
  pub fn from_interval_ms(interval_ms: f64) -> Tempo {
    if !(interval_ms > 0.0) {
      return Tempo::default();
    }
    let bpm = MILLIS_PER_MINUTE / (interval_ms * TICKS_PER_BEAT as f64);
    Tempo::new(bpm.round().max(0.0).min(f64::from(u16::MAX)) as u16)
  }

  pub fn get_value(&self) -> u16 {
    self.0
  }

  pub fn interval_ms(&self) -> f64 {
    MILLIS_PER_MINUTE / (f64::from(self.0) * TICKS_PER_BEAT as f64)
  }

  pub fn tick_duration(&self) -> ClockTime {
    ClockTime::from_seconds(self.interval_ms() / 1000.0)
  }

  pub fn ticks_to_seconds(&self, ticks: TicksTime) -> f64 {
    f64::from(ticks) * SECONDS_PER_MINUTE / (f64::from(self.0) * TICKS_PER_BEAT as f64)
  }

  pub fn beats_to_seconds(&self, beats: f64) -> f64 {
    beats * SECONDS_PER_MINUTE / f64::from(self.0)
  }
}

impl Default for Tempo {
  fn default() -> Tempo {
    Tempo(DEFAULT_BPM)
  }
}

impl From<Tempo> for f64 {
  fn from(item: Tempo) -> Self {
    f64::from(item.0)
  }
}

impl From<Tempo> for u64 {
  fn from(item: Tempo) -> Self {
    u64::from(item.0)
  }
}

impl From<Tempo> for u16 {
  fn from(item: Tempo) -> Self {
    item.0
  }
}
