use std::{
  fmt,
  ops::{Add, AddAssign, Sub, SubAssign},
};

use crate::time::Tempo;

pub const TICKS_PER_BEAT: u64 = 96;
pub const BEATS_PER_BAR: u64 = 4;
pub const TICKS_PER_BAR: u64 = TICKS_PER_BEAT * BEATS_PER_BAR;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Clone)]
pub struct TicksTime(u64);

impl TicksTime {
  pub fn new(ticks: u64) -> TicksTime {
    TicksTime(ticks)
  }

  pub fn zero() -> TicksTime {
    TicksTime(0)
  }

  pub fn from_beats(beats: u64) -> TicksTime {
    TicksTime(beats * TICKS_PER_BEAT)
  }

  pub fn beat(&self) -> u64 {
    self.0 / TICKS_PER_BEAT
  }

  pub fn bar(&self) -> u64 {
    self.0 / TICKS_PER_BAR
  }

  pub fn beat_in_bar(&self) -> u64 {
    self.beat() % BEATS_PER_BAR
  }

  /// Rounds up to the next multiple of `quantum`. A tick already on a multiple is kept.
  pub fn align_up(&self, quantum: u64) -> TicksTime {
    let quantum = quantum.max(1);
    let rem = self.0 % quantum;
    if rem == 0 {
      *self
    } else {
      TicksTime(self.0 + quantum - rem)
    }
  }

  pub fn to_seconds(&self, tempo: Tempo) -> f64 {
    tempo.ticks_to_seconds(*self)
  }
}

impl fmt::Display for TicksTime {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let ticks_in_beat = self.0 % TICKS_PER_BEAT;
    write!(
      f,
      "{}.{}.{:02}",
      self.bar() + 1,
      self.beat_in_bar() + 1,
      ticks_in_beat
    )
  }
}

impl Add for TicksTime {
  type Output = TicksTime;
  fn add(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0.saturating_add(rhs.0))
  }
}

impl AddAssign for TicksTime {
  fn add_assign(&mut self, rhs: TicksTime) {
    *self = *self + rhs;
  }
}

impl Sub for TicksTime {
  type Output = TicksTime;
  fn sub(self, rhs: TicksTime) -> Self {
    TicksTime::new(self.0.saturating_sub(rhs.0))
  }
}

impl SubAssign for TicksTime {
  fn sub_assign(&mut self, rhs: TicksTime) {
    *self = *self - rhs;
  }
}

impl From<u64> for TicksTime {
  fn from(item: u64) -> Self {
    TicksTime(item)
  }
}

impl From<TicksTime> for u64 {
  fn from(item: TicksTime) -> Self {
    item.0
  }
}

impl From<TicksTime> for f64 {
  fn from(item: TicksTime) -> Self {
    item.0 as f64
  }
}

#[cfg(test)]
mod test {

  use super::{Tempo, TicksTime, TICKS_PER_BAR};

  #[test]
  pub fn from_beats() {
    assert_eq!(TicksTime::from_beats(3), TicksTime::new(288));
  }

  #[test]
  pub fn bars_and_beats() {
    let time = TicksTime::new(TICKS_PER_BAR * 2 + 96 * 3 + 5);
    assert_eq!(time.bar(), 2);
    assert_eq!(time.beat(), 11);
    assert_eq!(time.beat_in_bar(), 3);
    assert_eq!(time.to_string(), "3.4.05");
  }

  #[test]
  pub fn align_up() {
    assert_eq!(TicksTime::new(0).align_up(384), TicksTime::new(0));
    assert_eq!(TicksTime::new(1).align_up(384), TicksTime::new(384));
    assert_eq!(TicksTime::new(384).align_up(384), TicksTime::new(384));
    assert_eq!(TicksTime::new(385).align_up(384), TicksTime::new(768));
    assert_eq!(TicksTime::new(17).align_up(1), TicksTime::new(17));
    assert_eq!(TicksTime::new(17).align_up(0), TicksTime::new(17));
  }

  #[test]
  pub fn sub_saturates() {
    assert_eq!(TicksTime::new(30) - TicksTime::new(100), TicksTime::zero());
    assert_eq!(TicksTime::new(100) - TicksTime::new(30), TicksTime::new(70));
  }

  #[test]
  pub fn add_assign() {
    let mut time = TicksTime::new(100);
    time += TicksTime::new(50);
    assert_eq!(time, TicksTime::new(150));
  }

  #[test]
  pub fn to_seconds() {
    let beat = TicksTime::from_beats(1);
    assert_eq!(beat.to_seconds(Tempo::new(120)), 0.5);
  }

  #[test]
  pub fn conversions() {
    assert_eq!(u64::from(TicksTime::new(1234)), 1234);
    assert_eq!(f64::from(TicksTime::new(1234)), 1234.0);
    assert_eq!(TicksTime::from(7u64), TicksTime::new(7));
  }
}
