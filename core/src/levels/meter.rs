use std::sync::atomic::Ordering;

use atomic_float::AtomicF32;

use crate::audio::gain::{gain_to_db, hold_peak};
use crate::mixer::CHANNEL_COUNT;

/// Stereo peak meter written by the audio thread once per buffer.
#[derive(Default)]
pub struct LevelMeter {
  peak_left: AtomicF32,
  peak_right: AtomicF32,
  hold_left: AtomicF32,
  hold_right: AtomicF32,
}

impl LevelMeter {
  pub fn update(&self, (left, right): (f32, f32)) {
    self.peak_left.store(left, Ordering::Relaxed);
    self.peak_right.store(right, Ordering::Relaxed);
    let hold = hold_peak(left, self.hold_left.load(Ordering::Relaxed));
    self.hold_left.store(hold, Ordering::Relaxed);
    let hold = hold_peak(right, self.hold_right.load(Ordering::Relaxed));
    self.hold_right.store(hold, Ordering::Relaxed);
  }

  pub fn peak_db(&self) -> (f32, f32) {
    (
      gain_to_db(self.peak_left.load(Ordering::Relaxed)),
      gain_to_db(self.peak_right.load(Ordering::Relaxed)),
    )
  }

  pub fn hold_db(&self) -> (f32, f32) {
    (
      gain_to_db(self.hold_left.load(Ordering::Relaxed)),
      gain_to_db(self.hold_right.load(Ordering::Relaxed)),
    )
  }
}

pub struct Meters {
  pub master: LevelMeter,
  pub channels: Vec<LevelMeter>,
}

impl Meters {
  pub fn new() -> Meters {
    Meters {
      master: LevelMeter::default(),
      channels: (0..CHANNEL_COUNT).map(|_| LevelMeter::default()).collect(),
    }
  }
}

impl Default for Meters {
  fn default() -> Meters {
    Meters::new()
  }
}

#[cfg(test)]
mod test {

  use approx::assert_relative_eq;

  use super::LevelMeter;
  use crate::audio::gain::MIN_DB;

  #[test]
  pub fn silent_meter() {
    let meter = LevelMeter::default();
    assert_eq!(meter.peak_db(), (MIN_DB, MIN_DB));
    assert_eq!(meter.hold_db(), (MIN_DB, MIN_DB));
  }

  #[test]
  pub fn hold_decays() {
    let meter = LevelMeter::default();
    meter.update((1.0, 0.5));
    meter.update((0.0, 0.5));
    let (peak_left, peak_right) = meter.peak_db();
    assert_eq!(peak_left, MIN_DB);
    assert_relative_eq!(peak_right, -6.0206, epsilon = 1e-3);
    let (hold_left, hold_right) = meter.hold_db();
    assert_relative_eq!(hold_left, 20.0 * 0.9f32.log10(), epsilon = 1e-4);
    assert_relative_eq!(hold_right, -6.0206, epsilon = 1e-3);
  }
}
