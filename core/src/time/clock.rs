use std::ops::{Add, AddAssign, Sub, SubAssign};

use super::SampleRate;

pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

pub type UnitType = u64;
pub const UNITS_PER_SECOND: UnitType = NANOS_PER_SECOND as UnitType;
pub const UNITS_PER_NANO: UnitType = NANOS_PER_SECOND / UNITS_PER_SECOND;

///! Engine time in nanoseconds
#[derive(Debug, PartialOrd, PartialEq, Eq, Ord, Clone, Copy, Default)]
pub struct ClockTime(UnitType);

impl ClockTime {
  pub fn zero() -> ClockTime {
    ClockTime(0)
  }

  pub fn new(units: UnitType) -> ClockTime {
    ClockTime(units)
  }

  pub fn from_seconds(seconds: f64) -> ClockTime {
    ClockTime((seconds.max(0.0) * UNITS_PER_SECOND as f64).round() as UnitType)
  }

  pub fn from_samples(samples: u64, sample_rate: SampleRate) -> ClockTime {
    let units = u128::from(samples) * u128::from(UNITS_PER_SECOND) / u128::from(sample_rate.max(1));
    ClockTime(units as UnitType)
  }

  pub fn units(&self) -> UnitType {
    self.0
  }

  pub fn to_nanos(&self) -> u64 {
    self.0 / UNITS_PER_NANO
  }

  pub fn to_seconds(&self) -> f64 {
    self.0 as f64 / UNITS_PER_SECOND as f64
  }

  pub fn to_samples(&self, sample_rate: SampleRate) -> u64 {
    (u128::from(self.0) * u128::from(sample_rate) / u128::from(UNITS_PER_SECOND)) as u64
  }
}

impl Add for ClockTime {
  type Output = ClockTime;

  fn add(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0.saturating_add(rhs.0))
  }
}

impl AddAssign for ClockTime {
  fn add_assign(&mut self, rhs: ClockTime) {
    *self = *self + rhs;
  }
}

impl Sub for ClockTime {
  type Output = ClockTime;

  fn sub(self, rhs: ClockTime) -> ClockTime {
    ClockTime(self.0.saturating_sub(rhs.0))
  }
}

impl SubAssign for ClockTime {
  fn sub_assign(&mut self, rhs: ClockTime) {
    *self = *self - rhs;
  }
}

#[cfg(test)]
mod test {
  use super::ClockTime;

  #[test]
  pub fn clock_time_from_samples() {
    let time = ClockTime::from_samples(44100, 44100);
    assert_eq!(time.to_nanos(), 1_000_000_000);
    assert_eq!(ClockTime::from_samples(1, 48000).to_nanos(), 20_833);
  }

  #[test]
  pub fn clock_time_to_samples() {
    let time = ClockTime::from_seconds(0.5);
    assert_eq!(time.to_samples(48000), 24000);
  }

  #[test]
  pub fn clock_time_from_negative_seconds() {
    assert_eq!(ClockTime::from_seconds(-1.0), ClockTime::zero());
  }

  #[test]
  pub fn clock_time_add_assign() {
    let mut time1 = ClockTime::new(15);
    time1 += ClockTime::new(5);
    assert_eq!(time1, ClockTime::new(20));
  }

  #[test]
  pub fn clock_time_sub_saturates() {
    let time1 = ClockTime::new(5);
    let time2 = ClockTime::new(15);
    assert_eq!(time1 - time2, ClockTime::zero());
    assert_eq!(time2 - time1, ClockTime::new(10));
  }
}
