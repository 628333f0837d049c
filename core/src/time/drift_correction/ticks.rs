use crate::time::ticks::TICKS_PER_BEAT;
use crate::time::{SampleRate, Tempo};

const SECONDS_PER_MINUTE: u64 = 60;

/// Sample to tick stepping without accumulated error.
///
/// A tick is split into `60 * sample_rate` units and every sample advances
/// `bpm * TICKS_PER_BEAT` of them, so the tick rate is an exact integer ratio.
/// Changing the tempo only changes the step, the position inside the current tick is kept.
#[derive(Debug, Clone)]
pub struct TicksDriftCorrection {
  units_per_tick: u64,
  units_per_sample: u64,
  accumulated: u64,
}

impl TicksDriftCorrection {
  pub fn new(tempo: Tempo, sample_rate: SampleRate) -> TicksDriftCorrection {
    TicksDriftCorrection {
      units_per_tick: SECONDS_PER_MINUTE * u64::from(sample_rate.max(1)),
      units_per_sample: u64::from(tempo) * TICKS_PER_BEAT,
      accumulated: 0,
    }
  }

  pub fn set_tempo(&mut self, tempo: Tempo) {
    self.units_per_sample = u64::from(tempo) * TICKS_PER_BEAT;
  }

  pub fn get_ticks_per_sample(&self) -> f64 {
    self.units_per_sample as f64 / self.units_per_tick as f64
  }

  /// Fraction of the current tick already elapsed.
  pub fn get_phase(&self) -> f64 {
    self.accumulated as f64 / self.units_per_tick as f64
  }

  /// Puts the position right on a tick boundary so the next one happens at the next sample.
  pub fn reset_to_boundary(&mut self) {
    self.accumulated = self.units_per_tick;
  }

  /// Number of samples to advance until the next tick boundary is reached.
  pub fn samples_to_next_tick(&self) -> u64 {
    let remaining = self.units_per_tick.saturating_sub(self.accumulated);
    (remaining + self.units_per_sample - 1) / self.units_per_sample
  }

  pub fn advance(&mut self, samples: u64) {
    self.accumulated += samples * self.units_per_sample;
  }

  /// Consumes one tick worth of units, the position must have reached a boundary.
  pub fn cross_tick(&mut self) {
    debug_assert!(self.accumulated >= self.units_per_tick);
    self.accumulated = self.accumulated.saturating_sub(self.units_per_tick);
  }
}

#[cfg(test)]
mod test {

  use super::TicksDriftCorrection;
  use crate::time::Tempo;

  fn count_ticks(correction: &mut TicksDriftCorrection, buffers: usize, frames: u64) -> u64 {
    let mut ticks = 0;
    for _ in 0..buffers {
      let mut offset = 0;
      loop {
        let next = correction.samples_to_next_tick();
        if offset + next < frames {
          correction.advance(next);
          correction.cross_tick();
          offset += next;
          ticks += 1;
        } else {
          correction.advance(frames - offset);
          break;
        }
      }
    }
    ticks
  }

  #[test]
  pub fn ticks_per_sample() {
    let correction = TicksDriftCorrection::new(Tempo::new(120), 48000);
    assert_eq!(correction.get_ticks_per_sample(), 0.004);
  }

  #[test]
  pub fn no_drift_after_many_buffers() {
    let mut correction = TicksDriftCorrection::new(Tempo::new(133), 44100);
    // 10 minutes of audio at 133 bpm is exactly 127680 ticks, the last one lands on the next buffer
    let frames = 441;
    let buffers = 44100 * 600 / 441;
    assert_eq!(count_ticks(&mut correction, buffers, frames), 127_679);
    assert_eq!(correction.samples_to_next_tick(), 0);
  }

  #[test]
  pub fn boundary_at_first_sample() {
    let mut correction = TicksDriftCorrection::new(Tempo::new(120), 48000);
    correction.reset_to_boundary();
    assert_eq!(correction.samples_to_next_tick(), 0);
    correction.cross_tick();
    assert_eq!(correction.samples_to_next_tick(), 250);
  }

  #[test]
  pub fn tempo_change_keeps_phase() {
    let mut correction = TicksDriftCorrection::new(Tempo::new(120), 48000);
    correction.advance(125);
    assert_eq!(correction.get_phase(), 0.5);
    correction.set_tempo(Tempo::new(60));
    assert_eq!(correction.get_phase(), 0.5);
    assert_eq!(correction.samples_to_next_tick(), 250);
  }
}
