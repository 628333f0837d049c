//! Level conversions shared by clips, the mixer and the meters.

pub const MIN_DB: f32 = -200.0;
pub const MAX_GAIN: f32 = 15.848_932; // +24 dB
pub const MAX_GAIN_DB: f32 = 24.0;
pub const MIN_GAIN_DB: f32 = -24.0;
pub const SILENT_VOLUME_DB: f32 = -40.0;
pub const MAX_VOLUME_DB: f32 = 20.0;

/// Linear amplitude to dBFS, floored at `MIN_DB`.
pub fn gain_to_db(gain: f32) -> f32 {
  if gain <= 0.0 {
    MIN_DB
  } else {
    (20.0 * gain.log10()).max(MIN_DB)
  }
}

/// dB to linear amplitude, anything at or below `floor_db` is silence.
pub fn db_to_gain(db: f32, floor_db: f32) -> f32 {
  if db <= floor_db {
    0.0
  } else {
    10f32.powf(db / 20.0)
  }
}

/// Power sum of two levels given in dB.
pub fn add_db(db1: f32, db2: f32) -> f32 {
  10.0 * (10f32.powf(db1 / 10.0) + 10f32.powf(db2 / 10.0)).log10()
}

/// Maps a fader position to dB using the `20 * ln(pos) + 6` curve.
pub fn db_from_volume(position: f32) -> f32 {
  if position > 0.0 {
    20.0 * position.ln() + 6.0
  } else {
    -100.0
  }
}

/// Per side gains for a stereo amount and a pan in `[-1, 1]`.
pub fn pan_gains(amount: f32, pan: f32) -> (f32, f32) {
  (amount * (1.0 - pan).min(1.0), amount * (1.0 + pan).min(1.0))
}

pub fn semitones_to_rate(semitones: f32) -> f64 {
  2f64.powf(f64::from(semitones) / 12.0)
}

/// Decays a held peak by 10% per update unless the new peak reaches it.
pub fn hold_peak(peak: f32, hold: f32) -> f32 {
  if peak >= hold {
    peak
  } else {
    hold * 0.9
  }
}
