use std::sync::Arc;

use crate::audio::gain::{self, SILENT_VOLUME_DB};
use crate::audio::StereoBuffer;
use crate::clip::{ClipId, ClipShared, Route};

/// Audio thread side of a clip: playhead, routing and the gains being ramped in this buffer.
pub struct Voice {
  clip: Arc<ClipShared>,
  sample_rate: u32,

  playing: bool,
  looping: bool,
  route: Route,
  position: f64,
  slice: Option<u32>,
  note_rate: f64,

  rate: f64,
  region_start: f64,
  region_end: f64,
  gain_from: (f32, f32),
  gain_to: (f32, f32),

  peak: f32,
  frames_since_report: u32,
  finished: bool,
}

pub struct Trigger {
  pub route: Route,
  pub looping: bool,
  pub slice: Option<u32>,
  pub semitones: i32,
}

impl Trigger {
  pub fn new(route: Route, looping: bool) -> Trigger {
    Trigger {
      route,
      looping,
      slice: None,
      semitones: 0,
    }
  }
}

impl Voice {
  pub fn new(clip: Arc<ClipShared>, sample_rate: u32) -> Voice {
    let mut voice = Voice {
      clip,
      sample_rate,
      playing: false,
      looping: false,
      route: Route::Main,
      position: 0.0,
      slice: None,
      note_rate: 1.0,
      rate: 1.0,
      region_start: 0.0,
      region_end: 0.0,
      gain_from: (0.0, 0.0),
      gain_to: (0.0, 0.0),
      peak: 0.0,
      frames_since_report: 0,
      finished: false,
    };
    voice.update_parameters();
    voice.gain_from = voice.gain_to;
    voice
  }

  pub fn id(&self) -> ClipId {
    self.clip.id()
  }

  pub fn clip(&self) -> &ClipShared {
    &self.clip
  }

  pub fn is_playing(&self) -> bool {
    self.playing
  }

  pub fn route(&self) -> Route {
    self.route
  }

  pub fn position(&self) -> f64 {
    self.position
  }

  pub fn progress(&self) -> f32 {
    let frames = self.clip.data().frames();
    if frames == 0 {
      0.0
    } else {
      (self.position / frames as f64).min(1.0) as f32
    }
  }

  /// Starts from the beginning of the region (or of the slice) with the current parameters.
  pub fn start(&mut self, trigger: Trigger) {
    self.route = trigger.route;
    self.looping = trigger.looping;
    self.slice = trigger.slice;
    self.note_rate = gain::semitones_to_rate(trigger.semitones as f32);
    self.update_parameters();
    self.gain_from = self.gain_to;
    self.position = self.region_start;
    self.playing = self.region_end > self.region_start;
    self.finished = !self.playing;
    self.peak = 0.0;
    self.frames_since_report = 0;
  }

  /// Returns whether the voice was playing.
  pub fn stop(&mut self) -> bool {
    let was_playing = self.playing;
    self.playing = false;
    self.finished = false;
    was_playing
  }

  /// True once after a one shot playback ran past the end of its region.
  pub fn take_finished(&mut self) -> bool {
    let finished = self.finished;
    self.finished = false;
    finished
  }

  /// Reads the shared parameters, the new gains are ramped across the coming buffer.
  pub fn prepare(&mut self) {
    self.gain_from = self.gain_to;
    self.update_parameters();
  }

  fn update_parameters(&mut self) {
    let clip = &self.clip;
    let data = clip.data();

    let frames = data.frames() as f64;
    let file_rate = f64::from(data.sample_rate());
    let start = (f64::from(clip.start_position()) * file_rate).min(frames);
    let length = f64::from(clip.length()) * file_rate;
    let end = if length > 0.0 {
      (start + length).min(frames)
    } else {
      frames
    };
    let end = if end <= start { frames } else { end };

    let slices = clip.slices();
    match self.slice.filter(|_| slices > 0) {
      Some(slice) => {
        let slice = f64::from(slice.min(slices - 1));
        let size = (end - start) / f64::from(slices);
        self.region_start = start + size * slice;
        self.region_end = self.region_start + size;
      }
      None => {
        self.region_start = start;
        self.region_end = end;
      }
    }

    self.rate = f64::from(clip.speed_ratio())
      * gain::semitones_to_rate(clip.pitch())
      * self.note_rate
      * file_rate
      / f64::from(self.sample_rate.max(1));

    self.gain_to = if clip.is_muted() {
      (0.0, 0.0)
    } else {
      let amount = clip.gain() * gain::db_to_gain(clip.volume(), SILENT_VOLUME_DB);
      gain::pan_gains(amount, clip.pan())
    };
  }

  /// Adds the samples for `[from, to)` of a buffer of `frames` into `output`.
  pub fn render(&mut self, output: &mut StereoBuffer, from: usize, to: usize, frames: usize) {
    if !self.playing {
      return;
    }

    let data = Arc::clone(self.clip.data());
    let last = data.frames().saturating_sub(1);
    let ramp = 1.0 / frames.max(1) as f32;
    let (from_left, from_right) = self.gain_from;
    let (delta_left, delta_right) = (self.gain_to.0 - from_left, self.gain_to.1 - from_right);

    for i in from..to {
      let index = self.position as usize;
      let next = (index + 1).min(last);
      let fraction = (self.position - index as f64) as f32;
      let left = data.left[index] + (data.left[next] - data.left[index]) * fraction;
      let right = data.right[index] + (data.right[next] - data.right[index]) * fraction;

      let t = (i + 1) as f32 * ramp;
      let left = left * (from_left + delta_left * t);
      let right = right * (from_right + delta_right * t);
      output.left[i] += left;
      output.right[i] += right;
      self.peak = self.peak.max(left.abs()).max(right.abs());

      self.position += self.rate;
      if self.position >= self.region_end {
        let size = self.region_end - self.region_start;
        if self.looping && size > 0.0 {
          self.position = self.region_start + (self.position - self.region_end) % size;
        } else {
          self.playing = false;
          self.finished = true;
          break;
        }
      }
    }
  }

  /// Counts the frames of a finished buffer and hands out progress and level once per interval.
  pub fn report(&mut self, frames: usize, interval: u32) -> Option<(f32, f32)> {
    if !self.playing {
      return None;
    }
    self.frames_since_report += frames as u32;
    if self.frames_since_report < interval {
      return None;
    }
    self.frames_since_report = 0;
    let level = gain::gain_to_db(self.peak);
    self.peak = 0.0;
    Some((self.progress(), level))
  }
}

#[cfg(test)]
mod test {

  use std::path::PathBuf;
  use std::sync::Arc;

  use approx::assert_relative_eq;

  use super::{Trigger, Voice};
  use crate::audio::{AudioData, StereoBuffer};
  use crate::clip::{ClipId, ClipShared, Route};

  fn ramp_clip(frames: usize, sample_rate: u32) -> Arc<ClipShared> {
    let left: Vec<f32> = (0..frames).map(|i| i as f32).collect();
    let right = left.iter().map(|s| -s).collect();
    let data = AudioData::new(PathBuf::from("ramp.wav"), sample_rate, left, right);
    Arc::new(ClipShared::new(ClipId::new(0, 1), Arc::new(data)))
  }

  #[test]
  pub fn renders_from_offset() {
    let clip = ramp_clip(100, 1000);
    let mut voice = Voice::new(clip, 1000);
    voice.start(Trigger::new(Route::Main, false));
    voice.prepare();

    let mut output = StereoBuffer::new(8);
    voice.render(&mut output, 3, 8, 8);
    assert_eq!(&output.left[..5], &[0.0, 0.0, 0.0, 0.0, 1.0]);
    assert_eq!(output.left[7], 4.0);
    assert_eq!(output.right[7], -4.0);
    assert_eq!(voice.position(), 5.0);
  }

  #[test]
  pub fn one_shot_finishes() {
    let clip = ramp_clip(4, 1000);
    let mut voice = Voice::new(clip, 1000);
    voice.start(Trigger::new(Route::Main, false));

    let mut output = StereoBuffer::new(8);
    voice.render(&mut output, 0, 8, 8);
    assert!(!voice.is_playing());
    assert!(voice.take_finished());
    assert!(!voice.take_finished());
    assert_eq!(&output.left[..6], &[0.0, 1.0, 2.0, 3.0, 0.0, 0.0]);
  }

  #[test]
  pub fn loops_within_region() {
    let clip = ramp_clip(10, 4);
    clip.set_start_position(0.5);
    clip.set_length(0.75, 60).unwrap();
    let mut voice = Voice::new(clip, 4);
    voice.start(Trigger::new(Route::Channel(1), true));

    let mut output = StereoBuffer::new(6);
    voice.render(&mut output, 0, 6, 6);
    assert!(voice.is_playing());
    assert_eq!(voice.route(), Route::Channel(1));
    assert_eq!(output.left, vec![2.0, 3.0, 4.0, 2.0, 3.0, 4.0]);
  }

  #[test]
  pub fn slices_split_the_region() {
    let clip = ramp_clip(16, 1000);
    clip.set_slices(4);
    let mut voice = Voice::new(clip, 1000);
    let mut trigger = Trigger::new(Route::Main, false);
    trigger.slice = Some(2);
    voice.start(trigger);

    let mut output = StereoBuffer::new(6);
    voice.render(&mut output, 0, 6, 6);
    assert_eq!(&output.left[..5], &[8.0, 9.0, 10.0, 11.0, 0.0]);
  }

  #[test]
  pub fn slices_removed_while_playing() {
    let clip = ramp_clip(16, 1000);
    clip.set_slices(4);
    let mut voice = Voice::new(clip.clone(), 1000);
    let mut trigger = Trigger::new(Route::Main, true);
    trigger.slice = Some(3);
    voice.start(trigger);

    let mut output = StereoBuffer::new(2);
    voice.render(&mut output, 0, 2, 2);
    assert_eq!(output.left, vec![12.0, 13.0]);

    clip.set_slices(0);
    voice.prepare();
    let mut output = StereoBuffer::new(4);
    voice.render(&mut output, 0, 4, 4);
    assert!(voice.is_playing());
    assert_eq!(output.left, vec![14.0, 15.0, 0.0, 1.0]);
  }

  #[test]
  pub fn note_semitones_scale_the_rate() {
    let clip = ramp_clip(100, 1000);
    let mut voice = Voice::new(clip, 1000);
    let mut trigger = Trigger::new(Route::Main, false);
    trigger.semitones = 12;
    voice.start(trigger);

    let mut output = StereoBuffer::new(3);
    voice.render(&mut output, 0, 3, 3);
    assert_eq!(voice.position(), 6.0);
    assert_eq!(output.left, vec![0.0, 2.0, 4.0]);
  }

  #[test]
  pub fn pitch_and_resampling_set_the_rate() {
    let clip = ramp_clip(100, 2000);
    clip.set_pitch(12.0);
    let mut voice = Voice::new(clip, 1000);
    voice.start(Trigger::new(Route::Main, false));

    let mut output = StereoBuffer::new(2);
    voice.render(&mut output, 0, 2, 2);
    assert_eq!(voice.position(), 8.0);
    assert_eq!(output.left[1], 4.0);
  }

  #[test]
  pub fn gain_changes_are_ramped() {
    let clip = ramp_clip(100, 1000);
    let mut voice = Voice::new(clip.clone(), 1000);
    voice.start(Trigger::new(Route::Main, true));
    clip.set_muted(true);
    voice.prepare();

    let mut output = StereoBuffer::new(4);
    voice.render(&mut output, 0, 4, 4);
    assert_relative_eq!(output.left[0], 0.0 * 0.75);
    assert_relative_eq!(output.left[1], 1.0 * 0.5);
    assert_relative_eq!(output.left[2], 2.0 * 0.25);
    assert_relative_eq!(output.left[3], 0.0);
    assert!(voice.is_playing());
  }

  #[test]
  pub fn reports_once_per_interval() {
    let clip = ramp_clip(1000, 1000);
    let mut voice = Voice::new(clip, 1000);
    voice.start(Trigger::new(Route::Main, false));

    let mut output = StereoBuffer::new(10);
    voice.render(&mut output, 0, 10, 10);
    assert_eq!(voice.report(10, 16), None);
    voice.render(&mut output, 0, 10, 10);
    let (progress, level) = voice.report(10, 16).unwrap();
    assert_relative_eq!(progress, 0.02);
    assert_relative_eq!(level, 20.0 * 19f32.log10(), epsilon = 1e-4);
  }
}
