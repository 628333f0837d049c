use std::sync::Arc;

use log::warn;

use crate::clip::{ClipId, Route};
use crate::time::{SampleRate, Tempo, TicksDriftCorrection, TicksTime};
use crate::timer::{ClipAction, ClipCommand, TickCallback, TimerStatus};

#[derive(Debug, Clone, Copy)]
struct ScheduledEvent {
  tick: TicksTime,
  command: ClipCommand,
}

/// Audio thread side of the timer.
///
/// Splits every buffer at tick boundaries and hands out the clip commands due at each of them.
pub struct TimerScheduler {
  status: Arc<TimerStatus>,
  tempo: Tempo,
  drift_correction: TicksDriftCorrection,
  running: bool,
  next_tick: TicksTime,
  start_quantum: u64,
  pending: Vec<ScheduledEvent>,
  callback: Option<Box<dyn TickCallback>>,
}

impl TimerScheduler {
  pub fn new(
    status: Arc<TimerStatus>,
    sample_rate: SampleRate,
    start_quantum: u64,
    capacity: usize,
  ) -> TimerScheduler {
    let tempo = status.tempo();
    TimerScheduler {
      status,
      tempo,
      drift_correction: TicksDriftCorrection::new(tempo, sample_rate),
      running: false,
      next_tick: TicksTime::zero(),
      start_quantum: start_quantum.max(1),
      pending: Vec::with_capacity(capacity),
      callback: None,
    }
  }

  pub fn capacity(&self) -> usize {
    self.pending.capacity()
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  pub fn pending_len(&self) -> usize {
    self.pending.len()
  }

  /// The last tick boundary crossed since the timer started.
  pub fn current_tick(&self) -> Option<TicksTime> {
    if self.running && self.next_tick > TicksTime::zero() {
      Some(self.next_tick - TicksTime::new(1))
    } else {
      None
    }
  }

  pub fn start(&mut self) {
    if self.running {
      return;
    }
    self.running = true;
    self.next_tick = TicksTime::zero();
    self.drift_correction.reset_to_boundary();
    self.status.set_running(true);
  }

  /// Pending stops go to `immediate`, pending starts wait for the first tick of the next start.
  pub fn stop(&mut self, immediate: &mut Vec<ClipCommand>) {
    self.running = false;
    self.next_tick = TicksTime::zero();
    self.pending.retain(|event| match event.command.action {
      ClipAction::Stop { .. } => {
        immediate.push(event.command);
        false
      }
      ClipAction::Start { .. } => true,
    });
    for event in self.pending.iter_mut() {
      event.tick = TicksTime::zero();
    }
    self.status.set_running(false);
    self.status.set_tick(TicksTime::zero());
  }

  /// Queues a command for the next tick boundary, starts are aligned to the start quantum.
  pub fn schedule(&mut self, command: ClipCommand) -> bool {
    let tick = match command.action {
      ClipAction::Start { .. } => self.next_tick.align_up(self.start_quantum),
      ClipAction::Stop { route } => {
        self.unschedule_starts(command.clip, route);
        self.next_tick
      }
    };
    self.push(ScheduledEvent { tick, command })
  }

  /// Queues a stop for every clip on the same tick, or none of them.
  pub fn schedule_stop_batch(&mut self, clips: &[ClipId]) -> bool {
    if self.pending.len() + clips.len() > self.pending.capacity() {
      warn!(
        "Dropped a batch of {} clip stops, the timer queue is full",
        clips.len()
      );
      return false;
    }
    let tick = self.next_tick;
    for clip in clips.iter() {
      self.unschedule_starts(*clip, None);
      self.pending.push(ScheduledEvent {
        tick,
        command: ClipCommand::stop(*clip, None),
      });
    }
    true
  }

  /// Forgets every event of a clip.
  pub fn purge(&mut self, clip: ClipId) {
    self.pending.retain(|event| event.command.clip != clip);
  }

  pub fn set_callback(
    &mut self,
    callback: Option<Box<dyn TickCallback>>,
  ) -> Option<Box<dyn TickCallback>> {
    std::mem::replace(&mut self.callback, callback)
  }

  pub fn begin_buffer(&mut self) {
    let tempo = self.status.tempo();
    if tempo != self.tempo {
      self.tempo = tempo;
      self.drift_correction.set_tempo(tempo);
    }
  }

  /// Advances to the next tick boundary inside the buffer, if any, and returns its offset.
  pub fn next_boundary(&mut self, offset: usize, frames: usize) -> Option<(usize, TicksTime)> {
    if !self.running || offset >= frames {
      return None;
    }
    let remaining = (frames - offset) as u64;
    let samples = self.drift_correction.samples_to_next_tick();
    if samples < remaining {
      self.drift_correction.advance(samples);
      self.drift_correction.cross_tick();
      let tick = self.next_tick;
      self.next_tick += TicksTime::new(1);
      self.status.set_tick(tick);
      Some((offset + samples as usize, tick))
    } else {
      self.drift_correction.advance(remaining);
      None
    }
  }

  /// Moves every command due at `tick` into `due`, keeping their queuing order.
  pub fn take_due(&mut self, tick: TicksTime, due: &mut Vec<ClipCommand>) {
    self.pending.retain(|event| {
      if event.tick <= tick {
        due.push(event.command);
        false
      } else {
        true
      }
    });
  }

  pub fn fire_callback(&mut self, tick: TicksTime) {
    if let Some(callback) = self.callback.as_mut() {
      callback.on_tick(tick);
    }
  }

  fn unschedule_starts(&mut self, clip: ClipId, route: Option<Route>) {
    self.pending.retain(|event| match event.command.action {
      ClipAction::Start { route: start_route } if event.command.clip == clip => {
        route.map(|route| route != start_route).unwrap_or(false)
      }
      _ => true,
    });
  }

  fn push(&mut self, event: ScheduledEvent) -> bool {
    if self.pending.len() < self.pending.capacity() {
      self.pending.push(event);
      true
    } else {
      warn!(
        "Dropped {:?} for clip {}, the timer queue is full",
        event.command.action, event.command.clip
      );
      false
    }
  }
}
