pub mod scheduler;

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use log::debug;

use crate::clip::{ClipId, Route};
use crate::engine::protocol::{send, Protocol};
use crate::engine::EngineError;
use crate::time::ticks::TICKS_PER_BEAT;
use crate::time::{Tempo, TicksTime};

pub use self::scheduler::TimerScheduler;

/// Invoked on the audio thread for every tick, it must not block or allocate.
pub trait TickCallback: Send {
  fn on_tick(&mut self, tick: TicksTime);
}

impl<F> TickCallback for F
where
  F: FnMut(TicksTime) + Send,
{
  fn on_tick(&mut self, tick: TicksTime) {
    self(tick)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipAction {
  Start { route: Route },
  /// Stops the clip when it plays on `route`, or wherever it plays when `None`.
  Stop { route: Option<Route> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipCommand {
  pub clip: ClipId,
  pub action: ClipAction,
}

impl ClipCommand {
  pub fn start(clip: ClipId, route: Route) -> ClipCommand {
    ClipCommand {
      clip,
      action: ClipAction::Start { route },
    }
  }

  pub fn stop(clip: ClipId, route: Option<Route>) -> ClipCommand {
    ClipCommand {
      clip,
      action: ClipAction::Stop { route },
    }
  }
}

/// Timer state mirrored between the control side and the audio thread.
pub struct TimerStatus {
  running: AtomicBool,
  tick: AtomicU64,
  bpm: AtomicU16,
}

impl TimerStatus {
  pub fn new(tempo: Tempo) -> TimerStatus {
    TimerStatus {
      running: AtomicBool::new(false),
      tick: AtomicU64::new(0),
      bpm: AtomicU16::new(tempo.get_value()),
    }
  }

  pub(crate) fn set_running(&self, running: bool) {
    self.running.store(running, Ordering::Release);
  }

  pub(crate) fn set_tick(&self, tick: TicksTime) {
    self.tick.store(u64::from(tick), Ordering::Release);
  }

  pub(crate) fn tempo(&self) -> Tempo {
    Tempo::new(self.bpm.load(Ordering::Acquire))
  }
}

/// Control handle of the global clock.
pub struct SyncTimer {
  status: Arc<TimerStatus>,
  protocol_tx: Sender<Protocol>,
}

impl SyncTimer {
  pub fn new(status: Arc<TimerStatus>, protocol_tx: Sender<Protocol>) -> SyncTimer {
    SyncTimer {
      status,
      protocol_tx,
    }
  }

  /// Starts ticking. A non zero `interval_ms` sets the tempo whose tick lasts that long.
  pub fn start(&self, interval_ms: f64) -> Result<(), EngineError> {
    if interval_ms > 0.0 {
      self.set_bpm(Tempo::from_interval_ms(interval_ms).get_value());
    }
    debug!("Starting the timer at {} bpm", self.bpm());
    send(&self.protocol_tx, Protocol::StartTimer)?;
    self.status.set_running(true);
    Ok(())
  }

  pub fn stop(&self) -> Result<(), EngineError> {
    debug!("Stopping the timer");
    send(&self.protocol_tx, Protocol::StopTimer)?;
    self.status.set_running(false);
    Ok(())
  }

  /// Takes effect at the next buffer, the position inside the current tick is kept.
  pub fn set_bpm(&self, bpm: u16) -> u16 {
    let tempo = Tempo::new(bpm);
    self.status.bpm.store(tempo.get_value(), Ordering::Release);
    tempo.get_value()
  }

  pub fn bpm(&self) -> u16 {
    self.status.tempo().get_value()
  }

  pub fn tempo(&self) -> Tempo {
    self.status.tempo()
  }

  /// Ticks per beat.
  pub fn get_multiplier(&self) -> u64 {
    TICKS_PER_BEAT
  }

  pub fn interval_ms(&self) -> f64 {
    self.tempo().interval_ms()
  }

  /// Last tick applied by the audio thread.
  pub fn tick(&self) -> TicksTime {
    TicksTime::new(self.status.tick.load(Ordering::Acquire))
  }

  pub fn is_running(&self) -> bool {
    self.status.running.load(Ordering::Acquire)
  }

  pub fn register_tick_callback<C>(&self, callback: C) -> Result<(), EngineError>
  where
    C: TickCallback + 'static,
  {
    send(
      &self.protocol_tx,
      Protocol::SetTickCallback(Some(Box::new(callback))),
    )
  }

  pub fn clear_tick_callback(&self) -> Result<(), EngineError> {
    send(&self.protocol_tx, Protocol::SetTickCallback(None))
  }

  pub(crate) fn queue(&self, command: ClipCommand) -> Result<(), EngineError> {
    send(&self.protocol_tx, Protocol::Queue(command))
  }

  pub(crate) fn queue_stop_batch(&self, clips: Box<[ClipId]>) -> Result<(), EngineError> {
    send(&self.protocol_tx, Protocol::StopClips(clips))
  }
}

#[cfg(test)]
mod test {

  use std::sync::Arc;

  use approx::assert_relative_eq;

  use super::{SyncTimer, TimerStatus};
  use crate::engine::protocol::Protocol;
  use crate::time::tempo::{MAX_BPM, MIN_BPM};
  use crate::time::Tempo;

  fn new_timer() -> (SyncTimer, crossbeam_channel::Receiver<Protocol>) {
    let (tx, rx) = crossbeam_channel::bounded(8);
    let status = Arc::new(TimerStatus::new(Tempo::default()));
    (SyncTimer::new(status, tx), rx)
  }

  #[test]
  pub fn multiplier_for_every_bpm() {
    let (timer, _rx) = new_timer();
    for bpm in MIN_BPM..=MAX_BPM {
      assert_eq!(timer.set_bpm(bpm), bpm);
      assert_eq!(timer.get_multiplier(), 96);
      assert_relative_eq!(timer.interval_ms(), 60_000.0 / (f64::from(bpm) * 96.0));
    }
  }

  #[test]
  pub fn bpm_is_clamped() {
    let (timer, _rx) = new_timer();
    assert_eq!(timer.set_bpm(20), MIN_BPM);
    assert_eq!(timer.bpm(), MIN_BPM);
  }

  #[test]
  pub fn start_with_interval_sets_bpm() {
    let (timer, rx) = new_timer();
    timer.start(5.0).unwrap();
    assert_eq!(timer.bpm(), 125);
    assert!(timer.is_running());
    match rx.try_recv() {
      Ok(Protocol::StartTimer) => {}
      _ => panic!("expected a start message"),
    }
  }

  #[test]
  pub fn start_without_interval_keeps_bpm() {
    let (timer, _rx) = new_timer();
    timer.set_bpm(90);
    timer.start(0.0).unwrap();
    assert_eq!(timer.bpm(), 90);
    timer.stop().unwrap();
    assert!(!timer.is_running());
  }
}
