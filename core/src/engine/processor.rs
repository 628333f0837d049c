use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::audio::{StereoBuffer, CHANNELS};
use crate::clip::voice::Trigger;
use crate::clip::{ClipId, ClipState, Route, Voice};
use crate::config::Config;
use crate::engine::protocol::{Protocol, Released, Telemetry};
use crate::levels::meter::Meters;
use crate::levels::recorder::{Buses, CaptureSession};
use crate::mixer::{MixerProcessor, PassthroughChannel};
use crate::time::TicksTime;
use crate::timer::{ClipAction, ClipCommand, TimerScheduler, TimerStatus};

/// Real time side of the engine, owned by the audio thread.
///
/// Nothing in here blocks or allocates once built: messages are drained with `try_recv`,
/// objects to be dropped go back through the release channel, and telemetry is sent
/// with `try_send` so it is lost rather than delayed when the consumer lags behind.
///
/// Released objects that find the channel full wait in `pending` and are sent again
/// at the start of the next buffer, they are never dropped on the audio thread.
pub struct EngineProcessor {
  max_frames: usize,
  report_interval: u32,

  protocol_rx: Receiver<Protocol>,
  released_tx: Sender<Released>,
  telemetry_tx: Sender<Telemetry>,
  pending: VecDeque<Released>,

  voices: Vec<Option<Box<Voice>>>,
  scheduler: TimerScheduler,
  due: Vec<ClipCommand>,

  mixer: MixerProcessor,
  main: StereoBuffer,
  master: StereoBuffer,
  meters: Arc<Meters>,
  capture: Option<Box<CaptureSession>>,
}

impl EngineProcessor {
  pub(crate) fn new(
    config: &Config,
    protocol_rx: Receiver<Protocol>,
    released_tx: Sender<Released>,
    telemetry_tx: Sender<Telemetry>,
    status: Arc<TimerStatus>,
    channels: Arc<Vec<PassthroughChannel>>,
    meters: Arc<Meters>,
  ) -> EngineProcessor {
    let sample_rate = config.audio.sample_rate;
    let max_frames = config.audio.max_frames;
    let capacity = config.timer.max_pending_events;

    EngineProcessor {
      max_frames,
      report_interval: config.telemetry.interval_frames(sample_rate),
      protocol_rx,
      released_tx,
      telemetry_tx,
      pending: VecDeque::with_capacity(config.engine.release_queue.max(1)),
      voices: (0..config.engine.max_clips).map(|_| None).collect(),
      scheduler: TimerScheduler::new(status, sample_rate, config.timer.start_quantum_ticks, capacity),
      due: Vec::with_capacity(capacity),
      mixer: MixerProcessor::new(channels, max_frames),
      main: StereoBuffer::new(max_frames),
      master: StereoBuffer::new(max_frames),
      meters,
      capture: None,
    }
  }

  /// Renders `frames` of interleaved stereo into `output`, in chunks of at most `audio.max_frames`.
  pub fn process(&mut self, frames: usize, output: &mut [f32]) {
    let frames = frames.min(output.len() / CHANNELS);
    let mut offset = 0;
    while offset < frames {
      let chunk = (frames - offset).min(self.max_frames);
      let start = offset * CHANNELS;
      let end = (offset + chunk) * CHANNELS;
      self.process_chunk(chunk, &mut output[start..end]);
      offset += chunk;
    }
  }

  fn process_chunk(&mut self, frames: usize, output: &mut [f32]) {
    self.flush_pending();
    self.drain_protocol();

    self.scheduler.begin_buffer();
    for voice in self.voices.iter_mut().flatten() {
      voice.prepare();
    }

    self.main.clear(frames);
    self.mixer.clear_inputs(frames);

    let mut offset = 0;
    while let Some((boundary, tick)) = self.scheduler.next_boundary(offset, frames) {
      self.render(offset, boundary, frames);
      self.scheduler.take_due(tick, &mut self.due);
      self.apply_due(Some(tick));
      self.scheduler.fire_callback(tick);
      offset = boundary;
    }
    self.render(offset, frames, frames);

    let tick = self.scheduler.current_tick();
    for voice in self.voices.iter_mut().flatten() {
      if voice.take_finished() {
        voice.clip().mark_stopped(tick);
        drop(self.telemetry_tx.try_send(Telemetry::State {
          clip: voice.id(),
          state: ClipState::Stopped,
          tick,
        }));
      }
    }

    self.mixer.process(frames);
    self.master.clear(frames);
    self.master.mix_from(&self.main, frames, 1.0, 1.0);
    self.master.mix_from(self.mixer.dry(), frames, 1.0, 1.0);

    self.meters.master.update(self.master.peaks(frames));
    for (meter, channel) in self.meters.channels.iter().zip(self.mixer.channel_outputs()) {
      meter.update(channel.peaks(frames));
    }

    if let Some(session) = self.capture.as_mut() {
      let buses = Buses {
        master: &self.master,
        fx1: self.mixer.fx1(),
        fx2: self.mixer.fx2(),
        channels: self.mixer.channel_outputs(),
      };
      session.capture(&buses, frames);
    }

    for voice in self.voices.iter_mut().flatten() {
      if let Some((progress, db)) = voice.report(frames, self.report_interval) {
        let clip = voice.id();
        drop(self.telemetry_tx.try_send(Telemetry::Progress { clip, progress }));
        drop(self.telemetry_tx.try_send(Telemetry::Level { clip, db }));
      }
    }

    self.master.write_interleaved(output, frames);
  }

  fn render(&mut self, from: usize, to: usize, frames: usize) {
    if from >= to {
      return;
    }
    let main = &mut self.main;
    let mixer = &mut self.mixer;
    for voice in self.voices.iter_mut().flatten() {
      let output = match voice.route() {
        Route::Main => Some(&mut *main),
        Route::Channel(channel) => mixer.input_mut(channel),
      };
      if let Some(output) = output {
        voice.render(output, from, to, frames);
      }
    }
  }

  fn drain_protocol(&mut self) {
    while let Ok(msg) = self.protocol_rx.try_recv() {
      match msg {
        Protocol::AddClip(voice) => self.add_voice(voice),

        Protocol::RemoveClip(id) => self.remove_voice(id),

        Protocol::Play {
          clip,
          route,
          looping,
        } => {
          let tick = self.scheduler.current_tick();
          self.start_voice(clip, Trigger::new(route, looping), tick);
        }

        Protocol::PlayNote { clip, route, note } => self.play_note(clip, route, note),

        Protocol::Stop { clip, route } => {
          let tick = self.scheduler.current_tick();
          self.stop_voice(clip, route, tick);
        }

        Protocol::StartTimer => self.scheduler.start(),

        Protocol::StopTimer => {
          let tick = self.scheduler.current_tick();
          self.scheduler.stop(&mut self.due);
          self.apply_due(tick);
        }

        Protocol::Queue(command) => {
          self.scheduler.schedule(command);
        }

        Protocol::StopClips(clips) => {
          self.scheduler.schedule_stop_batch(&clips);
          self.release(Released::Clips(clips));
        }

        Protocol::SetTickCallback(callback) => {
          if let Some(previous) = self.scheduler.set_callback(callback) {
            self.release(Released::TickCallback(previous));
          }
        }

        Protocol::StartCapture(session) => {
          if let Some(previous) = self.capture.replace(session) {
            self.release(Released::Capture(previous));
          }
        }

        Protocol::StopCapture => {
          if let Some(session) = self.capture.take() {
            self.release(Released::Capture(session));
          }
        }
      }
    }
  }

  fn apply_due(&mut self, tick: Option<TicksTime>) {
    let mut due = std::mem::replace(&mut self.due, Vec::new());
    for command in due.drain(..) {
      match command.action {
        ClipAction::Start { route } => self.start_voice(command.clip, Trigger::new(route, true), tick),
        ClipAction::Stop { route } => self.stop_voice(command.clip, route, tick),
      }
    }
    self.due = due;
  }

  fn add_voice(&mut self, voice: Box<Voice>) {
    let index = voice.id().index();
    match self.voices.get_mut(index) {
      Some(slot) => {
        voice.clip().set_state(ClipState::Ready);
        let state = Telemetry::State {
          clip: voice.id(),
          state: ClipState::Ready,
          tick: None,
        };
        let previous = slot.replace(voice);
        drop(self.telemetry_tx.try_send(state));
        if let Some(previous) = previous {
          self.release(Released::Voice(previous));
        }
      }
      None => self.release(Released::Voice(voice)),
    }
  }

  fn remove_voice(&mut self, id: ClipId) {
    let voice = match self.voices.get_mut(id.index()) {
      Some(slot) if slot.as_ref().map(|voice| voice.id() == id).unwrap_or(false) => slot.take(),
      _ => None,
    };
    if let Some(voice) = voice {
      voice.clip().set_state(ClipState::Destroyed);
      self.scheduler.purge(id);
      self.release(Released::Voice(voice));
    }
  }

  fn start_voice(&mut self, id: ClipId, trigger: Trigger, tick: Option<TicksTime>) {
    if let Some(voice) = find_voice(&mut self.voices, id) {
      voice.start(trigger);
      voice.clip().mark_started(tick);
      drop(self.telemetry_tx.try_send(Telemetry::State {
        clip: id,
        state: ClipState::Playing,
        tick,
      }));
    }
  }

  fn stop_voice(&mut self, id: ClipId, route: Option<Route>, tick: Option<TicksTime>) {
    if let Some(voice) = find_voice(&mut self.voices, id) {
      let on_route = route.map(|route| route == voice.route()).unwrap_or(true);
      if on_route && voice.stop() {
        voice.clip().mark_stopped(tick);
        drop(self.telemetry_tx.try_send(Telemetry::State {
          clip: id,
          state: ClipState::Stopped,
          tick,
        }));
      }
    }
  }

  fn play_note(&mut self, id: ClipId, route: Route, note: i32) {
    let trigger = match find_voice(&mut self.voices, id) {
      Some(voice) => {
        let clip = voice.clip();
        if !clip.in_key_zone(note) {
          return;
        }
        let mut trigger = Trigger::new(route, false);
        match clip.slice_for_note(note) {
          Some(slice) => trigger.slice = Some(slice),
          None if clip.root_note() >= 0 => trigger.semitones = note - clip.root_note(),
          None => {}
        }
        trigger
      }
      None => return,
    };
    let tick = self.scheduler.current_tick();
    self.start_voice(id, trigger, tick);
  }

  fn release(&mut self, released: Released) {
    if !self.pending.is_empty() {
      self.pending.push_back(released);
      return;
    }
    match self.released_tx.try_send(released) {
      Ok(()) => {}
      Err(TrySendError::Full(released)) => self.pending.push_back(released),
      // nobody left to drop it on the control side
      Err(TrySendError::Disconnected(_)) => {}
    }
  }

  fn flush_pending(&mut self) {
    while let Some(released) = self.pending.pop_front() {
      match self.released_tx.try_send(released) {
        Ok(()) => {}
        Err(TrySendError::Full(released)) => {
          self.pending.push_front(released);
          break;
        }
        Err(TrySendError::Disconnected(_)) => {
          self.pending.clear();
          break;
        }
      }
    }
  }
}

fn find_voice(voices: &mut [Option<Box<Voice>>], id: ClipId) -> Option<&mut Box<Voice>> {
  voices
    .get_mut(id.index())
    .and_then(|slot| slot.as_mut())
    .filter(|voice| voice.id() == id)
}

#[cfg(test)]
mod test {

  use std::sync::Arc;

  use super::EngineProcessor;
  use crate::audio::AudioData;
  use crate::clip::{ClipId, ClipShared, ClipState, Voice};
  use crate::config::Config;
  use crate::engine::protocol::{Protocol, Released};
  use crate::levels::meter::Meters;
  use crate::levels::recorder::CaptureSession;
  use crate::mixer::Mixer;
  use crate::time::Tempo;
  use crate::timer::TimerStatus;

  fn clip(id: ClipId, frames: usize) -> Arc<ClipShared> {
    let data = AudioData::new("clip.wav".into(), 1000, vec![0.25; frames], vec![0.25; frames]);
    Arc::new(ClipShared::new(id, Arc::new(data)))
  }

  fn new_processor(
    max_frames: usize,
  ) -> (
    EngineProcessor,
    crossbeam_channel::Sender<Protocol>,
    crossbeam_channel::Receiver<Released>,
  ) {
    with_release_queue(max_frames, 16)
  }

  fn with_release_queue(
    max_frames: usize,
    release_queue: usize,
  ) -> (
    EngineProcessor,
    crossbeam_channel::Sender<Protocol>,
    crossbeam_channel::Receiver<Released>,
  ) {
    let mut config = Config::default();
    config.audio.sample_rate = 1000;
    config.audio.max_frames = max_frames;
    config.engine.max_clips = 2;
    config.engine.release_queue = release_queue;
    let (protocol_tx, protocol_rx) = crossbeam_channel::bounded(16);
    let (released_tx, released_rx) = crossbeam_channel::bounded(release_queue);
    let (telemetry_tx, _telemetry_rx) = crossbeam_channel::bounded(16);
    let processor = EngineProcessor::new(
      &config,
      protocol_rx,
      released_tx,
      telemetry_tx,
      Arc::new(TimerStatus::new(Tempo::default())),
      Mixer::new().channels(),
      Arc::new(Meters::new()),
    );
    (processor, protocol_tx, released_rx)
  }

  #[test]
  pub fn large_buffers_are_processed_in_chunks() {
    let (mut processor, protocol_tx, _released_rx) = new_processor(4);
    let id = ClipId::new(0, 1);
    let shared = clip(id, 100);
    protocol_tx
      .send(Protocol::AddClip(Box::new(Voice::new(shared.clone(), 1000))))
      .unwrap();
    protocol_tx
      .send(Protocol::Play {
        clip: id,
        route: crate::clip::Route::Main,
        looping: false,
      })
      .unwrap();

    let mut output = vec![0.0; 20];
    processor.process(10, &mut output);
    assert!(output.iter().all(|s| *s == 0.25));
    assert_eq!(shared.state(), ClipState::Playing);
  }

  #[test]
  pub fn removed_voices_are_released() {
    let (mut processor, protocol_tx, released_rx) = new_processor(4);
    let id = ClipId::new(1, 1);
    let shared = clip(id, 10);
    protocol_tx
      .send(Protocol::AddClip(Box::new(Voice::new(shared.clone(), 1000))))
      .unwrap();
    protocol_tx.send(Protocol::RemoveClip(ClipId::new(1, 2))).unwrap();
    let mut output = vec![0.0; 8];
    processor.process(4, &mut output);
    assert!(released_rx.try_recv().is_err());
    assert_eq!(shared.state(), ClipState::Ready);

    protocol_tx.send(Protocol::RemoveClip(id)).unwrap();
    processor.process(4, &mut output);
    match released_rx.try_recv() {
      Ok(Released::Voice(voice)) => assert_eq!(voice.id(), id),
      _ => panic!("expected the voice back"),
    }
    assert_eq!(shared.state(), ClipState::Destroyed);
  }

  #[test]
  pub fn clips_beyond_capacity_are_released() {
    let (mut processor, protocol_tx, released_rx) = new_processor(4);
    let shared = clip(ClipId::new(5, 1), 10);
    protocol_tx
      .send(Protocol::AddClip(Box::new(Voice::new(shared.clone(), 1000))))
      .unwrap();
    let mut output = vec![0.0; 8];
    processor.process(4, &mut output);
    assert!(released_rx.try_recv().is_ok());
    assert_eq!(shared.state(), ClipState::Created);
  }

  #[test]
  pub fn releases_wait_for_room_in_a_full_queue() {
    let (mut processor, protocol_tx, released_rx) = with_release_queue(4, 1);
    let id = ClipId::new(0, 1);
    protocol_tx
      .send(Protocol::AddClip(Box::new(Voice::new(clip(id, 10), 1000))))
      .unwrap();
    protocol_tx
      .send(Protocol::StartCapture(Box::new(CaptureSession::new(7, Vec::new()))))
      .unwrap();
    let mut output = vec![0.0; 8];
    processor.process(4, &mut output);

    protocol_tx.send(Protocol::RemoveClip(id)).unwrap();
    protocol_tx.send(Protocol::StopCapture).unwrap();
    processor.process(4, &mut output);
    processor.process(4, &mut output);

    match released_rx.try_recv() {
      Ok(Released::Voice(voice)) => assert_eq!(voice.id(), id),
      _ => panic!("expected the voice back first"),
    }
    assert!(released_rx.try_recv().is_err());

    processor.process(4, &mut output);
    match released_rx.try_recv() {
      Ok(Released::Capture(session)) => assert_eq!(session.id(), 7),
      _ => panic!("expected the capture session back"),
    }
  }
}
