pub mod processor;
pub mod protocol;

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use failure::Fail;
use log::{debug, info, trace};

use crate::audio::AudioData;
use crate::clip::arena::ClipArena;
use crate::clip::{ClipId, ClipShared, ClipState, Route, Voice};
use crate::config::Config;
use crate::levels::meter::Meters;
use crate::levels::AudioLevels;
use crate::mixer::{Mixer, CHANNEL_COUNT};
use crate::time::Tempo;
use crate::timer::{ClipCommand, SyncTimer, TimerStatus};

use self::protocol::{send, Protocol, Released, Telemetry};

pub use self::processor::EngineProcessor;

#[derive(Debug, Fail)]
pub enum EngineError {
  #[fail(display = "Invalid clip: {}", id)]
  InvalidClip { id: ClipId },

  #[fail(display = "Invalid tempo: {} bpm", bpm)]
  InvalidTempo { bpm: u16 },

  #[fail(display = "Invalid channel: {}", channel)]
  InvalidChannel { channel: usize },

  #[fail(display = "Failed to decode {}: {}", path, cause)]
  Decode { path: String, cause: String },

  #[fail(display = "Unknown port: {}", name)]
  UnknownPort { name: String },

  #[fail(display = "The control queue is full")]
  QueueFull,

  #[fail(display = "The audio thread is gone")]
  Disconnected,

  #[fail(display = "There is no room for more than {} clips", capacity)]
  ArenaFull { capacity: usize },

  #[fail(display = "Recording failed: {}", cause)]
  Recording { cause: String },

  #[fail(display = "Invalid configuration: {}", cause)]
  Config { cause: String },
}

/// Control side of the engine.
///
/// Every operation is non blocking: parameters are atomic stores, structural changes
/// are queued for the [`EngineProcessor`] which applies them at the next buffer.
pub struct Engine {
  config: Config,
  protocol_tx: Sender<Protocol>,
  released_rx: Receiver<Released>,
  telemetry_rx: Receiver<Telemetry>,
  clips: ClipArena,
  timer: SyncTimer,
  mixer: Mixer,
  levels: AudioLevels,
}

impl Engine {
  /// Creates the engine and the processor to be moved into the audio thread.
  pub fn new(config: Config) -> Result<(Engine, EngineProcessor), EngineError> {
    validate(&config)?;

    info!(
      "Initialising the engine: {} Hz, {} clips, {} bpm",
      config.audio.sample_rate, config.engine.max_clips, config.timer.bpm
    );

    let (protocol_tx, protocol_rx) = crossbeam_channel::bounded(config.engine.control_queue);
    let (released_tx, released_rx) = crossbeam_channel::bounded(config.engine.release_queue);
    let (telemetry_tx, telemetry_rx) = crossbeam_channel::bounded(config.telemetry.queue);

    let status = Arc::new(TimerStatus::new(Tempo::new(config.timer.bpm)));
    let mixer = Mixer::new();
    let meters = Arc::new(Meters::new());

    let processor = EngineProcessor::new(
      &config,
      protocol_rx,
      released_tx,
      telemetry_tx,
      status.clone(),
      mixer.channels(),
      meters.clone(),
    );

    let engine = Engine {
      clips: ClipArena::new(config.engine.max_clips),
      timer: SyncTimer::new(status, protocol_tx.clone()),
      levels: AudioLevels::new(protocol_tx.clone(), meters, &config),
      mixer,
      protocol_tx,
      released_rx,
      telemetry_rx,
      config,
    };

    Ok((engine, processor))
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn timer(&self) -> &SyncTimer {
    &self.timer
  }

  pub fn mixer(&self) -> &Mixer {
    &self.mixer
  }

  pub fn levels(&self) -> &AudioLevels {
    &self.levels
  }

  pub fn levels_mut(&mut self) -> &mut AudioLevels {
    &mut self.levels
  }

  /// Decodes an audio file into a new clip, ready once the audio thread has adopted it.
  pub fn create_clip<P: AsRef<Path>>(&mut self, path: P) -> Result<ClipId, EngineError> {
    let id = self.clips.next_id()?;
    let data = AudioData::decode(path)?;
    let clip = Arc::new(ClipShared::new(id, Arc::new(data)));
    let voice = Voice::new(clip.clone(), self.config.audio.sample_rate);
    send(&self.protocol_tx, Protocol::AddClip(Box::new(voice)))?;
    self.clips.insert(clip.clone())?;
    info!(
      "Created clip {} from {} ({:.3} seconds)",
      id,
      clip.data().path().display(),
      clip.duration()
    );
    Ok(id)
  }

  /// Destroys a clip, its id never resolves again.
  pub fn destroy_clip(&mut self, id: ClipId) -> Result<(), EngineError> {
    self.clips.get(id)?;
    send(&self.protocol_tx, Protocol::RemoveClip(id))?;
    let clip = self.clips.remove(id)?;
    clip.set_state(ClipState::Destroyed);
    info!("Destroyed clip {}", id);
    Ok(())
  }

  pub fn clip(&self, id: ClipId) -> Result<ClipRef, EngineError> {
    let clip = self.clips.get(id)?;
    Ok(ClipRef {
      clip,
      protocol_tx: &self.protocol_tx,
    })
  }

  pub fn clip_ids(&self) -> Vec<ClipId> {
    self.clips.ids().collect()
  }

  pub fn queue_clip_to_start(&self, id: ClipId) -> Result<(), EngineError> {
    self.queue(ClipCommand::start(id, Route::Main))
  }

  pub fn queue_clip_to_start_on_channel(&self, id: ClipId, channel: usize) -> Result<(), EngineError> {
    check_channel(channel)?;
    self.queue(ClipCommand::start(id, Route::Channel(channel)))
  }

  pub fn queue_clip_to_stop(&self, id: ClipId) -> Result<(), EngineError> {
    self.queue(ClipCommand::stop(id, None))
  }

  pub fn queue_clip_to_stop_on_channel(&self, id: ClipId, channel: usize) -> Result<(), EngineError> {
    check_channel(channel)?;
    self.queue(ClipCommand::stop(id, Some(Route::Channel(channel))))
  }

  fn queue(&self, command: ClipCommand) -> Result<(), EngineError> {
    self.clips.get(command.clip)?;
    trace!("Queuing {:?} for clip {}", command.action, command.clip);
    self.timer.queue(command)
  }

  /// Stops every clip on the same tick. Nothing is stopped when any id is invalid.
  pub fn stop_clips(&self, ids: &[ClipId]) -> Result<(), EngineError> {
    for id in ids.iter() {
      self.clips.get(*id)?;
    }
    debug!("Stopping {} clips", ids.len());
    self.timer.queue_stop_batch(ids.to_vec().into_boxed_slice())
  }

  /// Registers a callback invoked from `maintain` with the playback progress of a clip.
  pub fn on_progress<F>(&mut self, id: ClipId, callback: F) -> Result<(), EngineError>
  where
    F: FnMut(f32) + Send + 'static,
  {
    self.clips.callbacks_mut(id)?.progress = Some(Box::new(callback));
    Ok(())
  }

  /// Registers a callback invoked from `maintain` with the level of a clip in dB.
  pub fn on_level<F>(&mut self, id: ClipId, callback: F) -> Result<(), EngineError>
  where
    F: FnMut(f32) + Send + 'static,
  {
    self.clips.callbacks_mut(id)?.level = Some(Box::new(callback));
    Ok(())
  }

  /// Consumes what the audio thread sent back: telemetry, objects to drop and finished recordings.
  pub fn maintain(&mut self) {
    for telemetry in self.telemetry_rx.try_iter() {
      match telemetry {
        Telemetry::Progress { clip, progress } => {
          if let Ok(shared) = self.clips.get(clip) {
            shared.set_progress(progress);
          }
          if let Ok(callbacks) = self.clips.callbacks_mut(clip) {
            if let Some(callback) = callbacks.progress.as_mut() {
              callback(progress);
            }
          }
        }
        Telemetry::Level { clip, db } => {
          if let Ok(shared) = self.clips.get(clip) {
            shared.set_level_db(db);
          }
          if let Ok(callbacks) = self.clips.callbacks_mut(clip) {
            if let Some(callback) = callbacks.level.as_mut() {
              callback(db);
            }
          }
        }
        Telemetry::State { clip, state, tick } => match tick {
          Some(tick) => debug!("Clip {} is {:?} at {}", clip, state, tick),
          None => debug!("Clip {} is {:?}", clip, state),
        },
      }
    }

    for released in self.released_rx.try_iter() {
      match released {
        Released::Voice(voice) => trace!("Dropping the voice of clip {}", voice.id()),
        Released::Clips(clips) => trace!("Dropping a batch of {} clips", clips.len()),
        Released::TickCallback(_) => trace!("Dropping a tick callback"),
        Released::Capture(session) => self.levels.finalize(session),
      }
    }
  }
}

fn validate(config: &Config) -> Result<(), EngineError> {
  let invalid = |cause: &str| {
    Err(EngineError::Config {
      cause: cause.to_string(),
    })
  };
  if config.audio.sample_rate == 0 {
    return invalid("the sample rate must be positive");
  }
  if config.audio.max_frames == 0 {
    return invalid("audio.max_frames must be positive");
  }
  if config.engine.max_clips == 0 {
    return invalid("engine.max_clips must be positive");
  }
  if config.engine.control_queue == 0 || config.engine.release_queue == 0 || config.telemetry.queue == 0 {
    return invalid("queue sizes must be positive");
  }
  match config.recorder.bits_per_sample {
    16 | 24 | 32 => {}
    _ => return invalid("recorder.bits_per_sample must be 16, 24 or 32"),
  }
  Ok(())
}

fn check_channel(channel: usize) -> Result<(), EngineError> {
  if channel < CHANNEL_COUNT {
    Ok(())
  } else {
    Err(EngineError::InvalidChannel { channel })
  }
}

/// A live clip. Parameters are read and written through [`ClipShared`].
pub struct ClipRef<'a> {
  clip: &'a Arc<ClipShared>,
  protocol_tx: &'a Sender<Protocol>,
}

impl<'a> ClipRef<'a> {
  pub fn file_name(&self) -> &str {
    self.clip.data().file_name()
  }

  pub fn file_path(&self) -> &Path {
    self.clip.data().path()
  }

  pub fn play(&self, looping: bool) -> Result<(), EngineError> {
    self.send_play(Route::Main, looping)
  }

  pub fn play_on_channel(&self, looping: bool, channel: usize) -> Result<(), EngineError> {
    check_channel(channel)?;
    self.send_play(Route::Channel(channel), looping)
  }

  fn send_play(&self, route: Route, looping: bool) -> Result<(), EngineError> {
    send(
      self.protocol_tx,
      Protocol::Play {
        clip: self.clip.id(),
        route,
        looping,
      },
    )
  }

  /// Plays once as a sampler would, ignored when the note is outside the key zone.
  pub fn play_note(&self, note: i32, channel: Option<usize>) -> Result<(), EngineError> {
    if let Some(channel) = channel {
      check_channel(channel)?;
    }
    send(
      self.protocol_tx,
      Protocol::PlayNote {
        clip: self.clip.id(),
        route: Route::from_channel(channel),
        note,
      },
    )
  }

  pub fn stop(&self) -> Result<(), EngineError> {
    self.send_stop(None)
  }

  /// Stops the clip only when it plays on `channel`.
  pub fn stop_on_channel(&self, channel: usize) -> Result<(), EngineError> {
    check_channel(channel)?;
    self.send_stop(Some(Route::Channel(channel)))
  }

  fn send_stop(&self, route: Option<Route>) -> Result<(), EngineError> {
    send(
      self.protocol_tx,
      Protocol::Stop {
        clip: self.clip.id(),
        route,
      },
    )
  }
}

impl<'a> Deref for ClipRef<'a> {
  type Target = ClipShared;

  fn deref(&self) -> &ClipShared {
    self.clip
  }
}
