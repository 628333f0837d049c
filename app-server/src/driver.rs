use std::thread;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use failure::Fail;
use log::{debug, info, warn};

use clipdeck_core::audio::CHANNELS;
use clipdeck_core::config::Audio as AudioConfig;
use clipdeck_core::time::ClockTime;
use clipdeck_core::EngineProcessor;

use crate::realtime_thread::RealTimeAudioPriority;

#[derive(Debug, Fail)]
pub enum DriverError {
  #[fail(display = "Failed to create the audio driver thread: {}", cause)]
  Start { cause: String },

  #[fail(display = "Failed to join the audio driver thread")]
  Stop,
}

pub enum Protocol {
  Stop,
}

/// Renders the engine at the pace of a sound card, without one.
struct DriverThread {
  processor: EngineProcessor,
  frames: usize,
  period: Duration,
  output: Vec<f32>,
  _rta_priority: Option<RealTimeAudioPriority>,
}

impl DriverThread {
  fn new(processor: EngineProcessor, audio_config: &AudioConfig, promote_realtime: bool) -> DriverThread {
    let frames = audio_config.frames as usize;
    let period = ClockTime::from_samples(u64::from(audio_config.frames), audio_config.sample_rate);
    let period = Duration::from_nanos(period.to_nanos());

    let _rta_priority = if promote_realtime {
      Self::promote_to_real_time(audio_config)
    } else {
      None
    };

    DriverThread {
      processor,
      frames,
      period,
      output: vec![0.0; frames * CHANNELS],
      _rta_priority,
    }
  }

  fn run(&mut self, protocol_rx: Receiver<Protocol>) {
    let mut deadline = Instant::now();
    loop {
      match protocol_rx.recv_deadline(deadline) {
        Ok(Protocol::Stop) | Err(RecvTimeoutError::Disconnected) => break,
        Err(RecvTimeoutError::Timeout) => {}
      }

      self.processor.process(self.frames, &mut self.output);

      deadline += self.period;
      let now = Instant::now();
      if deadline < now {
        warn!("Audio driver overrun by {:?}", now - deadline);
        deadline = now;
      }
    }
  }

  fn promote_to_real_time(audio_config: &AudioConfig) -> Option<RealTimeAudioPriority> {
    match RealTimeAudioPriority::promote(audio_config.sample_rate, audio_config.frames) {
      Ok(rta_priority) => {
        debug!("The audio driver thread has now real-time priority");
        Some(rta_priority)
      }
      Err(err) => {
        warn!("Couldn't promote the audio driver thread into real time: {}", err);
        None
      }
    }
  }
}

pub struct Driver {
  handler: JoinHandle<()>,
  protocol_tx: Sender<Protocol>,
}

impl Driver {
  pub fn new(
    processor: EngineProcessor,
    audio_config: AudioConfig,
    promote_realtime: bool,
  ) -> Result<Driver, DriverError> {
    info!(
      "Starting the audio driver: {} frames at {} Hz ...",
      audio_config.frames, audio_config.sample_rate
    );

    let (protocol_tx, protocol_rx) = crossbeam_channel::bounded::<Protocol>(1);

    thread::Builder::new()
      .name("audio-driver".into())
      .spawn(move || DriverThread::new(processor, &audio_config, promote_realtime).run(protocol_rx))
      .map_err(|err| DriverError::Start {
        cause: err.to_string(),
      })
      .map(|handler| Driver {
        handler,
        protocol_tx,
      })
  }

  pub fn stop(self) -> Result<(), DriverError> {
    info!("Stopping the audio driver ...");

    self
      .protocol_tx
      .send(Protocol::Stop)
      .map_err(|_| DriverError::Stop)
      .and_then(|()| self.handler.join().map_err(|_| DriverError::Stop))
  }
}
