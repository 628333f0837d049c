pub mod meter;
pub mod ports;
pub mod recorder;
pub mod writer;

use std::sync::Arc;

use crossbeam_channel::Sender;
use log::{debug, info, warn};

use crate::audio::gain;
use crate::audio::CHANNELS;
use crate::config::{self, Config};
use crate::engine::protocol::{send, Protocol};
use crate::engine::EngineError;
use crate::mixer::CHANNEL_COUNT;

use self::meter::{LevelMeter, Meters};
use self::ports::RecordPort;
use self::recorder::{CaptureSession, CaptureTap, TapSource};
use self::writer::DiskWriter;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3f";

struct ChannelRecording {
  enabled: bool,
  prefix: String,
}

struct Recording {
  id: u64,
  filenames: Vec<String>,
  ports: Vec<RecordPort>,
  writers: Vec<DiskWriter>,
}

/// Control side of metering and recording.
///
/// A recording session is built here, handed to the audio thread on start and
/// comes back through the release channel after a stop, when its files get finalised.
pub struct AudioLevels {
  protocol_tx: Sender<Protocol>,
  meters: Arc<Meters>,
  sample_rate: u32,
  block_frames: usize,
  settings: config::Recorder,

  record_global: bool,
  global_prefix: String,
  record_ports: bool,
  ports: Vec<RecordPort>,
  ports_prefix: String,
  channels: Vec<ChannelRecording>,

  next_session: u64,
  filenames: Vec<String>,
  active: Option<Recording>,
  finishing: Vec<Recording>,
}

impl AudioLevels {
  pub fn new(protocol_tx: Sender<Protocol>, meters: Arc<Meters>, config: &Config) -> AudioLevels {
    let settings = config.recorder.clone();
    let directory = settings.directory.trim_end_matches('/').to_string();
    let block_frames = (settings.buffer_pool.item_capacity / CHANNELS).max(config.audio.max_frames);

    AudioLevels {
      protocol_tx,
      meters,
      sample_rate: config.audio.sample_rate,
      block_frames,
      record_global: false,
      global_prefix: format!("{}/global", directory),
      record_ports: false,
      ports: Vec::new(),
      ports_prefix: format!("{}/ports", directory),
      channels: (0..CHANNEL_COUNT)
        .map(|channel| ChannelRecording {
          enabled: false,
          prefix: format!("{}/channel{}", directory, channel),
        })
        .collect(),
      settings,
      next_session: 0,
      filenames: Vec::new(),
      active: None,
      finishing: Vec::new(),
    }
  }

  pub fn master_peak_db(&self) -> (f32, f32) {
    self.meters.master.peak_db()
  }

  pub fn master_hold_db(&self) -> (f32, f32) {
    self.meters.master.hold_db()
  }

  /// Both sides of the master peak added up as power.
  pub fn master_level_db(&self) -> f32 {
    let (left, right) = self.master_peak_db();
    gain::add_db(left, right)
  }

  pub fn channel_peak_db(&self, channel: usize) -> Result<(f32, f32), EngineError> {
    self.channel_meter(channel).map(LevelMeter::peak_db)
  }

  pub fn channel_hold_db(&self, channel: usize) -> Result<(f32, f32), EngineError> {
    self.channel_meter(channel).map(LevelMeter::hold_db)
  }

  fn channel_meter(&self, channel: usize) -> Result<&LevelMeter, EngineError> {
    self
      .meters
      .channels
      .get(channel)
      .ok_or(EngineError::InvalidChannel { channel })
  }

  pub fn set_record_global_playback(&mut self, enabled: bool) {
    self.record_global = enabled;
  }

  pub fn record_global_playback(&self) -> bool {
    self.record_global
  }

  pub fn set_global_playback_filename_prefix(&mut self, prefix: &str) {
    self.global_prefix = prefix.to_string();
  }

  /// Adds a port to the next recording, adding it twice has no effect.
  pub fn add_record_port(&mut self, name: &str, channel: usize) -> Result<(), EngineError> {
    let port = RecordPort::new(name, channel)?;
    if !self.ports.contains(&port) {
      debug!("Recording port {} into file channel {}", port.port, channel);
      self.ports.push(port);
    }
    Ok(())
  }

  pub fn remove_record_port(&mut self, name: &str, channel: usize) -> Result<(), EngineError> {
    let port = RecordPort::new(name, channel)?;
    self.ports.retain(|p| *p != port);
    Ok(())
  }

  pub fn clear_record_ports(&mut self) {
    self.ports.clear();
  }

  pub fn record_ports(&self) -> &[RecordPort] {
    &self.ports
  }

  pub fn set_should_record_ports(&mut self, enabled: bool) {
    self.record_ports = enabled;
  }

  pub fn set_ports_filename_prefix(&mut self, prefix: &str) {
    self.ports_prefix = prefix.to_string();
  }

  pub fn set_channel_to_record(&mut self, channel: usize, enabled: bool) -> Result<(), EngineError> {
    self.channel_recording(channel)?.enabled = enabled;
    Ok(())
  }

  pub fn set_channel_filename_prefix(&mut self, channel: usize, prefix: &str) -> Result<(), EngineError> {
    self.channel_recording(channel)?.prefix = prefix.to_string();
    Ok(())
  }

  fn channel_recording(&mut self, channel: usize) -> Result<&mut ChannelRecording, EngineError> {
    self
      .channels
      .get_mut(channel)
      .ok_or(EngineError::InvalidChannel { channel })
  }

  pub fn is_recording(&self) -> bool {
    self.active.is_some()
  }

  /// Files of the current recording, or of the last one: global, ports, then channels.
  pub fn recording_filenames(&self) -> &[String] {
    &self.filenames
  }

  /// Stopped recordings whose files are not finalised yet.
  pub fn is_finishing(&self) -> bool {
    !self.finishing.is_empty()
  }

  /// Ports being recorded right now, as they were when the recording started.
  pub fn active_ports(&self) -> &[RecordPort] {
    self
      .active
      .as_ref()
      .map(|recording| recording.ports.as_slice())
      .unwrap_or(&[])
  }

  pub fn start_recording(&mut self) -> Result<(), EngineError> {
    if self.active.is_some() {
      debug!("Already recording");
      return Ok(());
    }

    let mut targets = Vec::new();
    if self.record_global {
      targets.push((TapSource::Master, filename(&self.global_prefix)));
    }
    if self.record_ports && !self.ports.is_empty() {
      targets.push((TapSource::Ports(self.ports.clone()), filename(&self.ports_prefix)));
    }
    for (channel, recording) in self.channels.iter().enumerate() {
      if recording.enabled {
        targets.push((TapSource::Channel(channel), filename(&recording.prefix)));
      }
    }

    if targets.is_empty() {
      return Err(EngineError::Recording {
        cause: "nothing is configured to be recorded".to_string(),
      });
    }

    let pool_capacity = self.settings.buffer_pool.pool_capacity.max(1);
    let mut taps = Vec::with_capacity(targets.len());
    let mut writers = Vec::with_capacity(targets.len());
    let mut filenames = Vec::with_capacity(targets.len());

    for (source, filename) in targets.into_iter() {
      let (blocks_tx, blocks_rx) = crossbeam_channel::bounded(pool_capacity);
      let (release_tx, release_rx) = crossbeam_channel::bounded(pool_capacity);
      let writer = DiskWriter::start(
        &filename,
        self.sample_rate,
        self.settings.bits_per_sample,
        blocks_rx,
        release_tx,
      );
      match writer {
        Ok(writer) => writers.push(writer),
        Err(err) => {
          drop(taps);
          join_writers(writers);
          return Err(err);
        }
      }
      taps.push(CaptureTap::new(
        source,
        blocks_tx,
        release_rx,
        pool_capacity,
        self.block_frames,
      ));
      filenames.push(filename);
    }

    self.next_session += 1;
    let id = self.next_session;
    let session = CaptureSession::new(id, taps);
    if let Err(err) = send(&self.protocol_tx, Protocol::StartCapture(Box::new(session))) {
      join_writers(writers);
      return Err(err);
    }

    info!("Recording into {}", filenames.join(", "));
    self.filenames = filenames.clone();
    self.active = Some(Recording {
      id,
      filenames,
      ports: if self.record_ports {
        self.ports.clone()
      } else {
        Vec::new()
      },
      writers,
    });
    Ok(())
  }

  /// Stops recording, the files are finalised once the audio thread hands the session back.
  pub fn stop_recording(&mut self) -> Result<(), EngineError> {
    if self.active.is_none() {
      return Ok(());
    }
    send(&self.protocol_tx, Protocol::StopCapture)?;
    if let Some(recording) = self.active.take() {
      debug!("Stopping the recording {}", recording.id);
      self.finishing.push(recording);
    }
    Ok(())
  }

  /// Takes a session given back by the audio thread and finalises its files.
  pub(crate) fn finalize(&mut self, session: Box<CaptureSession>) {
    let id = session.id();
    let dropped = session.dropped();
    drop(session);

    if dropped > 0 {
      warn!("Recording {} lost {} blocks", id, dropped);
    }

    let position = self.finishing.iter().position(|recording| recording.id == id);
    let recording = match position {
      Some(position) => Some(self.finishing.remove(position)),
      None if self.active.as_ref().map(|r| r.id) == Some(id) => self.active.take(),
      None => None,
    };

    match recording {
      Some(recording) => {
        debug!("Finalising {}", recording.filenames.join(", "));
        join_writers(recording.writers);
      }
      None => warn!("Unknown recording session {}", id),
    }
  }
}

fn join_writers(writers: Vec<DiskWriter>) {
  for writer in writers.into_iter() {
    let name = writer.filename().to_string();
    match writer.join() {
      Ok(frames) => info!("Recorded {} frames into {}", frames, name),
      Err(err) => warn!("{}", err),
    }
  }
}

fn filename(prefix: &str) -> String {
  if prefix.ends_with(".wav") {
    prefix.to_string()
  } else {
    let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT);
    format!("{}-{}.wav", prefix, timestamp)
  }
}

#[cfg(test)]
mod test {

  use std::sync::Arc;

  use crossbeam_channel::Receiver;
  use hound::WavReader;
  use tempfile::TempDir;

  use super::meter::Meters;
  use super::recorder::Buses;
  use super::AudioLevels;
  use crate::audio::StereoBuffer;
  use crate::config::Config;
  use crate::engine::protocol::Protocol;
  use crate::engine::EngineError;

  fn new_levels() -> (AudioLevels, Receiver<Protocol>, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.audio.sample_rate = 1000;
    config.audio.max_frames = 4;
    config.recorder.directory = dir.path().to_str().unwrap().to_string();
    config.recorder.buffer_pool.pool_capacity = 4;
    config.recorder.buffer_pool.item_capacity = 8;
    let (tx, rx) = crossbeam_channel::bounded(8);
    let levels = AudioLevels::new(tx, Arc::new(Meters::new()), &config);
    (levels, rx, dir)
  }

  #[test]
  pub fn nothing_to_record() {
    let (mut levels, _rx, _dir) = new_levels();
    match levels.start_recording() {
      Err(EngineError::Recording { .. }) => {}
      _ => panic!("expected a recording error"),
    }
    assert!(!levels.is_recording());
  }

  #[test]
  pub fn ports_are_deduplicated_and_validated() {
    let (mut levels, _rx, _dir) = new_levels();
    levels.add_record_port("master:left", 0).unwrap();
    levels.add_record_port("master:left", 0).unwrap();
    levels.add_record_port("master:left", 1).unwrap();
    assert_eq!(levels.record_ports().len(), 2);
    assert!(levels.add_record_port("speakers:left", 0).is_err());
    levels.remove_record_port("master:left", 0).unwrap();
    assert_eq!(levels.record_ports().len(), 1);
    levels.clear_record_ports();
    assert!(levels.record_ports().is_empty());
    assert!(levels.set_channel_to_record(10, true).is_err());
  }

  #[test]
  pub fn ports_are_snapshotted_on_start() {
    let (mut levels, rx, dir) = new_levels();
    levels.add_record_port("channel0:left", 0).unwrap();
    levels.set_should_record_ports(true);
    levels.start_recording().unwrap();
    assert!(levels.is_recording());

    levels.add_record_port("channel1:left", 1).unwrap();
    assert_eq!(levels.active_ports().len(), 1);
    assert_eq!(levels.active_ports()[0].port.to_string(), "channel0:left");

    let filenames = levels.recording_filenames().to_vec();
    assert_eq!(filenames.len(), 1);
    assert!(filenames[0].starts_with(&format!("{}/ports-", dir.path().to_str().unwrap())));
    assert!(filenames[0].ends_with(".wav"));

    levels.stop_recording().unwrap();
    assert!(!levels.is_recording());
    assert!(levels.active_ports().is_empty());

    let session = match rx.try_recv() {
      Ok(Protocol::StartCapture(session)) => session,
      _ => panic!("expected a capture session"),
    };
    levels.finalize(session);
  }

  #[test]
  pub fn records_global_and_channels() {
    let (mut levels, rx, dir) = new_levels();
    let global = dir.path().join("master.wav");
    levels.set_record_global_playback(true);
    levels.set_global_playback_filename_prefix(global.to_str().unwrap());
    levels.set_channel_to_record(2, true).unwrap();
    levels.start_recording().unwrap();

    let filenames = levels.recording_filenames().to_vec();
    assert_eq!(filenames.len(), 2);
    assert_eq!(filenames[0], global.to_str().unwrap());
    assert!(filenames[1].contains("channel2-"));

    let mut session = match rx.try_recv() {
      Ok(Protocol::StartCapture(session)) => session,
      _ => panic!("expected a capture session"),
    };

    let mut master = StereoBuffer::new(4);
    master.left.iter_mut().for_each(|s| *s = 0.5);
    let silence = StereoBuffer::new(4);
    let channels: Vec<StereoBuffer> = (0..10).map(|_| StereoBuffer::new(4)).collect();
    let buses = Buses {
      master: &master,
      fx1: &silence,
      fx2: &silence,
      channels: &channels,
    };
    for _ in 0..3 {
      session.capture(&buses, 4);
    }

    levels.stop_recording().unwrap();
    match rx.try_recv() {
      Ok(Protocol::StopCapture) => {}
      _ => panic!("expected a stop message"),
    }
    levels.finalize(session);

    let mut reader = WavReader::open(&global).unwrap();
    assert_eq!(reader.duration(), 12);
    let first: Vec<i16> = reader.samples::<i16>().take(2).map(|s| s.unwrap()).collect();
    assert_eq!(first, vec![16383, 0]);
    assert_eq!(WavReader::open(&filenames[1]).unwrap().duration(), 12);
  }
}
