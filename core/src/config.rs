use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Audio {
  pub sample_rate: u32,
  pub frames: u32,
  pub max_frames: usize,
}

impl Default for Audio {
  fn default() -> Audio {
    Audio {
      sample_rate: 44100,
      frames: 512,
      max_frames: 4096,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Engine {
  pub max_clips: usize,
  pub control_queue: usize,
  pub release_queue: usize,
}

impl Default for Engine {
  fn default() -> Engine {
    Engine {
      max_clips: 128,
      control_queue: 1024,
      release_queue: 1024,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Timer {
  pub bpm: u16,
  pub start_quantum_ticks: u64,
  pub max_pending_events: usize,
}

impl Default for Timer {
  fn default() -> Timer {
    Timer {
      bpm: 120,
      start_quantum_ticks: 1,
      max_pending_events: 512,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Telemetry {
  pub interval_ms: u32,
  pub queue: usize,
}

impl Default for Telemetry {
  fn default() -> Telemetry {
    Telemetry {
      interval_ms: 16,
      queue: 4096,
    }
  }
}

impl Telemetry {
  pub fn interval_frames(&self, sample_rate: u32) -> u32 {
    (u64::from(sample_rate) * u64::from(self.interval_ms) / 1000).max(1) as u32
  }
}

#[derive(Deserialize, Debug, Clone)]
pub struct PoolWithItemCapacity {
  pub pool_capacity: usize,
  pub item_capacity: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Recorder {
  pub directory: String,
  pub bits_per_sample: u16,
  pub buffer_pool: PoolWithItemCapacity,
}

impl Default for Recorder {
  fn default() -> Recorder {
    Recorder {
      directory: "recordings".to_string(),
      bits_per_sample: 16,
      buffer_pool: PoolWithItemCapacity {
        pool_capacity: 64,
        item_capacity: 2 * 4096,
      },
    }
  }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
  pub audio: Audio,
  pub engine: Engine,
  pub timer: Timer,
  pub telemetry: Telemetry,
  pub recorder: Recorder,
}

impl Config {
  pub fn from_file<'a, T>(path: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let mut content = String::new();
    let path_str = path.into();
    let mut file = File::open(path_str)?;
    file.read_to_string(&mut content)?;
    Self::from_str(content.as_str())
  }

  pub fn from_str<'a, T>(content: T) -> Result<Config, Error>
  where
    T: Into<&'a str>,
  {
    let config: Config = toml::from_str(content.into())?;
    Ok(config)
  }
}

#[cfg(test)]
mod test {

  use super::Config;

  #[test]
  pub fn defaults_from_empty() {
    let config = Config::from_str("").unwrap();
    assert_eq!(config.audio.sample_rate, 44100);
    assert_eq!(config.timer.bpm, 120);
    assert_eq!(config.timer.start_quantum_ticks, 1);
    assert_eq!(config.recorder.bits_per_sample, 16);
  }

  #[test]
  pub fn partial_sections() {
    let config = Config::from_str(
      r#"
      [audio]
      sample_rate = 48000

      [timer]
      start_quantum_ticks = 384

      [recorder.buffer_pool]
      pool_capacity = 8
      item_capacity = 1024
      "#,
    )
    .unwrap();
    assert_eq!(config.audio.sample_rate, 48000);
    assert_eq!(config.audio.frames, 512);
    assert_eq!(config.timer.start_quantum_ticks, 384);
    assert_eq!(config.timer.bpm, 120);
    assert_eq!(config.recorder.buffer_pool.pool_capacity, 8);
    assert_eq!(config.recorder.directory, "recordings");
  }

  #[test]
  pub fn telemetry_interval_frames() {
    let config = Config::default();
    assert_eq!(config.telemetry.interval_frames(48000), 768);
  }

  #[test]
  pub fn invalid_content() {
    assert!(Config::from_str("[audio]\nsample_rate = \"fast\"").is_err());
  }
}
