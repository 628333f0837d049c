use failure;
use failure::Error;

use serde_derive::Deserialize;

use std::fs::File;
use std::io::Read;

use clipdeck_core::config::Config as EngineConfig;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
  #[serde(flatten)]
  pub engine: EngineConfig,
  pub driver: Driver,
  pub control: Control,
  pub clips: Vec<Preload>,
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

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Driver {
  /// Without the driver nothing is rendered, useful to script the control plane alone.
  pub enabled: bool,
  pub promote_realtime: bool,
}

impl Default for Driver {
  fn default() -> Driver {
    Driver {
      enabled: true,
      promote_realtime: true,
    }
  }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Control {
  pub prompt: String,
}

impl Default for Control {
  fn default() -> Control {
    Control {
      prompt: "\n> ".to_string(),
    }
  }
}

/// A clip loaded at startup.
#[derive(Deserialize, Debug, Clone)]
pub struct Preload {
  pub path: String,
  #[serde(default)]
  pub channel: Option<usize>,
  #[serde(default)]
  pub looping: bool,
  #[serde(default)]
  pub play: bool,
}

#[cfg(test)]
mod test {

  use super::Config;

  #[test]
  pub fn defaults_from_empty() {
    let config = Config::from_str("").unwrap();
    assert!(config.driver.enabled);
    assert_eq!(config.control.prompt, "\n> ");
    assert!(config.clips.is_empty());
    assert_eq!(config.engine.timer.bpm, 120);
  }

  #[test]
  pub fn engine_sections_at_the_top_level() {
    let config = Config::from_str(
      r#"
      [audio]
      sample_rate = 48000

      [driver]
      enabled = false

      [[clips]]
      path = "loops/drums.wav"
      channel = 2
      looping = true

      [[clips]]
      path = "one-shot.wav"
      "#,
    )
    .unwrap();
    assert_eq!(config.engine.audio.sample_rate, 48000);
    assert!(!config.driver.enabled);
    assert!(config.driver.promote_realtime);
    assert_eq!(config.clips.len(), 2);
    assert_eq!(config.clips[0].channel, Some(2));
    assert!(config.clips[0].looping);
    assert_eq!(config.clips[1].channel, None);
    assert!(!config.clips[1].play);
  }

  #[test]
  pub fn loads_from_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clipdeck.toml");
    std::fs::write(&path, "[control]\nprompt = \"$ \"\n").unwrap();
    let config = Config::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(config.control.prompt, "$ ");
    assert!(Config::from_file(dir.path().join("missing.toml").to_str().unwrap()).is_err());
  }
}
