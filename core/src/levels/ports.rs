use std::fmt;
use std::str::FromStr;

use crate::engine::EngineError;
use crate::mixer::CHANNEL_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSource {
  Master,
  Fx1,
  Fx2,
  Channel(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
  Left,
  Right,
}

/// An engine output that can be recorded, written as `source:side`, e.g. `channel3:left`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortName {
  pub source: PortSource,
  pub side: Side,
}

impl FromStr for PortName {
  type Err = EngineError;

  fn from_str(name: &str) -> Result<PortName, EngineError> {
    let unknown = || EngineError::UnknownPort {
      name: name.to_string(),
    };

    let mut parts = name.splitn(2, ':');
    let source = parts.next().unwrap_or("");
    let side = parts.next().ok_or_else(unknown)?;

    let source = match source {
      "master" => PortSource::Master,
      "fx1" => PortSource::Fx1,
      "fx2" => PortSource::Fx2,
      other if other.starts_with("channel") => {
        let channel = other["channel".len()..]
          .parse::<usize>()
          .map_err(|_| unknown())?;
        if channel >= CHANNEL_COUNT {
          return Err(unknown());
        }
        PortSource::Channel(channel)
      }
      _ => return Err(unknown()),
    };

    let side = match side {
      "left" => Side::Left,
      "right" => Side::Right,
      _ => return Err(unknown()),
    };

    Ok(PortName { source, side })
  }
}

impl fmt::Display for PortName {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self.source {
      PortSource::Master => write!(f, "master")?,
      PortSource::Fx1 => write!(f, "fx1")?,
      PortSource::Fx2 => write!(f, "fx2")?,
      PortSource::Channel(channel) => write!(f, "channel{}", channel)?,
    };
    match self.side {
      Side::Left => write!(f, ":left"),
      Side::Right => write!(f, ":right"),
    }
  }
}

/// A port and the channel of the recording file it goes to (0 is left, 1 is right).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPort {
  pub port: PortName,
  pub channel: usize,
}

impl RecordPort {
  pub fn new(name: &str, channel: usize) -> Result<RecordPort, EngineError> {
    if channel > 1 {
      return Err(EngineError::InvalidChannel { channel });
    }
    Ok(RecordPort {
      port: name.parse()?,
      channel,
    })
  }
}

#[cfg(test)]
mod test {

  use super::{PortName, PortSource, RecordPort, Side};
  use crate::engine::EngineError;

  #[test]
  pub fn parse_names() {
    let port: PortName = "channel7:right".parse().unwrap();
    assert_eq!(port.source, PortSource::Channel(7));
    assert_eq!(port.side, Side::Right);
    assert_eq!(port.to_string(), "channel7:right");
    let port: PortName = "fx2:left".parse().unwrap();
    assert_eq!(port.source, PortSource::Fx2);
    assert_eq!("master:left".parse::<PortName>().unwrap().to_string(), "master:left");
  }

  #[test]
  pub fn unknown_names() {
    for name in &["", "master", "master:center", "channel10:left", "channelx:left", "bus:left"] {
      match name.parse::<PortName>() {
        Err(EngineError::UnknownPort { name: unknown }) => assert_eq!(&unknown, name),
        _ => panic!("{} should not parse", name),
      }
    }
  }

  #[test]
  pub fn record_port_channels() {
    assert!(RecordPort::new("master:left", 1).is_ok());
    match RecordPort::new("master:left", 2) {
      Err(EngineError::InvalidChannel { channel }) => assert_eq!(channel, 2),
      _ => panic!("file channel 2 should be rejected"),
    }
  }
}
