pub mod processor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use atomic_float::AtomicF32;

use crate::engine::EngineError;

pub use self::processor::MixerProcessor;

pub const CHANNEL_COUNT: usize = 10;

const UNUSED_MIX: f32 = -1.0;

/// Dry and wet send amounts after applying the dry/wet mix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Amounts {
  pub dry: f32,
  pub wet_fx1: f32,
  pub wet_fx2: f32,
  pub pan: f32,
}

/// One passthrough strip. Every field is read once per buffer by the audio thread.
pub struct PassthroughChannel {
  pan: AtomicF32,
  dry: AtomicF32,
  wet_fx1: AtomicF32,
  wet_fx2: AtomicF32,
  dry_wet_mix: AtomicF32,
  muted: AtomicBool,
}

impl Default for PassthroughChannel {
  fn default() -> PassthroughChannel {
    PassthroughChannel {
      pan: AtomicF32::new(0.0),
      dry: AtomicF32::new(1.0),
      wet_fx1: AtomicF32::new(1.0),
      wet_fx2: AtomicF32::new(1.0),
      dry_wet_mix: AtomicF32::new(UNUSED_MIX),
      muted: AtomicBool::new(false),
    }
  }
}

impl PassthroughChannel {
  /// Amounts as the audio thread applies them, all zero when muted.
  pub fn amounts(&self) -> Amounts {
    let pan = self.pan.load(Ordering::Relaxed);
    if self.muted.load(Ordering::Relaxed) {
      return Amounts {
        dry: 0.0,
        wet_fx1: 0.0,
        wet_fx2: 0.0,
        pan,
      };
    }

    let mix = self.dry_wet_mix.load(Ordering::Relaxed);
    let (dry, wet_fx1, wet_fx2) = if mix < 0.0 {
      (
        self.dry.load(Ordering::Relaxed),
        self.wet_fx1.load(Ordering::Relaxed),
        self.wet_fx2.load(Ordering::Relaxed),
      )
    } else if mix <= 1.0 {
      (1.0, mix, mix)
    } else {
      (2.0 - mix, 1.0, 1.0)
    };

    Amounts {
      dry,
      wet_fx1,
      wet_fx2,
      pan,
    }
  }
}

/// Control handle over the mixer strips, last writer wins.
#[derive(Clone)]
pub struct Mixer {
  channels: Arc<Vec<PassthroughChannel>>,
}

impl Mixer {
  pub fn new() -> Mixer {
    let channels = (0..CHANNEL_COUNT)
      .map(|_| PassthroughChannel::default())
      .collect();
    Mixer {
      channels: Arc::new(channels),
    }
  }

  pub fn channel_count(&self) -> usize {
    self.channels.len()
  }

  pub(crate) fn channels(&self) -> Arc<Vec<PassthroughChannel>> {
    self.channels.clone()
  }

  fn channel(&self, channel: usize) -> Result<&PassthroughChannel, EngineError> {
    self
      .channels
      .get(channel)
      .ok_or(EngineError::InvalidChannel { channel })
  }

  pub fn amounts(&self, channel: usize) -> Result<Amounts, EngineError> {
    Ok(self.channel(channel)?.amounts())
  }

  pub fn pan_amount(&self, channel: usize) -> Result<f32, EngineError> {
    Ok(self.channel(channel)?.pan.load(Ordering::Relaxed))
  }

  pub fn set_pan_amount(&self, channel: usize, amount: f32) -> Result<(), EngineError> {
    let value = amount.max(-1.0).min(1.0);
    self.channel(channel)?.pan.store(value, Ordering::Relaxed);
    Ok(())
  }

  pub fn dry_amount(&self, channel: usize) -> Result<f32, EngineError> {
    Ok(self.channel(channel)?.dry.load(Ordering::Relaxed))
  }

  pub fn set_dry_amount(&self, channel: usize, amount: f32) -> Result<(), EngineError> {
    let strip = self.channel(channel)?;
    strip.dry.store(clamp_amount(amount), Ordering::Relaxed);
    strip.dry_wet_mix.store(UNUSED_MIX, Ordering::Relaxed);
    Ok(())
  }

  pub fn wet_fx1_amount(&self, channel: usize) -> Result<f32, EngineError> {
    Ok(self.channel(channel)?.wet_fx1.load(Ordering::Relaxed))
  }

  pub fn set_wet_fx1_amount(&self, channel: usize, amount: f32) -> Result<(), EngineError> {
    let strip = self.channel(channel)?;
    strip.wet_fx1.store(clamp_amount(amount), Ordering::Relaxed);
    strip.dry_wet_mix.store(UNUSED_MIX, Ordering::Relaxed);
    Ok(())
  }

  pub fn wet_fx2_amount(&self, channel: usize) -> Result<f32, EngineError> {
    Ok(self.channel(channel)?.wet_fx2.load(Ordering::Relaxed))
  }

  pub fn set_wet_fx2_amount(&self, channel: usize, amount: f32) -> Result<(), EngineError> {
    let strip = self.channel(channel)?;
    strip.wet_fx2.store(clamp_amount(amount), Ordering::Relaxed);
    strip.dry_wet_mix.store(UNUSED_MIX, Ordering::Relaxed);
    Ok(())
  }

  /// -1 when the dry and wet amounts are used as set.
  pub fn dry_wet_mix_amount(&self, channel: usize) -> Result<f32, EngineError> {
    Ok(self.channel(channel)?.dry_wet_mix.load(Ordering::Relaxed))
  }

  /// `0..1` fades the sends in with a full dry signal, `1..2` fades the dry signal out.
  pub fn set_dry_wet_mix_amount(&self, channel: usize, amount: f32) -> Result<(), EngineError> {
    let value = if amount < 0.0 {
      UNUSED_MIX
    } else {
      amount.min(2.0)
    };
    self
      .channel(channel)?
      .dry_wet_mix
      .store(value, Ordering::Relaxed);
    Ok(())
  }

  pub fn muted(&self, channel: usize) -> Result<bool, EngineError> {
    Ok(self.channel(channel)?.muted.load(Ordering::Relaxed))
  }

  pub fn set_muted(&self, channel: usize, muted: bool) -> Result<(), EngineError> {
    self.channel(channel)?.muted.store(muted, Ordering::Relaxed);
    Ok(())
  }
}

impl Default for Mixer {
  fn default() -> Mixer {
    Mixer::new()
  }
}

fn clamp_amount(amount: f32) -> f32 {
  amount.max(0.0).min(1.0)
}

#[cfg(test)]
mod test {

  use super::{Amounts, Mixer, CHANNEL_COUNT};
  use crate::engine::EngineError;

  #[test]
  pub fn defaults() {
    let mixer = Mixer::new();
    assert_eq!(mixer.channel_count(), CHANNEL_COUNT);
    assert_eq!(mixer.dry_amount(0).unwrap(), 1.0);
    assert_eq!(mixer.wet_fx1_amount(0).unwrap(), 1.0);
    assert_eq!(mixer.wet_fx2_amount(0).unwrap(), 1.0);
    assert_eq!(mixer.pan_amount(0).unwrap(), 0.0);
    assert_eq!(mixer.dry_wet_mix_amount(0).unwrap(), -1.0);
    assert!(!mixer.muted(0).unwrap());
  }

  #[test]
  pub fn invalid_channel() {
    let mixer = Mixer::new();
    match mixer.set_pan_amount(CHANNEL_COUNT, 0.5) {
      Err(EngineError::InvalidChannel { channel }) => assert_eq!(channel, CHANNEL_COUNT),
      _ => panic!("expected an invalid channel"),
    }
    assert!(mixer.muted(42).is_err());
  }

  #[test]
  pub fn values_are_clamped() {
    let mixer = Mixer::new();
    mixer.set_pan_amount(1, -4.0).unwrap();
    mixer.set_dry_amount(1, 3.0).unwrap();
    mixer.set_wet_fx1_amount(1, -1.0).unwrap();
    assert_eq!(mixer.pan_amount(1).unwrap(), -1.0);
    assert_eq!(mixer.dry_amount(1).unwrap(), 1.0);
    assert_eq!(mixer.wet_fx1_amount(1).unwrap(), 0.0);
  }

  #[test]
  pub fn dry_wet_mix() {
    let mixer = Mixer::new();
    mixer.set_dry_amount(2, 0.3).unwrap();
    mixer.set_dry_wet_mix_amount(2, 0.25).unwrap();
    assert_eq!(
      mixer.amounts(2).unwrap(),
      Amounts {
        dry: 1.0,
        wet_fx1: 0.25,
        wet_fx2: 0.25,
        pan: 0.0
      }
    );
    mixer.set_dry_wet_mix_amount(2, 1.5).unwrap();
    let amounts = mixer.amounts(2).unwrap();
    assert_eq!((amounts.dry, amounts.wet_fx1), (0.5, 1.0));

    mixer.set_wet_fx2_amount(2, 0.5).unwrap();
    assert_eq!(mixer.dry_wet_mix_amount(2).unwrap(), -1.0);
    let amounts = mixer.amounts(2).unwrap();
    assert_eq!((amounts.dry, amounts.wet_fx2), (0.3, 0.5));
  }

  #[test]
  pub fn muted_channel_has_no_output() {
    let mixer = Mixer::new();
    mixer.set_muted(3, true).unwrap();
    let amounts = mixer.amounts(3).unwrap();
    assert_eq!((amounts.dry, amounts.wet_fx1, amounts.wet_fx2), (0.0, 0.0, 0.0));
  }
}
