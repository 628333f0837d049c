use std::sync::Arc;

use crate::audio::gain::pan_gains;
use crate::audio::StereoBuffer;
use crate::mixer::PassthroughChannel;

/// Audio thread side of the mixer: per channel inputs in, dry and send buses out.
pub struct MixerProcessor {
  channels: Arc<Vec<PassthroughChannel>>,
  inputs: Vec<StereoBuffer>,
  outputs: Vec<StereoBuffer>,
  dry: StereoBuffer,
  fx1: StereoBuffer,
  fx2: StereoBuffer,
}

impl MixerProcessor {
  pub fn new(channels: Arc<Vec<PassthroughChannel>>, max_frames: usize) -> MixerProcessor {
    let count = channels.len();
    MixerProcessor {
      channels,
      inputs: (0..count).map(|_| StereoBuffer::new(max_frames)).collect(),
      outputs: (0..count).map(|_| StereoBuffer::new(max_frames)).collect(),
      dry: StereoBuffer::new(max_frames),
      fx1: StereoBuffer::new(max_frames),
      fx2: StereoBuffer::new(max_frames),
    }
  }

  pub fn clear_inputs(&mut self, frames: usize) {
    for input in self.inputs.iter_mut() {
      input.clear(frames);
    }
  }

  pub fn input_mut(&mut self, channel: usize) -> Option<&mut StereoBuffer> {
    self.inputs.get_mut(channel)
  }

  /// Post fader dry signal of a channel.
  pub fn channel_output(&self, channel: usize) -> Option<&StereoBuffer> {
    self.outputs.get(channel)
  }

  pub fn channel_outputs(&self) -> &[StereoBuffer] {
    &self.outputs
  }

  pub fn dry(&self) -> &StereoBuffer {
    &self.dry
  }

  pub fn fx1(&self) -> &StereoBuffer {
    &self.fx1
  }

  pub fn fx2(&self) -> &StereoBuffer {
    &self.fx2
  }

  pub fn process(&mut self, frames: usize) {
    self.dry.clear(frames);
    self.fx1.clear(frames);
    self.fx2.clear(frames);

    for (index, strip) in self.channels.iter().enumerate() {
      let amounts = strip.amounts();
      let input = &self.inputs[index];
      let output = &mut self.outputs[index];

      let (left, right) = pan_gains(amounts.dry, amounts.pan);
      output.clear(frames);
      output.mix_from(input, frames, left, right);
      self.dry.mix_from(output, frames, 1.0, 1.0);

      let (left, right) = pan_gains(amounts.wet_fx1, amounts.pan);
      self.fx1.mix_from(input, frames, left, right);

      let (left, right) = pan_gains(amounts.wet_fx2, amounts.pan);
      self.fx2.mix_from(input, frames, left, right);
    }
  }
}
