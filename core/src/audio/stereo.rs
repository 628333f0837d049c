/// Planar stereo bus with a fixed capacity allocated up front.
pub struct StereoBuffer {
  pub left: Vec<f32>,
  pub right: Vec<f32>,
}

impl StereoBuffer {
  pub fn new(capacity: usize) -> StereoBuffer {
    StereoBuffer {
      left: vec![0.0; capacity],
      right: vec![0.0; capacity],
    }
  }

  pub fn capacity(&self) -> usize {
    self.left.len()
  }

  pub fn clear(&mut self, frames: usize) {
    self.left[..frames].iter_mut().for_each(|s| *s = 0.0);
    self.right[..frames].iter_mut().for_each(|s| *s = 0.0);
  }

  pub fn mix_from(&mut self, other: &StereoBuffer, frames: usize, gain_left: f32, gain_right: f32) {
    if gain_left != 0.0 {
      for (dst, src) in self.left[..frames].iter_mut().zip(&other.left[..frames]) {
        *dst += src * gain_left;
      }
    }
    if gain_right != 0.0 {
      for (dst, src) in self.right[..frames].iter_mut().zip(&other.right[..frames]) {
        *dst += src * gain_right;
      }
    }
  }

  pub fn peaks(&self, frames: usize) -> (f32, f32) {
    (peak(&self.left[..frames]), peak(&self.right[..frames]))
  }

  pub fn write_interleaved(&self, output: &mut [f32], frames: usize) {
    for (i, frame) in output.chunks_exact_mut(2).take(frames).enumerate() {
      frame[0] = self.left[i];
      frame[1] = self.right[i];
    }
  }
}

pub fn peak(samples: &[f32]) -> f32 {
  samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

#[cfg(test)]
mod test {

  use super::StereoBuffer;

  #[test]
  pub fn mix_and_peaks() {
    let mut source = StereoBuffer::new(4);
    source.left.copy_from_slice(&[0.5, -1.0, 0.25, 0.0]);
    source.right.copy_from_slice(&[0.1, 0.2, -0.3, 0.0]);

    let mut bus = StereoBuffer::new(4);
    bus.mix_from(&source, 3, 0.5, 2.0);
    assert_eq!(bus.left, vec![0.25, -0.5, 0.125, 0.0]);
    assert_eq!(bus.peaks(3), (0.5, 0.6));
  }

  #[test]
  pub fn clear_and_interleave() {
    let mut bus = StereoBuffer::new(3);
    bus.left.copy_from_slice(&[1.0, 2.0, 3.0]);
    bus.right.copy_from_slice(&[4.0, 5.0, 6.0]);
    bus.clear(1);

    let mut output = vec![9.0; 6];
    bus.write_interleaved(&mut output, 3);
    assert_eq!(output, vec![0.0, 0.0, 2.0, 5.0, 3.0, 6.0]);
  }
}
