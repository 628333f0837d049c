use std::ops::{Deref, DerefMut};

use crate::pool::Pool;

pub type BufferData = Vec<f32>;

/// Interleaved samples with the number of valid frames.
pub struct Buffer {
  data: BufferData,
  frames: usize,
}

impl Buffer {
  pub fn with_capacity(capacity: usize) -> Buffer {
    Buffer {
      data: vec![0.0; capacity],
      frames: 0,
    }
  }

  pub fn frames(&self) -> usize {
    self.frames
  }

  pub fn set_frames(&mut self, frames: usize) {
    self.frames = frames;
  }

  pub fn slice(&self, size: usize) -> &[f32] {
    &self.data[0..size]
  }

  pub fn slice_mut(&mut self, size: usize) -> &mut [f32] {
    &mut self.data[0..size]
  }
}

impl Deref for Buffer {
  type Target = BufferData;
  fn deref(&self) -> &Self::Target {
    &self.data
  }
}

impl DerefMut for Buffer {
  fn deref_mut(&mut self) -> &mut BufferData {
    &mut self.data
  }
}

pub fn new_buffer_pool(pool_capacity: usize, buffer_capacity: usize) -> Pool<Buffer> {
  let allocator = Box::new(move || Box::new(Buffer::with_capacity(buffer_capacity)));
  let reset = Box::new(|item: &mut Buffer| item.set_frames(0));
  Pool::new(pool_capacity, allocator, reset)
}

#[cfg(test)]
mod test {

  use super::new_buffer_pool;

  #[test]
  pub fn pooled_buffers_are_reset() {
    let mut pool = new_buffer_pool(1, 8);
    let mut buffer = pool.get().unwrap();
    assert_eq!(buffer.len(), 8);
    buffer.slice_mut(2).copy_from_slice(&[0.5, -0.5]);
    buffer.set_frames(1);
    pool.release(buffer);
    let buffer = pool.get().unwrap();
    assert_eq!(buffer.frames(), 0);
  }
}
