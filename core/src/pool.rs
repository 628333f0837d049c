pub type Allocator<T> = dyn Fn() -> Box<T> + Send;
pub type Reset<T> = dyn Fn(&mut T) + Send;

/// Preallocated objects handed out on the audio thread and given back once consumed.
#[allow(clippy::vec_box)]
pub struct Pool<T> {
  reset: Box<Reset<T>>,
  items: Vec<Box<T>>,
}

impl<T> Pool<T> {
  pub fn new(capacity: usize, allocator: Box<Allocator<T>>, reset: Box<Reset<T>>) -> Pool<T> {
    let mut items = Vec::<Box<T>>::with_capacity(capacity);
    for _ in 0..capacity {
      items.push((allocator)());
    }

    Pool { reset, items }
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn get(&mut self) -> Option<Box<T>> {
    self.items.pop()
  }

  /// Items beyond the original capacity would make the audio thread reallocate, so they are dropped.
  pub fn release(&mut self, mut item: Box<T>) {
    if self.items.len() < self.items.capacity() {
      (self.reset)(&mut item);
      self.items.push(item);
    }
  }
}
