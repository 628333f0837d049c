use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
  /// Queued behind other transactions.
  WaitingToStart,
  Running,
  /// The expected end was seen, the output is final.
  Completed,
  /// The process went away before completion.
  Abandoned,
}

impl TransactionState {
  fn is_final(self) -> bool {
    self == TransactionState::Completed || self == TransactionState::Abandoned
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
  Output,
  Error,
}

struct Data {
  state: TransactionState,
  output: Vec<u8>,
  error: Vec<u8>,
}

struct Inner {
  id: u64,
  command: String,
  expected_end: String,
  data: Mutex<Data>,
  changed: Condvar,
}

/// One command sent to a supervised process and the output it produced.
///
/// Cloning gives another handle on the same transaction.
#[derive(Clone)]
pub struct Transaction {
  inner: Arc<Inner>,
}

impl Transaction {
  pub(crate) fn new(id: u64, command: &str, expected_end: &str) -> Transaction {
    Transaction {
      inner: Arc::new(Inner {
        id,
        command: command.to_string(),
        expected_end: expected_end.to_string(),
        data: Mutex::new(Data {
          state: TransactionState::WaitingToStart,
          output: Vec::new(),
          error: Vec::new(),
        }),
        changed: Condvar::new(),
      }),
    }
  }

  /// Sequential, so ids can be compared to know which transaction was sent first.
  pub fn id(&self) -> u64 {
    self.inner.id
  }

  pub fn command(&self) -> &str {
    &self.inner.command
  }

  pub fn expected_end(&self) -> &str {
    &self.inner.expected_end
  }

  pub fn state(&self) -> TransactionState {
    self.lock().state
  }

  pub fn standard_output(&self) -> String {
    String::from_utf8_lossy(&self.lock().output).into_owned()
  }

  pub fn standard_error(&self) -> String {
    String::from_utf8_lossy(&self.lock().error).into_owned()
  }

  /// Blocks until `state` is reached. False on timeout or when a final state other than `state` was reached.
  pub fn wait_for_state(&self, state: TransactionState, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    let mut data = self.lock();
    loop {
      if data.state == state {
        return true;
      }
      if data.state.is_final() {
        return false;
      }
      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      data = match self.inner.changed.wait_timeout(data, deadline - now) {
        Ok((data, _)) => data,
        Err(poisoned) => poisoned.into_inner().0,
      };
    }
  }

  pub(crate) fn set_state(&self, state: TransactionState) {
    let mut data = self.lock();
    if data.state != state {
      data.state = state;
      self.inner.changed.notify_all();
    }
  }

  /// Appends output and returns whether the expected end has been seen on that stream.
  pub(crate) fn append(&self, stream: Stream, bytes: &[u8]) -> bool {
    let mut data = self.lock();
    let buffer = match stream {
      Stream::Output => &mut data.output,
      Stream::Error => &mut data.error,
    };
    buffer.extend_from_slice(bytes);
    find(buffer, self.inner.expected_end.as_bytes()).is_some()
  }

  /// Cuts the stream at the expected end, marks the transaction completed and returns what came after it.
  pub(crate) fn complete(&self, stream: Stream) -> Vec<u8> {
    let mut data = self.lock();
    let expected_end = self.inner.expected_end.as_bytes();
    let buffer = match stream {
      Stream::Output => &mut data.output,
      Stream::Error => &mut data.error,
    };
    let leftovers = match find(buffer, expected_end) {
      Some(position) => {
        let leftovers = buffer[position + expected_end.len()..].to_vec();
        buffer.truncate(position);
        leftovers
      }
      None => Vec::new(),
    };
    data.state = TransactionState::Completed;
    self.inner.changed.notify_all();
    leftovers
  }

  fn lock(&self) -> MutexGuard<Data> {
    match self.inner.data.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    }
  }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  if needle.is_empty() {
    return None;
  }
  haystack
    .windows(needle.len())
    .position(|window| window == needle)
}
