//! Supervision of a child process driven through a command prompt.
//!
//! Commands are written to the standard input one at a time; a command is over when the
//! prompt (or the end expected by its transaction) shows up in its output, at which point
//! the next queued command is written.

pub mod transaction;

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use failure::Fail;
use log::{debug, info, trace, warn};

pub use self::transaction::{Stream, Transaction, TransactionState};

pub const DEFAULT_COMMAND_PROMPT: &str = "\n> ";

const STARTUP_COMMAND: &str = "<initial startup>";
const READ_BUFFER_SIZE: usize = 4096;
pub const SUBSCRIBER_QUEUE: usize = 1024;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Fail)]
pub enum ProcessError {
  #[fail(display = "The process is already running")]
  AlreadyRunning,

  #[fail(display = "The process is not running")]
  NotRunning,

  #[fail(display = "Failed to start the process: {}", cause)]
  Spawn { cause: String },

  #[fail(display = "Failed to talk to the process: {}", cause)]
  Io { cause: String },

  #[fail(display = "Timed out waiting for the process")]
  Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
  NotRunning,
  Starting,
  Running,
  Stopping,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessEvent {
  StateChanged(ProcessState),
  StandardOutput(Vec<u8>),
  StandardError(Vec<u8>),
}

struct Shared {
  state: ProcessState,
  prompt: String,
  next_id: u64,
  startup: Option<Transaction>,
  current: Option<Transaction>,
  waiting: VecDeque<Transaction>,
  subscribers: Vec<Sender<ProcessEvent>>,
}

impl Shared {
  fn set_state(&mut self, state: ProcessState) {
    if self.state != state {
      debug!("Process state {:?} -> {:?}", self.state, state);
      self.state = state;
      self.notify(ProcessEvent::StateChanged(state));
    }
  }

  /// Subscribers that are full miss the event, the ones that are gone are forgotten.
  fn notify(&mut self, event: ProcessEvent) {
    self
      .subscribers
      .retain(|subscriber| match subscriber.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
          warn!("Dropped a process event, a subscriber is not keeping up");
          true
        }
        Err(TrySendError::Disconnected(_)) => false,
      });
  }

  fn create_transaction(&mut self, command: &str, expected_end: &str) -> (Transaction, Option<PendingWrite>) {
    let transaction = Transaction::new(self.next_id, command, expected_end);
    self.next_id += 1;
    let write = if self.current.is_none() {
      self.current = Some(transaction.clone());
      if self.state == ProcessState::Running {
        self.begin(&transaction)
      } else {
        None
      }
    } else {
      self.waiting.push_back(transaction.clone());
      None
    };
    (transaction, write)
  }

  /// Marks the transaction as running, the command line is written by the caller once unlocked.
  fn begin(&mut self, transaction: &Transaction) -> Option<PendingWrite> {
    transaction.set_state(TransactionState::Running);
    if transaction.command() == STARTUP_COMMAND {
      return None;
    }
    let mut line = transaction.command().to_string();
    if !line.ends_with('\n') {
      line.push('\n');
    }
    Some(PendingWrite {
      transaction: transaction.clone(),
      line,
    })
  }

  /// Moves on from a transaction whose command could not be written.
  fn abandoned(&mut self, transaction: &Transaction) -> Option<PendingWrite> {
    let is_current = self
      .current
      .as_ref()
      .map(|current| current.id() == transaction.id())
      .unwrap_or(false);
    if !is_current {
      return None;
    }
    self.current = self.waiting.pop_front();
    match self.current.clone() {
      Some(next) => self.begin(&next),
      None => None,
    }
  }

  fn received(&mut self, stream: Stream, bytes: &[u8]) -> Option<PendingWrite> {
    self.notify(match stream {
      Stream::Output => ProcessEvent::StandardOutput(bytes.to_vec()),
      Stream::Error => ProcessEvent::StandardError(bytes.to_vec()),
    });

    let transaction = match self.current.as_ref() {
      Some(transaction) => transaction.clone(),
      None => return None,
    };
    if !transaction.append(stream, bytes) {
      return None;
    }

    let leftovers = transaction.complete(stream);
    if !leftovers.is_empty() {
      warn!(
        "Unexpected output after {:?}: {}",
        transaction.command(),
        String::from_utf8_lossy(&leftovers)
      );
    }

    let was_startup = self
      .startup
      .as_ref()
      .map(|startup| startup.id() == transaction.id())
      .unwrap_or(false);
    if was_startup {
      self.startup = None;
      self.set_state(ProcessState::Running);
    }

    self.current = self.waiting.pop_front();
    match self.current.clone() {
      Some(next) => self.begin(&next),
      None => None,
    }
  }

  fn abandon_all(&mut self) {
    let pending = self.current.take().into_iter().chain(self.waiting.drain(..));
    for transaction in pending {
      transaction.set_state(TransactionState::Abandoned);
    }
    self.startup = None;
  }

  fn closed(&mut self) {
    self.abandon_all();
    self.set_state(ProcessState::NotRunning);
  }
}

/// A command line to be written to the standard input.
struct PendingWrite {
  transaction: Transaction,
  line: String,
}

impl PendingWrite {
  /// On failure the transaction is abandoned.
  fn write(&self, stdin: &mut Option<ChildStdin>) -> bool {
    trace!("Sending {:?}", self.transaction.command());
    let written = match stdin.as_mut() {
      Some(stdin) => stdin
        .write_all(self.line.as_bytes())
        .and_then(|_| stdin.flush()),
      None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "the standard input is closed")),
    };
    match written {
      Ok(()) => true,
      Err(err) => {
        warn!("Failed to send {:?}: {}", self.transaction.command(), err);
        self.transaction.set_state(TransactionState::Abandoned);
        false
      }
    }
  }
}

type SharedStdin = Arc<Mutex<Option<ChildStdin>>>;

/// Writes `pending` once `guard` is released.
///
/// The standard input is locked before the shared state is released, so commands are written
/// in the order they began. Failed writes move on to the next waiting command.
fn write_pending<'a>(
  shared: &'a Mutex<Shared>,
  stdin: &Mutex<Option<ChildStdin>>,
  mut guard: MutexGuard<'a, Shared>,
  mut pending: Option<PendingWrite>,
) {
  while let Some(write) = pending.take() {
    let mut input = lock(stdin);
    drop(guard);
    if write.write(&mut input) {
      return;
    }
    drop(input);
    guard = lock(shared);
    pending = guard.abandoned(&write.transaction);
  }
}

/// Starts, stops and talks to an external process with a prompt based command line.
pub struct ProcessWrapper {
  shared: Arc<Mutex<Shared>>,
  stdin: SharedStdin,
  child: Option<Child>,
  readers: Vec<JoinHandle<()>>,
}

impl ProcessWrapper {
  pub fn new() -> ProcessWrapper {
    ProcessWrapper {
      shared: Arc::new(Mutex::new(Shared {
        state: ProcessState::NotRunning,
        prompt: DEFAULT_COMMAND_PROMPT.to_string(),
        next_id: 0,
        startup: None,
        current: None,
        waiting: VecDeque::new(),
        subscribers: Vec::new(),
      })),
      stdin: Arc::new(Mutex::new(None)),
      child: None,
      readers: Vec::new(),
    }
  }

  /// The text marking the end of every command, used by transactions created from now on.
  pub fn set_command_prompt(&self, prompt: &str) {
    self.lock().prompt = prompt.to_string();
  }

  pub fn command_prompt(&self) -> String {
    self.lock().prompt.clone()
  }

  pub fn state(&self) -> ProcessState {
    self.lock().state
  }

  /// Events for every state change and every chunk of output.
  pub fn subscribe(&self) -> Receiver<ProcessEvent> {
    self.subscribe_with_capacity(SUBSCRIBER_QUEUE)
  }

  /// Like `subscribe`, events beyond `capacity` unread ones are dropped.
  pub fn subscribe_with_capacity(&self, capacity: usize) -> Receiver<ProcessEvent> {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    self.lock().subscribers.push(tx);
    rx
  }

  /// Spawns the process. The returned transaction completes when the first prompt shows up.
  pub fn start(&mut self, executable: &str, args: &[&str]) -> Result<Transaction, ProcessError> {
    self.start_with_env(executable, args, &[])
  }

  /// Like `start`, with extra environment variables on top of the inherited ones.
  pub fn start_with_env(
    &mut self,
    executable: &str,
    args: &[&str],
    env: &[(&str, &str)],
  ) -> Result<Transaction, ProcessError> {
    if self.state() != ProcessState::NotRunning {
      return Err(ProcessError::AlreadyRunning);
    }
    self.reap();

    info!("Starting {} {}", executable, args.join(" "));
    let mut child = Command::new(executable)
      .args(args)
      .envs(env.iter().cloned())
      .stdin(Stdio::piped())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .spawn()
      .map_err(|err| ProcessError::Spawn {
        cause: err.to_string(),
      })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    *lock(&self.stdin) = child.stdin.take();
    let startup = {
      let mut shared = self.lock();
      shared.set_state(ProcessState::Starting);
      let prompt = shared.prompt.clone();
      let (startup, _) = shared.create_transaction(STARTUP_COMMAND, &prompt);
      shared.startup = Some(startup.clone());
      let write = if shared.current.as_ref().map(Transaction::id) == Some(startup.id()) {
        shared.begin(&startup)
      } else {
        None
      };
      write_pending(&self.shared, &self.stdin, shared, write);
      startup
    };

    self.child = Some(child);
    if let Some(stdout) = stdout {
      let reader = self.spawn_reader("process-stdout", Stream::Output, stdout)?;
      self.readers.push(reader);
    }
    if let Some(stderr) = stderr {
      let reader = self.spawn_reader("process-stderr", Stream::Error, stderr)?;
      self.readers.push(reader);
    }

    Ok(startup)
  }

  fn spawn_reader<R>(&self, name: &str, stream: Stream, mut reader: R) -> Result<JoinHandle<()>, ProcessError>
  where
    R: Read + Send + 'static,
  {
    let shared = self.shared.clone();
    let stdin = self.stdin.clone();
    thread::Builder::new()
      .name(name.into())
      .spawn(move || {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        loop {
          match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(size) => {
              let mut guard = lock(&shared);
              let write = guard.received(stream, &buffer[..size]);
              write_pending(&shared, &stdin, guard, write);
            }
            Err(err) => {
              debug!("Stopped reading {:?}: {}", stream, err);
              break;
            }
          }
        }
        if stream == Stream::Output {
          let mut guard = lock(&shared);
          if guard.state != ProcessState::Stopping {
            guard.closed();
            drop(guard);
            *lock(&stdin) = None;
          }
        }
      })
      .map_err(|err| ProcessError::Spawn {
        cause: err.to_string(),
      })
  }

  /// Queues a command without waiting for it, it completes when the prompt shows up.
  pub fn send(&self, command: &str) -> Result<Transaction, ProcessError> {
    let shared = self.lock();
    let prompt = shared.prompt.clone();
    self.queue(shared, command, &prompt)
  }

  /// Queues a command that completes when `expected_end` shows up instead of the prompt.
  pub fn send_expecting(&self, command: &str, expected_end: &str) -> Result<Transaction, ProcessError> {
    self.queue(self.lock(), command, expected_end)
  }

  fn queue(
    &self,
    mut shared: MutexGuard<Shared>,
    command: &str,
    expected_end: &str,
  ) -> Result<Transaction, ProcessError> {
    match shared.state {
      ProcessState::Starting | ProcessState::Running => {
        let (transaction, write) = shared.create_transaction(command, expected_end);
        write_pending(&self.shared, &self.stdin, shared, write);
        Ok(transaction)
      }
      _ => Err(ProcessError::NotRunning),
    }
  }

  /// Sends a command and waits until it completes.
  pub fn call(&self, command: &str, timeout: Duration) -> Result<Transaction, ProcessError> {
    let transaction = self.send(command)?;
    Self::wait(transaction, timeout)
  }

  pub fn call_expecting(
    &self,
    command: &str,
    expected_end: &str,
    timeout: Duration,
  ) -> Result<Transaction, ProcessError> {
    let transaction = self.send_expecting(command, expected_end)?;
    Self::wait(transaction, timeout)
  }

  fn wait(transaction: Transaction, timeout: Duration) -> Result<Transaction, ProcessError> {
    if transaction.wait_for_state(TransactionState::Completed, timeout) {
      Ok(transaction)
    } else if transaction.state() == TransactionState::Abandoned {
      Err(ProcessError::NotRunning)
    } else {
      Err(ProcessError::Timeout)
    }
  }

  /// Closes the standard input and waits for the process to exit, killing it after `timeout`.
  pub fn stop(&mut self, timeout: Duration) -> Result<(), ProcessError> {
    let mut child = match self.child.take() {
      Some(child) => child,
      None => return Ok(()),
    };

    self.lock().set_state(ProcessState::Stopping);
    *lock(&self.stdin) = None;

    let deadline = Instant::now() + timeout;
    let result = loop {
      match child.try_wait() {
        Ok(Some(status)) => {
          debug!("The process exited with {}", status);
          break Ok(());
        }
        Ok(None) if Instant::now() < deadline => thread::sleep(POLL_INTERVAL),
        Ok(None) => {
          warn!("The process did not stop in time, killing it");
          break child
            .kill()
            .and_then(|_| child.wait().map(|_| ()))
            .map_err(|err| ProcessError::Io {
              cause: err.to_string(),
            });
        }
        Err(err) => {
          break Err(ProcessError::Io {
            cause: err.to_string(),
          })
        }
      }
    };

    for reader in self.readers.drain(..) {
      drop(reader.join());
    }
    self.lock().closed();
    info!("The process is stopped");
    result
  }

  /// Waits for a process that exited on its own.
  fn reap(&mut self) {
    if let Some(mut child) = self.child.take() {
      drop(child.kill());
      drop(child.wait());
    }
    for reader in self.readers.drain(..) {
      drop(reader.join());
    }
  }

  fn lock(&self) -> MutexGuard<Shared> {
    lock(&self.shared)
  }
}

impl Default for ProcessWrapper {
  fn default() -> ProcessWrapper {
    ProcessWrapper::new()
  }
}

impl Drop for ProcessWrapper {
  fn drop(&mut self) {
    if self.child.is_some() {
      drop(self.stop(Duration::from_millis(0)));
    }
  }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<T> {
  match mutex.lock() {
    Ok(guard) => guard,
    Err(poisoned) => poisoned.into_inner(),
  }
}
