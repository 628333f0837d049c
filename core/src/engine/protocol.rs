use crossbeam_channel::{Sender, TrySendError};

use crate::clip::{ClipId, ClipState, Route, Voice};
use crate::engine::EngineError;
use crate::levels::recorder::CaptureSession;
use crate::time::TicksTime;
use crate::timer::{ClipCommand, TickCallback};

/// Messages from the control side to the audio thread.
pub enum Protocol {
  AddClip(Box<Voice>),
  RemoveClip(ClipId),

  Play {
    clip: ClipId,
    route: Route,
    looping: bool,
  },
  PlayNote {
    clip: ClipId,
    route: Route,
    note: i32,
  },
  Stop {
    clip: ClipId,
    route: Option<Route>,
  },

  StartTimer,
  StopTimer,
  Queue(ClipCommand),
  StopClips(Box<[ClipId]>),
  SetTickCallback(Option<Box<dyn TickCallback>>),

  StartCapture(Box<CaptureSession>),
  StopCapture,
}

/// Objects handed back by the audio thread so they are dropped elsewhere.
pub enum Released {
  Voice(Box<Voice>),
  Clips(Box<[ClipId]>),
  TickCallback(Box<dyn TickCallback>),
  Capture(Box<CaptureSession>),
}

/// Notifications from the audio thread, plain values only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Telemetry {
  Progress { clip: ClipId, progress: f32 },
  Level { clip: ClipId, db: f32 },
  State {
    clip: ClipId,
    state: ClipState,
    tick: Option<TicksTime>,
  },
}

pub(crate) fn send<T>(tx: &Sender<T>, msg: T) -> Result<(), EngineError> {
  tx.try_send(msg).map_err(|err| match err {
    TrySendError::Full(_) => EngineError::QueueFull,
    TrySendError::Disconnected(_) => EngineError::Disconnected,
  })
}
